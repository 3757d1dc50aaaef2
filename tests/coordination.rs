// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the device manager over the HTTP backend.

use std::time::Duration;

use kasa_sync::backend::{HttpBackend, HttpBackendConfig};
use kasa_sync::event::{ChildId, DeviceEvent, DeviceId};
use kasa_sync::{Capability, CapabilityValue, DeviceManager, Error, PlatformConfig};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_discovery(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/discover"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn plug_entry(id: &str, host: &str, on: bool) -> Value {
    json!({
        "sys_info": { "alias": format!("{id} plug"), "device_id": id, "state": on },
        "device_config": { "host": host }
    })
}

async fn manager(server: &MockServer) -> DeviceManager<HttpBackend> {
    let backend = HttpBackendConfig::new(server.uri())
        .with_timeout(Duration::from_secs(2))
        .into_backend()
        .unwrap();
    let config = PlatformConfig::default().with_polling_interval(Duration::from_secs(3600));
    let manager = DeviceManager::new(backend, config).unwrap();
    manager.discover().await.unwrap();
    manager
}

#[tokio::test]
async fn parallel_getters_share_one_fetch() {
    let server = MockServer::start().await;
    mount_discovery(&server, json!({ "10.0.0.5": plug_entry("P1", "10.0.0.5", false) })).await;

    Mock::given(method("POST"))
        .and(path("/getSysInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sys_info": { "device_id": "P1", "state": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server).await;
    let device = manager.device(&DeviceId::new("P1")).unwrap();

    let (a, b, c, d, e) = tokio::join!(
        device.get(Capability::On),
        device.get(Capability::On),
        device.get(Capability::OutletInUse),
        device.get(Capability::On),
        device.get(Capability::On),
    );
    for value in [a, b, c, d, e] {
        assert_eq!(value, Ok(CapabilityValue::Bool(true)));
    }
}

#[tokio::test]
async fn write_is_served_optimistically() {
    let server = MockServer::start().await;
    mount_discovery(&server, json!({ "10.0.0.5": plug_entry("P1", "10.0.0.5", false) })).await;

    Mock::given(method("POST"))
        .and(path("/controlDevice"))
        .and(body_partial_json(json!({ "action": "turn_on" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/getSysInfo"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager(&server).await;
    let device = manager.device(&DeviceId::new("P1")).unwrap();
    let mut events = manager.subscribe();

    device.set_on(true).await.unwrap();
    assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(true)));

    let DeviceEvent::CapabilityChanged(change) = events.recv().await.unwrap() else {
        panic!("expected a capability change");
    };
    assert_eq!(change.capability, Capability::On);
    assert_eq!(change.new, CapabilityValue::Bool(true));
}

#[tokio::test]
async fn failing_device_goes_offline_and_stays_quiet() {
    let server = MockServer::start().await;
    mount_discovery(&server, json!({ "10.0.0.5": plug_entry("P1", "10.0.0.5", true) })).await;

    Mock::given(method("POST"))
        .and(path("/getSysInfo"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "timed out" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/controlDevice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager(&server).await;
    let id = DeviceId::new("P1");
    let device = manager.device(&id).unwrap();
    let mut events = manager.subscribe();

    assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
    assert!(device.is_offline());
    assert!(matches!(
        events.recv().await.unwrap(),
        DeviceEvent::WentOffline { device_id, .. } if device_id == id
    ));

    assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
    assert_eq!(device.set_on(true).await, Err(Error::DeviceOffline(id)));
}

#[tokio::test]
async fn child_write_addresses_outlet_index() {
    let server = MockServer::start().await;
    mount_discovery(
        &server,
        json!({
            "10.0.0.7": {
                "sys_info": {
                    "alias": "Strip",
                    "device_id": "S1",
                    "children": [
                        { "id": "S100", "alias": "Left", "state": false },
                        { "id": "S101", "alias": "Right", "state": false }
                    ]
                },
                "device_config": { "host": "10.0.0.7" }
            }
        }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/controlDevice"))
        .and(body_partial_json(json!({
            "device_config": { "host": "10.0.0.7" },
            "action": "turn_on",
            "child_num": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager(&server).await;
    let strip = manager.device(&DeviceId::new("S1")).unwrap();
    let right = ChildId::new("S101");

    strip
        .set_child(&right, Capability::On, true)
        .await
        .unwrap();
    assert_eq!(
        strip.get_child(&right, Capability::On).await,
        Ok(CapabilityValue::Bool(true))
    );
    assert_eq!(
        strip.get(Capability::On).await,
        Err(Error::UnsupportedCapability {
            device_id: DeviceId::new("S1"),
            capability: Capability::On,
        })
    );
}

#[tokio::test]
async fn rediscovery_updates_connection() {
    let server = MockServer::start().await;
    mount_discovery(&server, json!({ "10.0.0.5": plug_entry("P1", "10.0.0.5", true) })).await;

    let manager = manager(&server).await;
    server.reset().await;
    mount_discovery(&server, json!({ "10.0.0.9": plug_entry("P1", "10.0.0.9", true) })).await;

    assert_eq!(manager.rediscover().await, Ok(1));
    let device = manager.device(&DeviceId::new("P1")).unwrap();
    assert_eq!(device.managed().connection().host(), Some("10.0.0.9"));
    assert_eq!(manager.device_count(), 1);
    manager.shutdown();
}
