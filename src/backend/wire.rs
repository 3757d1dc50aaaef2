// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON shapes of the sidecar API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConnectionParams, ControlCommand, ControlField, ControlValue, DiscoveredDevice};
use crate::error::BackendError;
use crate::event::{ChildId, DeviceId};
use crate::state::{ChannelState, ChildState, DeviceState};
use crate::types::{Brightness, ColorTemperature, FanSpeedLevel, Hsv};

// ============================================================================
// Responses
// ============================================================================

/// Capability fields shared by devices and children.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ChannelInfo {
    #[serde(default)]
    state: Option<bool>,
    #[serde(default)]
    brightness: Option<u8>,
    #[serde(default)]
    color_temp: Option<u16>,
    #[serde(default)]
    hsv: Option<Hsv>,
    #[serde(default)]
    fan_speed_level: Option<u8>,
}

impl ChannelInfo {
    fn into_channel(self) -> Result<ChannelState, BackendError> {
        let fan_speed = self
            .fan_speed_level
            .map(FanSpeedLevel::new)
            .transpose()
            .map_err(|e| BackendError::InvalidResponse(format!("fan_speed_level: {e}")))?;

        Ok(ChannelState {
            on: self.state.unwrap_or(false),
            brightness: self.brightness.map(Brightness::clamped),
            // Bulbs in color mode report 0
            color_temperature: self.color_temp.map(ColorTemperature::clamped),
            hsv: self.hsv,
            fan_speed,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ChildInfo {
    id: String,
    #[serde(default)]
    alias: String,
    #[serde(flatten)]
    channel: ChannelInfo,
}

/// The `sys_info` object.
#[derive(Debug, Deserialize)]
pub(super) struct SysInfo {
    #[serde(default)]
    alias: String,
    device_id: String,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    children: Vec<ChildInfo>,
    #[serde(flatten)]
    channel: ChannelInfo,
}

impl SysInfo {
    pub(super) fn into_state(self) -> Result<DeviceState, BackendError> {
        if self.children.is_empty() {
            return Ok(DeviceState::Single(self.channel.into_channel()?));
        }
        let children = self
            .children
            .into_iter()
            .map(|child| {
                Ok(ChildState {
                    id: ChildId::new(child.id),
                    alias: child.alias,
                    channel: child.channel.into_channel()?,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        Ok(DeviceState::WithChildren(children))
    }
}

/// Body of `POST /getSysInfo`.
#[derive(Debug, Deserialize)]
pub(super) struct SysInfoResponse {
    #[serde(default)]
    pub(super) sys_info: Option<SysInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscInfo {
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryEntry {
    sys_info: SysInfo,
    device_config: Value,
    #[serde(default)]
    disc_info: DiscInfo,
}

/// Decodes the `POST /discover` body, sorted by host.
///
/// Entries the sidecar failed to serialize are skipped.
pub(super) fn parse_discovery(body: BTreeMap<String, Value>) -> Vec<DiscoveredDevice> {
    let mut devices = Vec::with_capacity(body.len());

    for (host, raw) in body {
        let entry = match serde_json::from_value::<DiscoveryEntry>(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(%host, error = %e, "Skipping undecodable discovery entry");
                continue;
            }
        };

        let SysInfo {
            alias,
            device_id,
            mac,
            model,
            children,
            channel,
        } = entry.sys_info;
        let model = entry.disc_info.model.or(model);
        let sys_info = SysInfo {
            alias: alias.clone(),
            device_id: device_id.clone(),
            mac: None,
            model: None,
            children,
            channel,
        };

        match sys_info.into_state() {
            Ok(state) => devices.push(DiscoveredDevice {
                id: DeviceId::new(device_id),
                alias,
                mac,
                model,
                connection: ConnectionParams::new(entry.device_config),
                state,
            }),
            Err(e) => tracing::warn!(%host, error = %e, "Skipping discovery entry"),
        }
    }

    devices
}

/// Body of `POST /controlDevice`.
#[derive(Debug, Deserialize)]
pub(super) struct ControlResponse {
    #[serde(default)]
    pub(super) status: Option<String>,
    #[serde(default)]
    pub(super) message: Option<String>,
}

/// Error body of a non-2xx answer.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorResponse {
    pub(super) error: String,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub(super) struct SysInfoRequest<'a> {
    pub(super) device_config: &'a ConnectionParams,
}

#[derive(Debug, Serialize)]
pub(super) struct ControlRequest<'a> {
    device_config: &'a ConnectionParams,
    feature: &'static str,
    action: String,
    value: Value,
    child_num: Option<usize>,
}

impl<'a> ControlRequest<'a> {
    pub(super) fn new(device_config: &'a ConnectionParams, command: &ControlCommand) -> Self {
        let feature = command.field.as_str();
        let action = match (command.field, command.value) {
            (ControlField::State, ControlValue::Bool(true)) => "turn_on".to_string(),
            (ControlField::State, _) => "turn_off".to_string(),
            (field, _) => format!("set_{field}"),
        };
        let value = match (command.field, command.value) {
            (ControlField::State, _) => Value::Null,
            (ControlField::Hue, ControlValue::Int(v)) => serde_json::json!({ "hue": v }),
            (ControlField::Saturation, ControlValue::Int(v)) => {
                serde_json::json!({ "saturation": v })
            }
            (_, ControlValue::Int(v)) => Value::from(v),
            (_, ControlValue::Bool(b)) => Value::from(b),
        };

        Self {
            device_config,
            feature,
            action,
            value,
            child_num: command.child_index,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DiscoverRequest<'a> {
    pub(super) additional_broadcasts: &'a [String],
    pub(super) manual_devices: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plug_sys_info() {
        let info: SysInfo = serde_json::from_value(json!({
            "alias": "Desk",
            "child_num": 0,
            "device_id": "8006A1",
            "device_type": "IOT.SMARTPLUGSWITCH",
            "host": "10.0.0.5",
            "mac": "AA:BB:CC:DD:EE:FF",
            "state": true
        }))
        .unwrap();

        assert_eq!(
            info.into_state().unwrap(),
            DeviceState::Single(ChannelState::new(true))
        );
    }

    #[test]
    fn strip_sys_info() {
        let info: SysInfo = serde_json::from_value(json!({
            "alias": "Strip",
            "device_id": "8006B2",
            "child_num": 2,
            "children": [
                {"id": "00", "alias": "Lamp", "state": true},
                {"id": "01", "alias": "Fan", "state": false}
            ]
        }))
        .unwrap();

        let state = info.into_state().unwrap();
        assert_eq!(state.children().len(), 2);
        assert_eq!(state.children()[0].alias, "Lamp");
        assert!(state.children()[0].channel.on);
    }

    #[test]
    fn bulb_sys_info_clamps_color_mode_temperature() {
        let info: SysInfo = serde_json::from_value(json!({
            "alias": "Bulb",
            "device_id": "8006C3",
            "state": true,
            "brightness": 80,
            "color_temp": 0,
            "hsv": {"hue": 200, "saturation": 40}
        }))
        .unwrap();

        let DeviceState::Single(channel) = info.into_state().unwrap() else {
            panic!("expected single channel");
        };
        assert_eq!(channel.brightness.map(|b| b.value()), Some(80));
        assert_eq!(channel.color_temperature, Some(ColorTemperature::clamped(2500)));
        assert_eq!(channel.hsv, Some(Hsv::new(200, 40).unwrap()));
    }

    #[test]
    fn invalid_fan_level_is_rejected() {
        let info: SysInfo = serde_json::from_value(json!({
            "device_id": "fan",
            "state": true,
            "fan_speed_level": 9
        }))
        .unwrap();
        assert!(matches!(
            info.into_state(),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn discovery_skips_broken_entries() {
        let body: BTreeMap<String, Value> = serde_json::from_value(json!({
            "10.0.0.9": {},
            "10.0.0.5": {
                "sys_info": {
                    "alias": "Desk",
                    "device_id": "8006A1",
                    "mac": "AA:BB",
                    "state": false
                },
                "device_config": {"host": "10.0.0.5"},
                "disc_info": {"model": "HS103"},
                "feature_info": {}
            }
        }))
        .unwrap();

        let devices = parse_discovery(body);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, DeviceId::new("8006A1"));
        assert_eq!(devices[0].model.as_deref(), Some("HS103"));
        assert_eq!(devices[0].mac.as_deref(), Some("AA:BB"));
        assert_eq!(devices[0].connection.host(), Some("10.0.0.5"));
    }

    #[test]
    fn control_request_shapes() {
        let params = ConnectionParams::new(json!({"host": "10.0.0.5"}));

        let on = ControlCommand {
            field: ControlField::State,
            value: ControlValue::Bool(true),
            child_index: Some(1),
        };
        let body = serde_json::to_value(ControlRequest::new(&params, &on)).unwrap();
        assert_eq!(
            body,
            json!({
                "device_config": {"host": "10.0.0.5"},
                "feature": "state",
                "action": "turn_on",
                "value": null,
                "child_num": 1
            })
        );

        let hue = ControlCommand {
            field: ControlField::Hue,
            value: ControlValue::Int(120),
            child_index: None,
        };
        let body = serde_json::to_value(ControlRequest::new(&params, &hue)).unwrap();
        assert_eq!(body["action"], "set_hue");
        assert_eq!(body["value"], json!({"hue": 120}));
        assert_eq!(body["child_num"], Value::Null);
    }

    #[test]
    fn discover_request_uses_camel_case() {
        let broadcasts = vec!["192.168.2.255".to_string()];
        let body = serde_json::to_value(DiscoverRequest {
            additional_broadcasts: &broadcasts,
            manual_devices: &[],
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"additionalBroadcasts": ["192.168.2.255"], "manualDevices": []})
        );
    }
}
