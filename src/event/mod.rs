// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for device lifecycle and capability changes.
//!
//! The [`EventBus`] uses tokio's broadcast channel so that several
//! subscribers receive the same stream of [`DeviceEvent`]s.
//!
//! # Examples
//!
//! ```
//! use kasa_sync::event::{DeviceEvent, DeviceId, EventBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new();
//! let plug = DeviceId::new("8006A1");
//! let mut plug_events = bus.subscribe_device(plug.clone());
//!
//! bus.publish(DeviceEvent::DiscoveryStarted);
//! bus.publish(DeviceEvent::device_added(plug.clone()));
//!
//! let event = plug_events.recv().await;
//! assert_eq!(event, Some(DeviceEvent::device_added(plug)));
//! # }
//! ```

mod device_event;
mod device_id;
mod event_bus;

pub use device_event::DeviceEvent;
pub use device_id::{ChildId, DeviceId};
pub use event_bus::{DeviceEvents, EventBus};
