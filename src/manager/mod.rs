// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform-level coordination of every discovered device.
//!
//! # Overview
//!
//! The [`DeviceManager`] is the central component. It provides:
//!
//! - **Device table**: devices found by discovery, filtered by MAC address
//! - **Polling**: one repeating refresh per device, stopped on failure
//! - **Rediscovery**: periodic sweeps that pause per-device updates
//! - **Event system**: lifecycle and capability events via broadcast channels
//! - **Quarantine**: failing devices go offline until an operator resets them
//!
//! Every refresh and write is serialized per device by the
//! [`UpdateCoordinator`], which also waits for a running rediscovery to
//! finish and settle before touching a device.
//!
//! # Examples
//!
//! ```no_run
//! use kasa_sync::backend::HttpBackendConfig;
//! use kasa_sync::event::DeviceEvent;
//! use kasa_sync::{DeviceManager, PlatformConfig};
//!
//! # async fn example() -> kasa_sync::Result<()> {
//! let config =
//!     PlatformConfig::from_json(r#"{ "pollingInterval": 30, "discoveryInterval": 600 }"#)?;
//! let backend = HttpBackendConfig::new("127.0.0.1:38889").into_backend()?;
//! let manager = DeviceManager::new(backend, config)?;
//!
//! let mut events = manager.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             DeviceEvent::WentOffline { device_id, reason } => {
//!                 println!("{device_id} went offline: {reason}");
//!             }
//!             DeviceEvent::DeviceAdded { device_id } => println!("{device_id} added"),
//!             _ => {}
//!         }
//!     }
//! });
//!
//! manager.discover().await?;
//! manager.start_periodic_discovery();
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod device_manager;
mod managed_device;
mod polling;

pub use config::PlatformConfig;
pub use coordinator::UpdateCoordinator;
pub use device_manager::DeviceManager;
pub use managed_device::ManagedDevice;
pub use polling::{PollOutcome, PollingScheduler};
