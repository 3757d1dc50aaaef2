// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `kasa_sync` - Synchronization core for TP-Link Kasa smart devices.
//!
//! This library keeps a cached snapshot of every Kasa device reachable
//! through a backend and serves per-capability reads and writes on top of
//! it, the way a home-automation bridge needs them.
//!
//! # Supported Features
//!
//! - **Request coalescing**: bursts of getters share one backend fetch
//! - **Per-device serialization**: refreshes and writes never overlap
//! - **Optimistic writes**: a successful write patches the cached snapshot
//! - **Polling and rediscovery**: periodic refreshes with quarantine on failure
//! - **Change notifications**: callbacks and a broadcast event stream
//!
//! # Supported Devices
//!
//! - Plugs and switches (power, outlet in use)
//! - Dimmers and bulbs (brightness, color temperature, hue, saturation)
//! - Fans (speed level, active)
//! - Power strips, addressed per child outlet
//!
//! # Quick Start
//!
//! ```no_run
//! use kasa_sync::backend::HttpBackendConfig;
//! use kasa_sync::types::Capability;
//! use kasa_sync::{DeviceManager, PlatformConfig};
//!
//! #[tokio::main]
//! async fn main() -> kasa_sync::Result<()> {
//!     let backend = HttpBackendConfig::new("127.0.0.1:38889").into_backend()?;
//!     let manager = DeviceManager::new(backend, PlatformConfig::default())?;
//!     manager.discover().await?;
//!
//!     for device in manager.devices() {
//!         let on = device.get(Capability::On).await?;
//!         println!("{} ({}): {on}", device.alias(), device.id());
//!     }
//!
//!     if let Some(device) = manager.devices().first() {
//!         device.set(Capability::Brightness, 40).await?;
//!     }
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```

pub mod backend;
mod device;
pub mod error;
pub mod event;
pub mod manager;
pub mod state;
pub mod subscription;
pub mod sync;
pub mod types;

pub use device::Device;
pub use error::{BackendError, ConfigError, Error, Result, ValueError};
pub use manager::{DeviceManager, PlatformConfig};
pub use state::{DeviceState, Endpoint};
pub use subscription::SubscriptionId;
pub use types::{Capability, CapabilityValue};
