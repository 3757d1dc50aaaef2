// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state snapshots and change detection.
//!
//! A [`DeviceState`] is either a single channel or an ordered list of
//! children. [`diff`] compares two snapshots and yields one
//! [`CapabilityChange`] per value that differs.
//!
//! # Examples
//!
//! ```
//! use kasa_sync::event::DeviceId;
//! use kasa_sync::state::{diff, ChannelState, DeviceState, Endpoint};
//! use kasa_sync::types::{Capability, CapabilityValue};
//!
//! let previous = DeviceState::Single(ChannelState::new(false));
//! let mut current = previous.clone();
//! if let Some(channel) = current.channel_mut(&Endpoint::Main) {
//!     channel.apply(Capability::On, CapabilityValue::Bool(true));
//! }
//!
//! let changes = diff(&DeviceId::new("plug"), Some(&previous), &current);
//! assert_eq!(changes[0].capability, Capability::On);
//! assert_eq!(changes[0].new, CapabilityValue::Bool(true));
//! ```

mod device_state;
mod state_change;

pub use device_state::{ChannelState, ChildState, DeviceState, Endpoint};
pub use state_change::{CapabilityChange, diff};
