// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback subscriptions for capability changes.
//!
//! This is the `on_change` registration point handed to the bridge: the
//! coordinator dispatches every [`CapabilityChange`](crate::state::CapabilityChange)
//! to the callbacks whose [`ChangeFilter`] matches it, synchronously and
//! in emission order.
//!
//! # Overview
//!
//! - [`SubscriptionId`] - A unique identifier for a subscription, used to unsubscribe
//! - [`ChangeFilter`] - Selects which changes a callback receives
//! - [`CallbackRegistry`] - Stores callbacks and dispatches changes
//!
//! # Usage
//!
//! Subscriptions are usually created through [`Device::on_change`](crate::Device::on_change):
//!
//! ```no_run
//! # async fn example(device: kasa_sync::Device<kasa_sync::backend::HttpBackend>) {
//! let sub_id = device.on_change(|endpoint, capability, value| {
//!     println!("{endpoint}: {capability} is now {value}");
//! });
//!
//! // Later, unsubscribe
//! device.unsubscribe(sub_id);
//! # }
//! ```

mod callback;

pub use callback::{CallbackRegistry, ChangeFilter, SubscriptionId};
