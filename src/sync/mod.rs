// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Concurrency primitives used by the update coordinator.
//!
//! - [`RequestCoalescer`] - merges concurrent requests within a window into
//!   one execution
//! - [`DeviceLock`] - per-key FIFO mutual exclusion with pruned entries
//! - [`CycleSignal`] / [`DiscoverySignal`] - awaitable "in progress" flags
//!   for device updates and platform-wide rediscovery

mod coalescer;
mod device_lock;
mod signal;

pub use coalescer::RequestCoalescer;
pub use device_lock::DeviceLock;
pub use signal::{Cycle, CycleGuard, CycleSignal, DiscoverySignal};
