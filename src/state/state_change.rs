// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability change records and snapshot diffing.

use crate::event::DeviceId;
use crate::types::{Capability, CapabilityValue};

use super::{DeviceState, Endpoint};

/// A single capability of a single endpoint that changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityChange {
    /// The device that changed.
    pub device_id: DeviceId,
    /// The channel that changed.
    pub endpoint: Endpoint,
    /// The capability that changed.
    pub capability: Capability,
    /// The previous value, `None` when it was not known before.
    pub old: Option<CapabilityValue>,
    /// The new value.
    pub new: CapabilityValue,
}

/// Compares two snapshots and returns one change per differing value.
///
/// Changes are ordered by endpoint (main, or children by position) and
/// then by [`Capability::ALL`] order. Children are matched by id, so a
/// reordered child list does not produce spurious changes.
///
/// # Examples
///
/// ```
/// use kasa_sync::event::DeviceId;
/// use kasa_sync::state::{diff, ChannelState, DeviceState};
///
/// let id = DeviceId::new("dev");
/// let before = DeviceState::Single(ChannelState::new(false));
/// let after = DeviceState::Single(ChannelState::new(true));
///
/// // On and OutletInUse both flip
/// assert_eq!(diff(&id, Some(&before), &after).len(), 2);
/// assert!(diff(&id, Some(&after), &after).is_empty());
/// ```
#[must_use]
pub fn diff(
    device_id: &DeviceId,
    previous: Option<&DeviceState>,
    current: &DeviceState,
) -> Vec<CapabilityChange> {
    let mut changes = Vec::new();

    for endpoint in current.endpoints() {
        let Some(channel) = current.channel(&endpoint) else {
            continue;
        };
        let before = previous.and_then(|state| state.channel(&endpoint));

        for capability in channel.capabilities() {
            let Some(new) = channel.get(capability) else {
                continue;
            };
            let old = before.and_then(|c| c.get(capability));
            if old != Some(new) {
                changes.push(CapabilityChange {
                    device_id: device_id.clone(),
                    endpoint: endpoint.clone(),
                    capability,
                    old,
                    new,
                });
            }
        }
    }

    changes
}
