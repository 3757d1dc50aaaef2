// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use crate::state::CapabilityChange;

use super::DeviceId;

/// Events emitted by the device manager.
///
/// # Examples
///
/// ```
/// use kasa_sync::event::{DeviceEvent, DeviceId};
///
/// let device_id = DeviceId::new("8006A1");
/// let added = DeviceEvent::device_added(device_id.clone());
/// assert_eq!(added.device_id(), Some(&device_id));
/// assert_eq!(DeviceEvent::DiscoveryStarted.device_id(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A device was added to the manager.
    DeviceAdded {
        /// The ID of the added device.
        device_id: DeviceId,
    },

    /// A device was removed from the manager.
    DeviceRemoved {
        /// The ID of the removed device.
        device_id: DeviceId,
    },

    /// A single capability changed value.
    CapabilityChanged(CapabilityChange),

    /// The device was quarantined after a backend failure.
    WentOffline {
        /// The ID of the device.
        device_id: DeviceId,
        /// Description of the failure.
        reason: String,
    },

    /// An operator cleared the device's offline flag.
    BackOnline {
        /// The ID of the device.
        device_id: DeviceId,
    },

    /// A rediscovery sweep started; per-device updates are paused.
    DiscoveryStarted,

    /// A rediscovery sweep finished.
    DiscoveryFinished {
        /// Number of devices reported by the sweep.
        devices: usize,
    },
}

impl DeviceEvent {
    /// Returns the device ID associated with this event, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::DeviceAdded { device_id }
            | Self::DeviceRemoved { device_id }
            | Self::WentOffline { device_id, .. }
            | Self::BackOnline { device_id } => Some(device_id),
            Self::CapabilityChanged(change) => Some(&change.device_id),
            Self::DiscoveryStarted | Self::DiscoveryFinished { .. } => None,
        }
    }

    /// Returns `true` if this is a device lifecycle event (added/removed).
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::DeviceAdded { .. } | Self::DeviceRemoved { .. })
    }

    /// Returns `true` if this is a capability change event.
    #[must_use]
    pub fn is_capability_change(&self) -> bool {
        matches!(self, Self::CapabilityChanged(_))
    }

    /// Creates a device added event.
    #[must_use]
    pub fn device_added(device_id: DeviceId) -> Self {
        Self::DeviceAdded { device_id }
    }

    /// Creates a device removed event.
    #[must_use]
    pub fn device_removed(device_id: DeviceId) -> Self {
        Self::DeviceRemoved { device_id }
    }

    /// Creates an offline event.
    #[must_use]
    pub fn went_offline(device_id: DeviceId, reason: impl Into<String>) -> Self {
        Self::WentOffline {
            device_id,
            reason: reason.into(),
        }
    }
}
