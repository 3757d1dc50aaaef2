// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device bookkeeping for the device manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::backend::{ConnectionParams, DiscoveredDevice};
use crate::error::Error;
use crate::event::DeviceId;
use crate::state::{CapabilityChange, DeviceState, Endpoint, diff};
use crate::sync::{CycleSignal, RequestCoalescer};
use crate::types::{Capability, CapabilityValue};

/// Current and previous snapshots of one device.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    current: DeviceState,
    previous: Option<DeviceState>,
    /// A write patched `current` since the last refresh.
    optimistic: bool,
    last_seen: Option<DateTime<Utc>>,
}

/// A device tracked by the manager.
///
/// Snapshot mutation goes through the update coordinator, which holds the
/// device's lock while calling the `pub(crate)` mutators below. Readers get
/// consistent copies at any time.
#[derive(Debug)]
pub struct ManagedDevice {
    id: DeviceId,
    alias: RwLock<String>,
    mac: Option<String>,
    model: Option<String>,
    connection: RwLock<ConnectionParams>,
    snapshot: RwLock<Snapshot>,
    offline: AtomicBool,
    /// Active while a refresh or write runs under the lock.
    pub(crate) update: CycleSignal,
    /// Merges getter-triggered refreshes.
    pub(crate) refresher: RequestCoalescer<(), Error>,
}

impl ManagedDevice {
    pub(crate) fn new(discovered: DiscoveredDevice, coalescing_window: Duration) -> Self {
        let DiscoveredDevice {
            id,
            alias,
            mac,
            model,
            connection,
            state,
        } = discovered;

        Self {
            id,
            alias: RwLock::new(alias),
            mac,
            model,
            connection: RwLock::new(connection),
            snapshot: RwLock::new(Snapshot {
                current: state,
                last_seen: Some(Utc::now()),
                ..Snapshot::default()
            }),
            offline: AtomicBool::new(false),
            update: CycleSignal::new(),
            refresher: RequestCoalescer::new(coalescing_window),
        }
    }

    /// Returns the device identifier.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Returns the user-visible name.
    #[must_use]
    pub fn alias(&self) -> String {
        self.alias.read().clone()
    }

    /// Returns the hardware address, if known.
    #[must_use]
    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    /// Returns the model name, if known.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the connection parameters handed to the backend.
    #[must_use]
    pub fn connection(&self) -> ConnectionParams {
        self.connection.read().clone()
    }

    /// Returns `true` once the device has been quarantined.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.snapshot.read().current.clone()
    }

    /// Returns the snapshot before the last update.
    #[must_use]
    pub fn previous_state(&self) -> Option<DeviceState> {
        self.snapshot.read().previous.clone()
    }

    /// Returns when the device last answered a refresh.
    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().last_seen
    }

    /// Returns `true` if a write patched the snapshot since the last refresh.
    #[must_use]
    pub fn has_pending_patch(&self) -> bool {
        self.snapshot.read().optimistic
    }

    /// Reads one value from the current snapshot.
    #[must_use]
    pub fn value(&self, endpoint: &Endpoint, capability: Capability) -> Option<CapabilityValue> {
        self.snapshot.read().current.get(endpoint, capability)
    }

    /// Returns `true` if the flag was newly raised.
    pub(crate) fn mark_offline(&self) -> bool {
        !self.offline.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` if the flag was set.
    pub(crate) fn clear_offline(&self) -> bool {
        self.offline.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn update_identity(&self, alias: String, connection: ConnectionParams) {
        *self.alias.write() = alias;
        *self.connection.write() = connection;
    }

    /// Installs a fetched snapshot and returns what changed.
    pub(crate) fn replace_state(&self, state: DeviceState) -> Vec<CapabilityChange> {
        let mut snapshot = self.snapshot.write();
        let previous = std::mem::replace(&mut snapshot.current, state);
        let changes = diff(&self.id, Some(&previous), &snapshot.current);

        snapshot.previous = Some(previous);
        snapshot.optimistic = false;
        snapshot.last_seen = Some(Utc::now());
        changes
    }

    /// Patches the snapshot after a successful write.
    ///
    /// The written capability is always reported first, even if its value
    /// did not change; other capabilities follow only if they differ.
    pub(crate) fn patch(
        &self,
        endpoint: &Endpoint,
        capability: Capability,
        value: CapabilityValue,
    ) -> Vec<CapabilityChange> {
        let mut snapshot = self.snapshot.write();
        let mut patched = snapshot.current.clone();
        let Some(channel) = patched.channel_mut(endpoint) else {
            return Vec::new();
        };
        channel.apply(capability, value);

        let old = snapshot.current.get(endpoint, capability);
        let new = patched.get(endpoint, capability).unwrap_or(value);

        let mut changes = vec![CapabilityChange {
            device_id: self.id.clone(),
            endpoint: endpoint.clone(),
            capability,
            old,
            new,
        }];
        changes.extend(
            diff(&self.id, Some(&snapshot.current), &patched)
                .into_iter()
                .filter(|c| !(c.endpoint == *endpoint && c.capability == capability)),
        );

        snapshot.previous = Some(patched.clone());
        snapshot.current = patched;
        snapshot.optimistic = true;
        changes
    }
}
