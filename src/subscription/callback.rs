// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for capability change subscriptions.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`ChangeFilter`] - Which changes a callback wants
//! - [`CallbackRegistry`] - Registry for storing and dispatching callbacks

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::DeviceId;
use crate::state::{CapabilityChange, Endpoint};
use crate::types::Capability;

/// Unique identifier for a subscription.
///
/// This ID is returned when creating a subscription and can be used to
/// unsubscribe later. IDs are unique within a registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a new subscription ID with the given value.
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

/// Selects the changes delivered to a callback.
///
/// Every `None` field matches anything.
///
/// ```
/// use kasa_sync::event::DeviceId;
/// use kasa_sync::subscription::ChangeFilter;
/// use kasa_sync::types::Capability;
///
/// let filter = ChangeFilter::device(DeviceId::new("plug")).with_capability(Capability::On);
/// assert_eq!(filter.capability, Some(Capability::On));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Only changes of this device.
    pub device_id: Option<DeviceId>,
    /// Only changes of this endpoint.
    pub endpoint: Option<Endpoint>,
    /// Only changes of this capability.
    pub capability: Option<Capability>,
}

impl ChangeFilter {
    /// A filter matching every change.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter matching every change of one device.
    #[must_use]
    pub fn device(device_id: DeviceId) -> Self {
        Self {
            device_id: Some(device_id),
            ..Self::default()
        }
    }

    /// Restricts the filter to one endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Restricts the filter to one capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Returns `true` if `change` passes the filter.
    #[must_use]
    pub fn matches(&self, change: &CapabilityChange) -> bool {
        self.device_id.as_ref().is_none_or(|id| *id == change.device_id)
            && self.endpoint.as_ref().is_none_or(|e| *e == change.endpoint)
            && self.capability.is_none_or(|c| c == change.capability)
    }
}

type ChangeCallback = Arc<dyn Fn(&CapabilityChange) + Send + Sync>;

/// Registry for capability change callbacks.
///
/// Uses `parking_lot::RwLock` for interior mutability. Callbacks are
/// wrapped in `Arc` and cloned out of the table before being invoked, so a
/// callback may itself subscribe or unsubscribe.
pub struct CallbackRegistry {
    /// Counter for generating unique subscription IDs.
    next_id: AtomicU64,
    callbacks: RwLock<HashMap<SubscriptionId, (ChangeFilter, ChangeCallback)>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// Generates a new unique subscription ID.
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a callback for the changes matching `filter`.
    pub fn on_change<F>(&self, filter: ChangeFilter, callback: F) -> SubscriptionId
    where
        F: Fn(&CapabilityChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.callbacks
            .write()
            .insert(id, (filter, Arc::new(callback)));
        id
    }

    /// Unregisters a callback by its subscription ID.
    ///
    /// Returns `true` if a callback was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks.write().remove(&id).is_some()
    }

    /// Removes every callback whose filter names `device_id`.
    ///
    /// Returns the number of callbacks removed.
    pub fn remove_device(&self, device_id: &DeviceId) -> usize {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|_, (filter, _)| filter.device_id.as_ref() != Some(device_id));
        before - callbacks.len()
    }

    /// Clears all callbacks.
    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches a change to every matching callback.
    ///
    /// Callbacks are called synchronously in an arbitrary order.
    pub fn dispatch(&self, change: &CapabilityChange) {
        let matching: Vec<ChangeCallback> = self
            .callbacks
            .read()
            .values()
            .filter(|(filter, _)| filter.matches(change))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in matching {
            callback(change);
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns the total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
