// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serialized refresh and write paths of every device.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::backend::{ControlCommand, DeviceBackend};
use crate::error::{BackendError, Error, Result};
use crate::event::{DeviceEvent, DeviceId, EventBus};
use crate::state::{CapabilityChange, Endpoint};
use crate::subscription::CallbackRegistry;
use crate::sync::{DeviceLock, DiscoverySignal};
use crate::types::{Capability, CapabilityValue};

use super::config::PlatformConfig;
use super::managed_device::ManagedDevice;
use super::polling::{PollOutcome, PollingScheduler};

/// Runs refreshes and writes under each device's lock.
///
/// Every operation on a device takes the same lock key (the device id), so
/// a whole-device refresh and a single-child write are never interleaved.
/// Backend failures quarantine the device: the offline flag is raised, its
/// polling stops and a [`DeviceEvent::WentOffline`] is published.
pub struct UpdateCoordinator<B> {
    backend: B,
    locks: DeviceLock<DeviceId>,
    discovery: DiscoverySignal,
    polling: PollingScheduler,
    events: EventBus,
    callbacks: CallbackRegistry,
    shutting_down: AtomicBool,
    timeout: Duration,
    polling_interval: Duration,
    settle_delay: Duration,
}

impl<B: DeviceBackend> UpdateCoordinator<B> {
    /// Creates a coordinator for `backend`.
    #[must_use]
    pub fn new(backend: B, config: &PlatformConfig) -> Self {
        Self {
            backend,
            locks: DeviceLock::new(),
            discovery: DiscoverySignal::new(),
            polling: PollingScheduler::new(),
            events: EventBus::with_capacity(config.event_capacity),
            callbacks: CallbackRegistry::new(),
            shutting_down: AtomicBool::new(false),
            timeout: config.timeout(),
            polling_interval: config.polling_interval(),
            settle_delay: config.discovery_settle_delay(),
        }
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the change-callback registry.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Returns the rediscovery signal.
    #[must_use]
    pub fn discovery(&self) -> &DiscoverySignal {
        &self.discovery
    }

    /// Returns the lock table.
    #[must_use]
    pub fn locks(&self) -> &DeviceLock<DeviceId> {
        &self.locks
    }

    /// Returns the polling scheduler.
    #[must_use]
    pub fn polling(&self) -> &PollingScheduler {
        &self.polling
    }

    /// Returns `true` once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Raises the shutdown flag and stops every timer. Returns `false` if
    /// shutdown had already begun.
    pub fn begin_shutdown(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.polling.stop_all();
        true
    }

    /// Bounds a backend call by the configured timeout.
    pub async fn call<T>(
        &self,
        request: impl Future<Output = std::result::Result<T, BackendError>>,
    ) -> std::result::Result<T, BackendError> {
        tokio::time::timeout(self.timeout, request)
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)))
    }

    // =========================================================================
    // Refresh path
    // =========================================================================

    /// Fetches a fresh snapshot and emits one change per differing value.
    ///
    /// `requests` is the number of coalesced callers this refresh serves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOffline`] if the device is or becomes
    /// quarantined, and [`Error::ShuttingDown`] after shutdown.
    pub async fn refresh(&self, device: &ManagedDevice, requests: usize) -> Result<()> {
        self.await_turn(device, false).await;
        self.refresh_locked(device, requests).await
    }

    /// Polling-tick refresh.
    ///
    /// Unlike [`refresh`](Self::refresh), a tick that had to wait for a
    /// rediscovery also waits `discoverySettleDelay` before fetching.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn poll(&self, device: &ManagedDevice) -> Result<()> {
        self.await_turn(device, true).await;
        self.refresh_locked(device, 1).await
    }

    async fn refresh_locked(&self, device: &ManagedDevice, requests: usize) -> Result<()> {

        self.locks
            .with_lock(device.id().clone(), || async {
                self.admit(device)?;
                let _cycle = device.update.begin();

                tracing::debug!(device_id = %device.id(), requests, "Refreshing device state");
                let connection = device.connection();

                match self.call(self.backend.fetch_state(&connection)).await {
                    Ok(state) => {
                        let changes = device.replace_state(state);
                        tracing::debug!(
                            device_id = %device.id(),
                            changes = changes.len(),
                            "Refresh finished"
                        );
                        self.emit(changes);
                        Ok(())
                    }
                    Err(e) => Err(self.quarantine(device, &e)),
                }
            })
            .await
    }

    /// Refreshes through the device's coalescer, so that concurrent callers
    /// share one backend fetch.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh), cloned to every caller.
    pub async fn coalesced_refresh(self: &Arc<Self>, device: &Arc<ManagedDevice>) -> Result<()> {
        let coordinator = Arc::clone(self);
        let target = Arc::clone(device);
        device
            .refresher
            .schedule(move |requests| async move { coordinator.refresh(&target, requests).await })
            .await
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Applies a validated command, then patches the snapshot and emits the
    /// written value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOffline`] if the device is quarantined or the
    /// command fails, and [`Error::ShuttingDown`] after shutdown.
    pub async fn write(
        &self,
        device: &ManagedDevice,
        endpoint: &Endpoint,
        capability: Capability,
        value: CapabilityValue,
        command: ControlCommand,
    ) -> Result<()> {
        self.await_turn(device, false).await;

        self.locks
            .with_lock(device.id().clone(), || async {
                self.admit(device)?;
                let _cycle = device.update.begin();

                tracing::debug!(
                    device_id = %device.id(),
                    %endpoint,
                    %capability,
                    %value,
                    "Writing capability"
                );
                let connection = device.connection();

                match self.call(self.backend.apply_command(&connection, &command)).await {
                    Ok(()) => {
                        let changes = device.patch(endpoint, capability, value);
                        tracing::info!(
                            device_id = %device.id(),
                            %endpoint,
                            %capability,
                            %value,
                            "Capability written"
                        );
                        self.emit(changes);
                        Ok(())
                    }
                    Err(e) => Err(self.quarantine(device, &e)),
                }
            })
            .await
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Arms the polling timer of a device.
    pub fn start_polling(self: &Arc<Self>, device: &Arc<ManagedDevice>) {
        let coordinator = Arc::downgrade(self);
        let device = Arc::clone(device);

        self.polling
            .start(device.id().clone(), self.polling_interval, move || {
                let coordinator = coordinator.clone();
                let device = Arc::clone(&device);
                async move {
                    let Some(coordinator) = coordinator.upgrade() else {
                        return PollOutcome::Stop;
                    };
                    if device.is_offline() || coordinator.is_shutting_down() {
                        return PollOutcome::Stop;
                    }
                    match coordinator.poll(&device).await {
                        Ok(()) => PollOutcome::Continue,
                        Err(_) => PollOutcome::Stop,
                    }
                }
            });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Yields to a running update of the same device or to a rediscovery,
    /// whichever finishes first. With `settle`, a finished rediscovery is
    /// followed by the settle delay.
    ///
    /// Waits before the lock is taken: a rediscovery needs device locks.
    async fn await_turn(&self, device: &ManagedDevice, settle: bool) {
        let discovering = self.discovery.is_in_progress();
        let updating = device.update.is_active();
        if !discovering && !updating {
            return;
        }

        let discovery_finished = tokio::select! {
            () = device.update.wait_idle(), if updating => false,
            () = self.discovery.wait_finished(), if discovering => true,
        };

        if discovery_finished && settle {
            tracing::debug!(
                device_id = %device.id(),
                delay_ms = self.settle_delay.as_millis(),
                "Waiting for rediscovery to settle"
            );
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    /// Rejects work on quarantined devices and after shutdown.
    fn admit(&self, device: &ManagedDevice) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        if device.is_offline() {
            self.polling.stop(device.id());
            return Err(Error::DeviceOffline(device.id().clone()));
        }
        Ok(())
    }

    fn quarantine(&self, device: &ManagedDevice, err: &BackendError) -> Error {
        if device.mark_offline() {
            tracing::error!(
                device_id = %device.id(),
                alias = %device.alias(),
                error = %err,
                "Device quarantined after backend failure"
            );
            self.polling.stop(device.id());
            self.events
                .publish(DeviceEvent::went_offline(device.id().clone(), err.to_string()));
        }
        Error::DeviceOffline(device.id().clone())
    }

    fn emit(&self, changes: Vec<CapabilityChange>) {
        for change in changes {
            tracing::debug!(
                device_id = %change.device_id,
                endpoint = %change.endpoint,
                capability = %change.capability,
                old = ?change.old,
                new = %change.new,
                "Capability changed"
            );
            self.callbacks.dispatch(&change);
            self.events.publish(DeviceEvent::CapabilityChanged(change));
        }
    }
}

impl<B> std::fmt::Debug for UpdateCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("locks", &self.locks)
            .field("polling", &self.polling)
            .field("shutting_down", &self.shutting_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
