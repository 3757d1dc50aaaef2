// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device manager for the whole platform.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::{DeviceBackend, DiscoveredDevice};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, DeviceEvents, DeviceId};

use super::config::PlatformConfig;
use super::coordinator::UpdateCoordinator;
use super::managed_device::ManagedDevice;

struct Inner<B> {
    coordinator: Arc<UpdateCoordinator<B>>,
    devices: RwLock<HashMap<DeviceId, Arc<ManagedDevice>>>,
    config: PlatformConfig,
    periodic_discovery: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

/// Manager for every device of the platform.
///
/// Owns the device table, per-device polling, rediscovery and the event
/// stream. Cloning is cheap and every clone drives the same platform.
///
/// # Examples
///
/// ```no_run
/// use kasa_sync::backend::HttpBackendConfig;
/// use kasa_sync::event::DeviceEvent;
/// use kasa_sync::{DeviceManager, PlatformConfig};
///
/// #[tokio::main]
/// async fn main() -> kasa_sync::Result<()> {
///     let backend = HttpBackendConfig::new("127.0.0.1:38889").into_backend()?;
///     let manager = DeviceManager::new(backend, PlatformConfig::default())?;
///
///     let mut events = manager.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             if let DeviceEvent::CapabilityChanged(change) = event {
///                 println!("{} {} -> {}", change.device_id, change.capability, change.new);
///             }
///         }
///     });
///
///     manager.discover().await?;
///     manager.start_periodic_discovery();
///
///     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
///     manager.shutdown();
///     Ok(())
/// }
/// ```
pub struct DeviceManager<B> {
    inner: Arc<Inner<B>>,
}

impl<B: DeviceBackend> DeviceManager<B> {
    /// Creates a manager driving `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(backend: B, config: PlatformConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                coordinator: Arc::new(UpdateCoordinator::new(backend, &config)),
                devices: RwLock::new(HashMap::new()),
                config,
                periodic_discovery: Mutex::new(None),
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.inner.config
    }

    /// Returns the update coordinator shared by every device.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<UpdateCoordinator<B>> {
        &self.inner.coordinator
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribes to device events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.coordinator.events().subscribe()
    }

    /// Subscribes to the events of one device.
    #[must_use]
    pub fn subscribe_device(&self, device_id: &DeviceId) -> DeviceEvents {
        self.inner.coordinator.events().subscribe_device(device_id.clone())
    }

    /// Returns the number of active event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.coordinator.events().subscriber_count()
    }

    // =========================================================================
    // Device table
    // =========================================================================

    /// Returns the facade of a device.
    #[must_use]
    pub fn device(&self, device_id: &DeviceId) -> Option<Device<B>> {
        self.inner
            .devices
            .read()
            .get(device_id)
            .map(|device| Device::new(Arc::clone(&self.inner.coordinator), Arc::clone(device)))
    }

    /// Returns every device, sorted by id.
    #[must_use]
    pub fn devices(&self) -> Vec<Device<B>> {
        let mut devices: Vec<Device<B>> = self
            .inner
            .devices
            .read()
            .values()
            .map(|device| Device::new(Arc::clone(&self.inner.coordinator), Arc::clone(device)))
            .collect();
        devices.sort_by(|a, b| a.id().cmp(b.id()));
        devices
    }

    /// Returns the ids of every device.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.inner.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of managed devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.inner.devices.read().len()
    }

    /// Adds a discovered device and starts polling it.
    ///
    /// Returns `false` if a device with the same id is already managed or
    /// the platform is shutting down.
    pub fn add_device(&self, discovered: DiscoveredDevice) -> bool {
        if self.is_shutting_down() {
            return false;
        }

        let device = {
            let mut devices = self.inner.devices.write();
            if devices.contains_key(&discovered.id) {
                tracing::debug!(
                    device_id = %discovered.id,
                    alias = %discovered.alias,
                    "Device already present"
                );
                return false;
            }
            let device = Arc::new(ManagedDevice::new(
                discovered,
                self.inner.config.coalescing_window(),
            ));
            devices.insert(device.id().clone(), Arc::clone(&device));
            device
        };

        tracing::info!(
            device_id = %device.id(),
            alias = %device.alias(),
            model = device.model().unwrap_or("unknown"),
            "Device added"
        );
        self.inner.coordinator.start_polling(&device);
        self.inner
            .coordinator
            .events()
            .publish(DeviceEvent::device_added(device.id().clone()));
        true
    }

    /// Removes a device, stopping its polling and dropping its callbacks.
    ///
    /// Returns `true` if the device was found and removed.
    pub fn remove_device(&self, device_id: &DeviceId) -> bool {
        let removed = self.inner.devices.write().remove(device_id).is_some();
        if removed {
            let coordinator = &self.inner.coordinator;
            coordinator.polling().stop(device_id);
            coordinator.callbacks().remove_device(device_id);
            coordinator
                .events()
                .publish(DeviceEvent::device_removed(device_id.clone()));
            tracing::info!(%device_id, "Device removed");
        }
        removed
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Runs the initial discovery and adds every new device that passes the
    /// MAC filters. Returns the ids that were added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if discovery fails and
    /// [`Error::ShuttingDown`] after shutdown.
    pub async fn discover(&self) -> Result<Vec<DeviceId>> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let found = self.fetch_discovered().await?;
        let mut added = Vec::new();
        for discovered in found {
            let id = discovered.id.clone();
            if self.add_device(discovered) {
                added.push(id);
            }
        }

        tracing::info!(added = added.len(), total = self.device_count(), "Discovery finished");
        Ok(added)
    }

    /// Rebuilds the device set while per-device updates are paused.
    ///
    /// Known devices get their alias and connection parameters refreshed
    /// under their lock; new devices are added. Offline devices stay
    /// offline. Returns the number of devices the sweep reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryInProgress`] if another sweep is running,
    /// [`Error::ShuttingDown`] after shutdown and [`Error::Backend`] if the
    /// sweep fails.
    pub async fn rediscover(&self) -> Result<usize> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let coordinator = &self.inner.coordinator;
        let Some(_sweep) = coordinator.discovery().try_begin() else {
            return Err(Error::DiscoveryInProgress);
        };

        tracing::info!("Rediscovery started");
        coordinator.events().publish(DeviceEvent::DiscoveryStarted);

        let found = match self.fetch_discovered().await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Rediscovery failed");
                coordinator
                    .events()
                    .publish(DeviceEvent::DiscoveryFinished { devices: 0 });
                return Err(e);
            }
        };

        let count = found.len();
        for discovered in found {
            let known = self.inner.devices.read().get(&discovered.id).cloned();
            match known {
                Some(device) => {
                    coordinator
                        .locks()
                        .with_lock(device.id().clone(), || async {
                            device.update_identity(discovered.alias, discovered.connection);
                        })
                        .await;
                    tracing::debug!(device_id = %device.id(), "Device identity refreshed");
                }
                None => {
                    self.add_device(discovered);
                }
            }
        }

        tracing::info!(devices = count, "Rediscovery finished");
        coordinator
            .events()
            .publish(DeviceEvent::DiscoveryFinished { devices: count });
        Ok(count)
    }

    /// Starts calling [`rediscover`](Self::rediscover) every
    /// `discoveryInterval`.
    ///
    /// Returns `false` if no interval is configured, the loop already runs,
    /// or the platform is shutting down.
    pub fn start_periodic_discovery(&self) -> bool {
        let Some(period) = self.inner.config.discovery_interval() else {
            tracing::debug!("Periodic discovery disabled");
            return false;
        };
        if self.is_shutting_down() {
            return false;
        }

        let mut slot = self.inner.periodic_discovery.lock();
        if slot.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return false;
        }

        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let manager = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                let Some(manager) = upgrade(&manager) else {
                    break;
                };
                match manager.rediscover().await {
                    Ok(_) | Err(Error::DiscoveryInProgress) => {}
                    Err(Error::ShuttingDown) => break,
                    Err(e) => tracing::warn!(error = %e, "Periodic rediscovery failed"),
                }
            }
            tracing::debug!("Periodic discovery stopped");
        });

        *slot = Some((stop, handle));
        tracing::info!(period_secs = period.as_secs(), "Periodic discovery started");
        true
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Clears the offline flag of a device and restarts its polling.
    ///
    /// Returns `false` if the device was not offline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown ids and
    /// [`Error::ShuttingDown`] after shutdown.
    pub fn reset_offline(&self, device_id: &DeviceId) -> Result<bool> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let device = self
            .inner
            .devices
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(device_id.clone()))?;

        if !device.clear_offline() {
            return Ok(false);
        }

        tracing::info!(%device_id, "Device back online");
        self.inner.coordinator.start_polling(&device);
        self.inner.coordinator.events().publish(DeviceEvent::BackOnline {
            device_id: device_id.clone(),
        });
        Ok(true)
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.coordinator.is_shutting_down()
    }

    /// Stops every polling timer and the periodic discovery loop.
    ///
    /// Getters then return safe defaults and setters fail with
    /// [`Error::ShuttingDown`]. In-flight backend calls are not aborted.
    pub fn shutdown(&self) {
        if !self.inner.coordinator.begin_shutdown() {
            return;
        }
        if let Some((stop, _handle)) = self.inner.periodic_discovery.lock().take() {
            let _ = stop.send(());
        }
        tracing::info!(devices = self.device_count(), "Platform shutting down");
    }

    async fn fetch_discovered(&self) -> Result<Vec<DiscoveredDevice>> {
        let coordinator = &self.inner.coordinator;
        let found = coordinator.call(coordinator.backend().discover()).await?;

        Ok(found
            .into_iter()
            .filter(|device| {
                let accepted = self.inner.config.accepts_mac(device.mac.as_deref());
                if !accepted {
                    tracing::debug!(
                        device_id = %device.id,
                        mac = ?device.mac,
                        "Device filtered out"
                    );
                }
                accepted
            })
            .collect())
    }
}

fn upgrade<B>(inner: &Weak<Inner<B>>) -> Option<DeviceManager<B>> {
    inner.upgrade().map(|inner| DeviceManager { inner })
}

impl<B> Clone for DeviceManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> std::fmt::Debug for DeviceManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("devices", &self.inner.devices.read().len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::mock::{MockBackend, discovered};
    use crate::error::BackendError;
    use crate::state::{ChannelState, DeviceState};
    use crate::types::{Capability, CapabilityValue};

    fn plug(on: bool) -> DeviceState {
        DeviceState::Single(ChannelState::new(on))
    }

    fn manager(config: PlatformConfig) -> DeviceManager<MockBackend> {
        let backend = MockBackend::new();
        backend.set_state("10.0.0.1", plug(true));
        backend.set_state("10.0.0.2", plug(false));
        backend.set_discovered(vec![
            discovered("a", "10.0.0.1", plug(true)),
            discovered("b", "10.0.0.2", plug(false)),
        ]);
        DeviceManager::new(backend, config).unwrap()
    }

    fn backend(manager: &DeviceManager<MockBackend>) -> &MockBackend {
        manager.coordinator().backend()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PlatformConfig::default().with_polling_interval(Duration::ZERO);
        assert!(matches!(
            DeviceManager::new(MockBackend::new(), config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn discover_adds_new_devices_once() {
        let manager = manager(PlatformConfig::default());
        let mut events = manager.subscribe();

        let added = manager.discover().await.unwrap();
        assert_eq!(added, vec![DeviceId::new("a"), DeviceId::new("b")]);
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::DeviceAdded { .. }));

        assert!(manager.discover().await.unwrap().is_empty());
        assert_eq!(manager.device_count(), 2);
        assert!(manager.coordinator().polling().is_polling(&DeviceId::new("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn mac_filters_apply() {
        let backend = MockBackend::new();
        let mut allowed = discovered("a", "10.0.0.1", plug(true));
        allowed.mac = Some("AA:BB:CC:DD:EE:01".to_string());
        let mut blocked = discovered("b", "10.0.0.2", plug(true));
        blocked.mac = Some("AA:BB:CC:DD:EE:02".to_string());
        backend.set_discovered(vec![allowed, blocked]);

        let config = PlatformConfig::default().with_exclude_macs(["AA:BB:CC:DD:EE:02"]);
        let manager = DeviceManager::new(backend, config).unwrap();

        assert_eq!(manager.discover().await.unwrap(), vec![DeviceId::new("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_stops_polling() {
        let manager = manager(PlatformConfig::default());
        manager.discover().await.unwrap();

        let id = DeviceId::new("a");
        assert!(manager.remove_device(&id));
        assert!(!manager.remove_device(&id));
        assert!(!manager.coordinator().polling().is_polling(&id));
        assert!(manager.device(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rediscovery_refreshes_identity_and_adds() {
        let manager = manager(PlatformConfig::default());
        manager.discover().await.unwrap();

        let mut renamed = discovered("a", "10.0.0.9", plug(true));
        renamed.alias = "Kitchen".to_string();
        backend(&manager).set_discovered(vec![renamed, discovered("c", "10.0.0.3", plug(false))]);

        assert_eq!(manager.rediscover().await.unwrap(), 2);
        let a = manager.device(&DeviceId::new("a")).unwrap();
        assert_eq!(a.alias(), "Kitchen");
        assert_eq!(a.managed().connection().host(), Some("10.0.0.9"));
        assert_eq!(manager.device_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_rediscovery_is_refused() {
        let manager = manager(PlatformConfig::default());
        backend(&manager).set_delay(Duration::from_secs(1));

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.rediscover().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(manager.rediscover().await, Err(Error::DiscoveryInProgress));
        assert_eq!(first.await.unwrap(), Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rediscovery_keeps_offline_devices_offline() {
        let manager = manager(PlatformConfig::default());
        manager.discover().await.unwrap();
        let a = manager.device(&DeviceId::new("a")).unwrap();
        a.managed().mark_offline();

        manager.rediscover().await.unwrap();
        assert!(a.is_offline());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_discovery_runs_until_shutdown() {
        let config = PlatformConfig::default().with_discovery_interval(Duration::from_secs(60));
        let manager = manager(config);

        assert!(manager.start_periodic_discovery());
        assert!(!manager.start_periodic_discovery());

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(backend(&manager).discover_count(), 2);

        manager.shutdown();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(backend(&manager).discover_count(), 2);
    }

    #[test]
    fn periodic_discovery_needs_an_interval() {
        let manager = manager(PlatformConfig::default());
        assert!(!manager.start_periodic_discovery());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_offline_restarts_polling() {
        let manager = manager(PlatformConfig::default());
        manager.discover().await.unwrap();
        let id = DeviceId::new("a");
        let a = manager.device(&id).unwrap();

        backend(&manager).fail_with(Some(BackendError::Transport("down".to_string())));
        a.refresh().await.unwrap_err();
        assert!(a.is_offline());
        assert!(!manager.coordinator().polling().is_polling(&id));

        backend(&manager).fail_with(None);
        let mut events = manager.subscribe();
        assert_eq!(manager.reset_offline(&id), Ok(true));
        assert_eq!(manager.reset_offline(&id), Ok(false));
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::BackOnline { .. }));
        assert!(manager.coordinator().polling().is_polling(&id));
        assert_eq!(a.get(Capability::On).await, Ok(CapabilityValue::Bool(true)));

        assert_eq!(
            manager.reset_offline(&DeviceId::new("nope")),
            Err(Error::DeviceNotFound(DeviceId::new("nope")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_quiesces_platform() {
        let manager = manager(PlatformConfig::default());
        manager.discover().await.unwrap();
        let fetches = backend(&manager).fetch_count();

        manager.shutdown();
        assert!(manager.is_shutting_down());
        assert_eq!(manager.coordinator().polling().active_count(), 0);

        let a = manager.device(&DeviceId::new("a")).unwrap();
        assert_eq!(a.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
        assert_eq!(a.set_on(true).await, Err(Error::ShuttingDown));
        assert_eq!(manager.discover().await, Err(Error::ShuttingDown));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend(&manager).fetch_count(), fetches);
    }
}
