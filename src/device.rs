// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-capability read/write facade handed to the bridge.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::{ControlCommand, DeviceBackend};
use crate::error::{Error, Result};
use crate::event::{ChildId, DeviceId};
use crate::manager::{ManagedDevice, UpdateCoordinator};
use crate::state::{ChildState, DeviceState, Endpoint};
use crate::subscription::{ChangeFilter, SubscriptionId};
use crate::types::{Capability, CapabilityValue};

/// One device as seen by the bridge.
///
/// Getters trigger a coalesced refresh and never fail on backend trouble:
/// when the device is offline, or the platform is shutting down, they
/// return the capability's safe default (`false` or `0`) without touching
/// the lock or the backend. A getter issued right after a write serves the
/// written value until the next refresh.
///
/// Setters validate the value first, then write through the device's lock.
///
/// # Examples
///
/// ```no_run
/// use kasa_sync::backend::HttpBackendConfig;
/// use kasa_sync::types::Capability;
/// use kasa_sync::{DeviceManager, PlatformConfig};
///
/// # async fn example() -> kasa_sync::Result<()> {
/// let backend = HttpBackendConfig::new("127.0.0.1:38889").into_backend()?;
/// let manager = DeviceManager::new(backend, PlatformConfig::default())?;
/// manager.discover().await?;
///
/// for device in manager.devices() {
///     if device.capabilities(&kasa_sync::state::Endpoint::Main).contains(&Capability::On) {
///         device.set(Capability::On, true).await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Device<B> {
    coordinator: Arc<UpdateCoordinator<B>>,
    device: Arc<ManagedDevice>,
}

impl<B: DeviceBackend> Device<B> {
    pub(crate) fn new(coordinator: Arc<UpdateCoordinator<B>>, device: Arc<ManagedDevice>) -> Self {
        Self {
            coordinator,
            device,
        }
    }

    /// Returns the device identifier.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        self.device.id()
    }

    /// Returns the user-visible name.
    #[must_use]
    pub fn alias(&self) -> String {
        self.device.alias()
    }

    /// Returns the hardware address, if known.
    #[must_use]
    pub fn mac(&self) -> Option<&str> {
        self.device.mac()
    }

    /// Returns `true` once the device has been quarantined.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.device.is_offline()
    }

    /// Returns when the device last answered a refresh.
    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.device.last_seen()
    }

    /// Returns the current snapshot without refreshing.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.device.state()
    }

    /// Returns the children of a multi-outlet device.
    #[must_use]
    pub fn children(&self) -> Vec<ChildState> {
        self.device.state().children().to_vec()
    }

    /// Returns the capabilities exposed on `endpoint`.
    #[must_use]
    pub fn capabilities(&self, endpoint: &Endpoint) -> Vec<Capability> {
        self.device
            .state()
            .channel(endpoint)
            .map(|channel| channel.capabilities())
            .unwrap_or_default()
    }

    /// Returns the underlying bookkeeping record.
    #[must_use]
    pub fn managed(&self) -> &ManagedDevice {
        &self.device
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Reads a capability of a single-channel device.
    ///
    /// # Errors
    ///
    /// See [`get_at`](Self::get_at).
    pub async fn get(&self, capability: Capability) -> Result<CapabilityValue> {
        self.get_at(&Endpoint::Main, capability).await
    }

    /// Reads a capability of one child.
    ///
    /// # Errors
    ///
    /// See [`get_at`](Self::get_at).
    pub async fn get_child(
        &self,
        child: &ChildId,
        capability: Capability,
    ) -> Result<CapabilityValue> {
        self.get_at(&Endpoint::Child(child.clone()), capability).await
    }

    /// Reads a capability after a coalesced refresh.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChildNotFound`] or [`Error::UnsupportedCapability`]
    /// if the endpoint does not expose `capability`. Backend failures are
    /// not errors here; they yield the safe default.
    pub async fn get_at(
        &self,
        endpoint: &Endpoint,
        capability: Capability,
    ) -> Result<CapabilityValue> {
        let fallback = capability.default_value();
        if self.coordinator.is_shutting_down() || self.device.is_offline() {
            return Ok(fallback);
        }
        self.resolve(&self.device.state(), endpoint, capability)?;

        if !self.device.has_pending_patch() {
            match self.coordinator.coalesced_refresh(&self.device).await {
                Ok(()) => {}
                Err(Error::DeviceOffline(_) | Error::ShuttingDown) => return Ok(fallback),
                Err(e) => return Err(e),
            }
        }

        Ok(self.device.value(endpoint, capability).unwrap_or(fallback))
    }

    /// Returns the power state of a single-channel device.
    ///
    /// # Errors
    ///
    /// See [`get_at`](Self::get_at).
    pub async fn is_on(&self) -> Result<bool> {
        let value = self.get(Capability::On).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Writes a capability of a single-channel device.
    ///
    /// # Errors
    ///
    /// See [`set_at`](Self::set_at).
    pub async fn set(
        &self,
        capability: Capability,
        value: impl Into<CapabilityValue>,
    ) -> Result<()> {
        self.set_at(&Endpoint::Main, capability, value).await
    }

    /// Writes a capability of one child.
    ///
    /// # Errors
    ///
    /// See [`set_at`](Self::set_at).
    pub async fn set_child(
        &self,
        child: &ChildId,
        capability: Capability,
        value: impl Into<CapabilityValue>,
    ) -> Result<()> {
        self.set_at(&Endpoint::Child(child.clone()), capability, value)
            .await
    }

    /// Switches a single-channel device on or off.
    ///
    /// # Errors
    ///
    /// See [`set_at`](Self::set_at).
    pub async fn set_on(&self, on: bool) -> Result<()> {
        self.set(Capability::On, on).await
    }

    /// Writes a capability.
    ///
    /// # Errors
    ///
    /// - [`Error::Value`] if `value` is outside the capability's domain or the
    ///   capability is read-only
    /// - [`Error::ChildNotFound`] / [`Error::UnsupportedCapability`] if the
    ///   endpoint does not expose `capability`
    /// - [`Error::ShuttingDown`] after shutdown
    /// - [`Error::DeviceOffline`] if the device is quarantined or the
    ///   command fails
    pub async fn set_at(
        &self,
        endpoint: &Endpoint,
        capability: Capability,
        value: impl Into<CapabilityValue>,
    ) -> Result<()> {
        let value = capability.validate(value.into())?;
        let child_index = self.resolve(&self.device.state(), endpoint, capability)?;
        let command = ControlCommand::for_capability(capability, value, child_index)?;

        if self.coordinator.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        if self.device.is_offline() {
            return Err(Error::DeviceOffline(self.id().clone()));
        }

        self.coordinator
            .write(&self.device, endpoint, capability, value, command)
            .await
    }

    /// Refreshes the snapshot, sharing the fetch with concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOffline`] if the refresh failed or the device
    /// was already quarantined.
    pub async fn refresh(&self) -> Result<()> {
        self.coordinator.coalesced_refresh(&self.device).await
    }

    // =========================================================================
    // Change notifications
    // =========================================================================

    /// Registers a callback invoked synchronously for every change of this
    /// device, with the endpoint, capability and new value.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Endpoint, Capability, CapabilityValue) + Send + Sync + 'static,
    {
        self.coordinator.callbacks().on_change(
            ChangeFilter::device(self.id().clone()),
            move |change| callback(&change.endpoint, change.capability, change.new),
        )
    }

    /// Removes a callback registered with [`on_change`](Self::on_change).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.coordinator.callbacks().unsubscribe(id)
    }

    /// Returns the backend child index addressed by `endpoint`, after
    /// checking that it exposes `capability`.
    fn resolve(
        &self,
        state: &DeviceState,
        endpoint: &Endpoint,
        capability: Capability,
    ) -> Result<Option<usize>> {
        let index = match endpoint {
            Endpoint::Main => None,
            Endpoint::Child(child_id) => {
                Some(state.child_index(child_id).ok_or_else(|| Error::ChildNotFound {
                    device_id: self.id().clone(),
                    child_id: child_id.clone(),
                })?)
            }
        };

        if state
            .channel(endpoint)
            .is_some_and(|channel| channel.supports(capability))
        {
            Ok(index)
        } else {
            Err(Error::UnsupportedCapability {
                device_id: self.id().clone(),
                capability,
            })
        }
    }
}

impl<B> Clone for Device<B> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            device: Arc::clone(&self.device),
        }
    }
}

impl<B> std::fmt::Debug for Device<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", self.device.id())
            .field("offline", &self.device.is_offline())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::backend::ControlField;
    use crate::backend::mock::{MockBackend, discovered};
    use crate::error::{BackendError, ValueError};
    use crate::manager::PlatformConfig;
    use crate::state::ChannelState;
    use crate::types::{Brightness, FanSpeedLevel};

    fn facade(initial: DeviceState, served: DeviceState) -> Device<MockBackend> {
        let backend = MockBackend::new();
        backend.set_state("10.0.0.5", served);
        let config = PlatformConfig::default();
        let coordinator = Arc::new(UpdateCoordinator::new(backend, &config));
        let device = Arc::new(ManagedDevice::new(
            discovered("dev", "10.0.0.5", initial),
            config.coalescing_window(),
        ));
        Device::new(coordinator, device)
    }

    fn plug(on: bool) -> DeviceState {
        DeviceState::Single(ChannelState::new(on))
    }

    fn strip() -> DeviceState {
        DeviceState::WithChildren(vec![
            ChildState::new("00", "Lamp", ChannelState::new(false)),
            ChildState::new(
                "01",
                "Fan",
                ChannelState::new(false).with_fan_speed(FanSpeedLevel::OFF),
            ),
        ])
    }

    fn backend(device: &Device<MockBackend>) -> &MockBackend {
        device.coordinator.backend()
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_getters_share_one_fetch() {
        let device = facade(plug(false), plug(true));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let device = device.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i * 10)).await;
                device.get(Capability::On).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(CapabilityValue::Bool(true)));
        }
        assert_eq!(backend(&device).fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn written_value_is_served_without_fetch() {
        let device = facade(plug(false), plug(false));

        device.set(Capability::On, true).await.unwrap();
        assert!(device.is_on().await.unwrap());
        assert_eq!(backend(&device).fetch_count(), 0);

        // The next refresh wins
        device.refresh().await.unwrap();
        assert!(!device.is_on().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_getter_returns_default_without_backend() {
        let device = facade(plug(true), plug(true));
        backend(&device).fail_with(Some(BackendError::Transport("down".to_string())));

        assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
        assert!(device.is_offline());
        assert_eq!(backend(&device).fetch_count(), 1);

        assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
        assert_eq!(backend(&device).fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_setter_fails_fast() {
        let device = facade(plug(true), plug(true));
        device.managed().mark_offline();

        assert_eq!(
            device.set_on(true).await,
            Err(Error::DeviceOffline(DeviceId::new("dev")))
        );
        assert!(backend(&device).commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_values_are_rejected_before_the_backend() {
        let device = facade(plug(true), plug(true));

        let err = device.set(Capability::On, 1).await.unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::InvalidType { .. })));

        let err = device.set(Capability::OutletInUse, true).await.unwrap_err();
        assert_eq!(err, Error::Value(ValueError::ReadOnly(Capability::OutletInUse)));

        let err = device.set(Capability::Brightness, 50).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));

        assert!(backend(&device).commands().is_empty());
        assert!(!device.is_offline());
    }

    #[tokio::test(start_paused = true)]
    async fn child_writes_carry_index() {
        let device = facade(strip(), strip());
        let fan = ChildId::new("01");

        device.set_child(&fan, Capability::RotationSpeed, 40).await.unwrap();

        let commands = backend(&device).commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].1.field, ControlField::FanSpeedLevel);
        assert_eq!(commands[0].1.child_index, Some(1));

        // 40% lands in the 26-50 bucket
        assert_eq!(
            device.get_child(&fan, Capability::RotationSpeed).await,
            Ok(CapabilityValue::Int(50))
        );
        assert_eq!(
            device.get_child(&fan, Capability::Active).await,
            Ok(CapabilityValue::Int(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_child_and_main_endpoint() {
        let device = facade(strip(), strip());

        assert!(matches!(
            device.get_child(&ChildId::new("07"), Capability::On).await,
            Err(Error::ChildNotFound { .. })
        ));
        assert!(matches!(
            device.get(Capability::On).await,
            Err(Error::UnsupportedCapability { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_short_circuits() {
        let device = facade(plug(true), plug(true));
        device.coordinator.begin_shutdown();

        assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));
        assert_eq!(device.set_on(false).await, Err(Error::ShuttingDown));
        assert_eq!(backend(&device).fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn on_change_receives_written_values() {
        let device = facade(
            DeviceState::Single(ChannelState::new(true).with_brightness(Brightness::clamped(80))),
            plug(true),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let id = {
            let calls = Arc::clone(&calls);
            device.on_change(move |endpoint, capability, value| {
                assert_eq!(endpoint, &Endpoint::Main);
                if capability == Capability::Brightness {
                    assert_eq!(value, CapabilityValue::Int(0));
                }
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        // Brightness 0 also switches the light off
        device.set(Capability::Brightness, 0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(device.get(Capability::On).await, Ok(CapabilityValue::Bool(false)));

        assert!(device.unsubscribe(id));
        device.set(Capability::Brightness, 10).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bridge_calls_resume_once_rediscovery_ends() {
        let device = facade(plug(false), plug(true));
        let window = PlatformConfig::default().coalescing_window();
        let sweep = device.coordinator.discovery().try_begin().unwrap();

        let setter = {
            let device = device.clone();
            tokio::spawn(async move { device.set_on(true).await })
        };
        let getter = {
            let device = device.clone();
            tokio::spawn(async move { device.get(Capability::On).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(backend(&device).commands().is_empty());
        assert_eq!(backend(&device).fetch_count(), 0);

        drop(sweep);
        let ended = tokio::time::Instant::now();
        setter.await.unwrap().unwrap();
        assert_eq!(getter.await.unwrap(), Ok(CapabilityValue::Bool(true)));
        assert!(ended.elapsed() <= window);
    }
}
