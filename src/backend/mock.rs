// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted backend for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{ConnectionParams, ControlCommand, DeviceBackend, DiscoveredDevice};
use crate::error::BackendError;
use crate::event::DeviceId;
use crate::state::DeviceState;

#[derive(Default)]
struct Inner {
    /// State served per host.
    states: Mutex<HashMap<String, DeviceState>>,
    /// One-shot fetch results, consumed before `states`.
    queued: Mutex<VecDeque<Result<DeviceState, BackendError>>>,
    failure: Mutex<Option<BackendError>>,
    delay: Mutex<Duration>,
    discovered: Mutex<Vec<DiscoveredDevice>>,
    commands: Mutex<Vec<(String, ControlCommand)>>,
    fetches: AtomicUsize,
    discoveries: AtomicUsize,
}

/// Backend double that counts calls and serves scripted results.
#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `state` for every fetch against `host`.
    pub(crate) fn set_state(&self, host: &str, state: DeviceState) {
        self.inner.states.lock().insert(host.to_string(), state);
    }

    /// Serves `result` for the next fetch, whatever the host.
    pub(crate) fn push_fetch(&self, result: Result<DeviceState, BackendError>) {
        self.inner.queued.lock().push_back(result);
    }

    /// Makes every call fail until cleared with `None`.
    pub(crate) fn fail_with(&self, failure: Option<BackendError>) {
        *self.inner.failure.lock() = failure;
    }

    /// Delays every call by `delay`.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = delay;
    }

    pub(crate) fn set_discovered(&self, devices: Vec<DiscoveredDevice>) {
        *self.inner.discovered.lock() = devices;
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn discover_count(&self) -> usize {
        self.inner.discoveries.load(Ordering::SeqCst)
    }

    /// Commands applied so far, with the host they targeted.
    pub(crate) fn commands(&self) -> Vec<(String, ControlCommand)> {
        self.inner.commands.lock().clone()
    }

    async fn prelude(&self) -> Result<(), BackendError> {
        let delay = *self.inner.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.inner.failure.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn host_of(connection: &ConnectionParams) -> String {
    connection.host().unwrap_or_default().to_string()
}

impl DeviceBackend for MockBackend {
    async fn fetch_state(
        &self,
        connection: &ConnectionParams,
    ) -> Result<DeviceState, BackendError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        self.prelude().await?;

        if let Some(result) = self.inner.queued.lock().pop_front() {
            return result;
        }
        let host = host_of(connection);
        self.inner
            .states
            .lock()
            .get(&host)
            .cloned()
            .ok_or_else(|| BackendError::Transport(format!("no route to {host}")))
    }

    async fn apply_command(
        &self,
        connection: &ConnectionParams,
        command: &ControlCommand,
    ) -> Result<(), BackendError> {
        self.prelude().await?;
        self.inner
            .commands
            .lock()
            .push((host_of(connection), command.clone()));
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, BackendError> {
        self.inner.discoveries.fetch_add(1, Ordering::SeqCst);
        self.prelude().await?;
        Ok(self.inner.discovered.lock().clone())
    }
}

/// Builds a discovery record for `id` reachable at `host`.
pub(crate) fn discovered(id: &str, host: &str, state: DeviceState) -> DiscoveredDevice {
    DiscoveredDevice {
        id: DeviceId::new(id),
        alias: format!("{id} alias"),
        mac: None,
        model: None,
        connection: ConnectionParams::new(serde_json::json!({ "host": host })),
        state,
    }
}
