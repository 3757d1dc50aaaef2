// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Repeating per-device refresh timers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::event::DeviceId;

/// What a poll tick asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep the timer armed.
    Continue,
    /// Stop polling this device.
    Stop,
}

struct PollTask {
    token: u64,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

type TaskTable = Arc<Mutex<HashMap<DeviceId, PollTask>>>;

/// Owns one repeating timer per device.
///
/// Each tick awaits its action before the timer is polled again, so ticks
/// never stack up behind a slow refresh. Stopping a device prevents future
/// ticks; a tick already running completes.
#[derive(Clone, Default)]
pub struct PollingScheduler {
    tasks: TaskTable,
    next_token: Arc<AtomicU64>,
}

impl PollingScheduler {
    /// Creates a scheduler with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer firing every `period`, first one `period` from now.
    ///
    /// A timer already running for `device_id` is stopped first.
    pub fn start<F, Fut>(&self, device_id: DeviceId, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = PollOutcome> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let tasks = Arc::clone(&self.tasks);
        let id = device_id.clone();

        // Held across spawn so the task cannot deregister before it is
        // registered.
        let mut table = self.tasks.lock();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                if tick().await == PollOutcome::Stop {
                    break;
                }
            }

            let mut table = tasks.lock();
            if table.get(&id).is_some_and(|task| task.token == token) {
                table.remove(&id);
            }
            tracing::debug!(device_id = %id, "Polling stopped");
        });

        if let Some(previous) = table.insert(device_id.clone(), PollTask { token, stop, handle }) {
            let _ = previous.stop.send(());
        }
        tracing::debug!(%device_id, period_ms = period.as_millis(), "Polling started");
    }

    /// Stops the timer of a device. Returns `false` if none was running.
    pub fn stop(&self, device_id: &DeviceId) -> bool {
        match self.tasks.lock().remove(device_id) {
            Some(task) => {
                let _ = task.stop.send(());
                true
            }
            None => false,
        }
    }

    /// Stops every timer.
    pub fn stop_all(&self) {
        let tasks: Vec<PollTask> = self.tasks.lock().drain().map(|(_, task)| task).collect();
        for task in tasks {
            let _ = task.stop.send(());
        }
    }

    /// Returns `true` if a timer is armed for the device.
    #[must_use]
    pub fn is_polling(&self, device_id: &DeviceId) -> bool {
        self.tasks
            .lock()
            .get(device_id)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Returns the number of armed timers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("active", &self.tasks.lock().len())
            .finish()
    }
}
