// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cycle signals: "an operation of this kind is running" flags that can be
//! awaited until they clear.
//!
//! Each cycle (begin → end) bumps a generation counter. Waiting checks the
//! current value before blocking, so a waiter that arrives after a cycle
//! already finished returns immediately instead of hanging until the next
//! one.

use std::sync::Arc;

use tokio::sync::watch;

/// Snapshot of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cycle {
    /// Number of cycles started so far.
    pub generation: u64,
    /// Number of cycles currently running.
    pub active: usize,
}

/// A resettable "in progress" signal backed by a `watch` channel.
///
/// # Examples
///
/// ```
/// use kasa_sync::sync::CycleSignal;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let signal = CycleSignal::new();
///
/// let guard = signal.begin();
/// assert!(signal.is_active());
/// drop(guard);
///
/// // Already idle: returns immediately
/// signal.wait_idle().await;
/// assert_eq!(signal.generation(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CycleSignal {
    tx: Arc<watch::Sender<Cycle>>,
}

impl CycleSignal {
    /// Creates an idle signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(Cycle::default())),
        }
    }

    /// Starts a cycle. The cycle ends when the guard is dropped.
    #[must_use = "the cycle ends as soon as the guard is dropped"]
    pub fn begin(&self) -> CycleGuard {
        self.tx.send_modify(|cycle| {
            cycle.active += 1;
            cycle.generation += 1;
        });
        CycleGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Starts a cycle only if none is running.
    #[must_use = "the cycle ends as soon as the guard is dropped"]
    pub fn try_begin(&self) -> Option<CycleGuard> {
        let started = self.tx.send_if_modified(|cycle| {
            if cycle.active > 0 {
                return false;
            }
            cycle.active = 1;
            cycle.generation += 1;
            true
        });
        started.then(|| CycleGuard {
            tx: Arc::clone(&self.tx),
        })
    }

    /// Returns `true` while at least one cycle is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tx.borrow().active > 0
    }

    /// Returns the number of cycles started so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn current(&self) -> Cycle {
        *self.tx.borrow()
    }

    /// Waits until no cycle is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|cycle| cycle.active == 0).await;
    }
}

impl Default for CycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends its cycle when dropped.
#[derive(Debug)]
pub struct CycleGuard {
    tx: Arc<watch::Sender<Cycle>>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|cycle| {
            cycle.active = cycle.active.saturating_sub(1);
        });
    }
}

/// Pauses per-device updates while a platform-wide rediscovery runs.
///
/// At most one rediscovery runs at a time.
///
/// ```
/// use kasa_sync::sync::DiscoverySignal;
///
/// let signal = DiscoverySignal::new();
/// let sweep = signal.try_begin().unwrap();
/// assert!(signal.is_in_progress());
/// assert!(signal.try_begin().is_none());
/// drop(sweep);
/// assert!(!signal.is_in_progress());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DiscoverySignal {
    signal: CycleSignal,
}

impl DiscoverySignal {
    /// Creates a signal with no rediscovery running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a rediscovery as started, unless one already is.
    #[must_use = "the rediscovery ends as soon as the guard is dropped"]
    pub fn try_begin(&self) -> Option<CycleGuard> {
        self.signal.try_begin()
    }

    /// Returns `true` while a rediscovery runs.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.signal.is_active()
    }

    /// Returns the number of rediscoveries started so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.signal.generation()
    }

    /// Waits until no rediscovery runs.
    pub async fn wait_finished(&self) {
        self.signal.wait_idle().await;
    }
}
