// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    /// Operations queued on or holding `mutex`.
    users: usize,
}

type LockTable<K> = Arc<Mutex<HashMap<K, LockEntry>>>;

/// Serializes actions per key, in arrival order.
///
/// Actions under the same key never overlap and run in FIFO order; actions
/// under different keys run concurrently. A key's entry exists only while
/// at least one action is queued or running for it.
///
/// An action that fails (or is cancelled) releases the key like any other;
/// its error reaches only its own caller.
///
/// # Examples
///
/// ```
/// use kasa_sync::sync::DeviceLock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let lock = DeviceLock::new();
///
/// let value = lock.with_lock("plug-1", || async { 42 }).await;
/// assert_eq!(value, 42);
///
/// // Entries are pruned once the queue drains
/// assert_eq!(lock.active_keys(), 0);
/// # }
/// ```
pub struct DeviceLock<K> {
    table: LockTable<K>,
}

impl<K> DeviceLock<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `action` once every earlier action for `key` has finished.
    pub async fn with_lock<F, Fut, R>(&self, key: K, action: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let lease = self.lease(key);
        let _guard = Arc::clone(&lease.mutex).lock_owned().await;
        action().await
    }

    /// Returns `true` if an action is queued or running for `key`.
    #[must_use]
    pub fn is_locked(&self, key: &K) -> bool {
        self.table.lock().contains_key(key)
    }

    /// Returns the number of keys with queued or running actions.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.table.lock().len()
    }

    fn lease(&self, key: K) -> Lease<K> {
        let mut table = self.table.lock();
        let entry = table.entry(key.clone()).or_insert_with(|| LockEntry {
            mutex: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        entry.users += 1;
        Lease {
            mutex: Arc::clone(&entry.mutex),
            key,
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> Default for DeviceLock<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for DeviceLock<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K> std::fmt::Debug for DeviceLock<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLock")
            .field("active_keys", &self.table.lock().len())
            .finish()
    }
}

/// Registration of one queued action; prunes the entry when the last one
/// leaves.
struct Lease<K: Eq + Hash> {
    mutex: Arc<AsyncMutex<()>>,
    key: K,
    table: LockTable<K>,
}

impl<K: Eq + Hash> Drop for Lease<K> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.users -= 1;
            if entry.users == 0 {
                table.remove(&self.key);
            }
        }
    }
}
