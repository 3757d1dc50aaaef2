// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast bus shared by the coordinator and the manager.

use tokio::sync::broadcast::{self, error::RecvError};

use super::{DeviceEvent, DeviceId};

/// Fan-out of [`DeviceEvent`]s to any number of subscribers.
///
/// The buffer holds `capacity` events (`eventCapacity` in the platform
/// configuration). A subscriber that falls further behind loses the oldest
/// events and its next `recv` reports `RecvError::Lagged`.
///
/// # Examples
///
/// ```
/// use kasa_sync::event::{DeviceEvent, DeviceId, EventBus};
///
/// let bus = EventBus::with_capacity(16);
/// let _rx = bus.subscribe();
///
/// let delivered = bus.publish(DeviceEvent::device_added(DeviceId::new("8006A1")));
/// assert_eq!(delivered, 1);
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Buffer size used when none is configured.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Creates a bus with [`DEFAULT_CAPACITY`](Self::DEFAULT_CAPACITY).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering `capacity` events. Zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Returns the buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribes to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Subscribes to the events of one device.
    #[must_use]
    pub fn subscribe_device(&self, device_id: DeviceId) -> DeviceEvents {
        DeviceEvents {
            device_id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event and returns how many receivers got it.
    pub fn publish(&self, event: DeviceEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(?event, "No event subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding only the events of one device.
///
/// Lag is logged and skipped instead of being returned.
#[derive(Debug)]
pub struct DeviceEvents {
    device_id: DeviceId,
    receiver: broadcast::Receiver<DeviceEvent>,
}

impl DeviceEvents {
    /// Returns the device this stream follows.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Waits for the next event of the device.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.device_id() == Some(&self.device_id) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(device_id = %self.device_id, skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
