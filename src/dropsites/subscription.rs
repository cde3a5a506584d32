//! Channel-backed subscriptions.

use crate::types::{Delivery, SubscriberId};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end of a channel subscriber.
///
/// The channel closes when the subscriber is removed, whether by
/// `unsubscribe` or by an overflowed buffer.
pub struct SubscriptionHandle {
    pub id: SubscriberId,
    /// Channel to receive deliveries.
    pub receiver: Receiver<Delivery>,
}

impl SubscriptionHandle {
    /// Receive the next delivery (blocking).
    pub fn recv(&self) -> Result<Delivery, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a delivery (non-blocking).
    pub fn try_recv(&self) -> Result<Delivery, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Delivery, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }
}
