//! Handle over a registered dropsite.

use super::dropsite::{SubscriberFn, SubscriberTarget};
use super::subscription::SubscriptionHandle;
use crate::dispatch::{Dispatch, PendingDelivery};
use crate::error::DispatchError;
use crate::types::{DropsiteId, Exports, Manifest, SubscriberId};
use crossbeam_channel::bounded;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Handle to a named delivery endpoint.
#[derive(Clone)]
pub struct DropsiteHandle {
    dispatch: Dispatch,
    id: DropsiteId,
    name: String,
}

impl DropsiteHandle {
    pub(crate) fn new(dispatch: Dispatch, id: DropsiteId, name: impl Into<String>) -> Self {
        Self {
            dispatch,
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> DropsiteId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Attach a subscriber and replay everything already routed here.
    pub fn at<F>(self, f: F) -> Self
    where
        F: Fn(&Exports, &Manifest) + Send + Sync + 'static,
    {
        self.attach(f);
        self
    }

    /// Like [`at`](Self::at), returning the new subscriber's id.
    pub fn attach<F>(&self, f: F) -> Option<SubscriberId>
    where
        F: Fn(&Exports, &Manifest) + Send + Sync + 'static,
    {
        self.attach_fn(Arc::new(f))
    }

    /// Subscribe through a bounded channel instead of a callback.
    ///
    /// Deliveries that find the buffer full (or the receiver gone) are
    /// dropped, and the subscriber is removed from the dropsite. Removal
    /// closes the channel: once the buffer is drained, the receiver sees
    /// `Disconnected`.
    pub fn subscribe(&self, buffer_size: usize) -> Option<SubscriptionHandle> {
        let (sender, receiver) = bounded(buffer_size.max(1));
        self.attach_target(SubscriberTarget::Channel(sender))
            .map(|id| SubscriptionHandle { id, receiver })
    }

    /// Remove a subscriber. Returns false if it was not attached here.
    ///
    /// Takes effect immediately, including for a fan-out already in
    /// progress on this dropsite.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .dispatch
            .with_dropsite(self.id, |site| site.remove_subscriber(id))
            .unwrap_or(false);
        if removed {
            debug!(dropsite = %self.name, subscriber = %id, "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.dispatch
            .with_dropsite(self.id, |site| site.subscribers.len())
            .unwrap_or(0)
    }

    /// Number of variations cached here for replay.
    pub fn seen_count(&self) -> usize {
        self.dispatch
            .with_dropsite(self.id, |site| site.seen.len())
            .unwrap_or(0)
    }

    pub(crate) fn attach_fn(&self, f: SubscriberFn) -> Option<SubscriberId> {
        self.attach_target(SubscriberTarget::Callback(f))
    }

    fn attach_target(&self, target: SubscriberTarget) -> Option<SubscriberId> {
        let Some((id, seen)) = self.dispatch.attach_subscriber(self.id, target) else {
            self.dispatch
                .absorb(DispatchError::Detached { operation: "at" });
            return None;
        };

        for (parcel, variation) in seen {
            self.dispatch.deliver(PendingDelivery {
                parcel,
                variation,
                dropsite: self.id,
            });
        }
        Some(id)
    }
}

impl fmt::Debug for DropsiteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropsiteHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
