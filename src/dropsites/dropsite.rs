//! Dropsite state: subscribers plus the cache of variations seen so far.

use crate::naming::IdSequence;
use crate::types::{Delivery, DropsiteId, Exports, Manifest, ParcelId, SubscriberId};
use crossbeam_channel::{Sender, TrySendError};
use std::fmt;
use std::sync::Arc;

/// Subscriber callback: receives the exports and manifest of a variation.
pub type SubscriberFn = Arc<dyn Fn(&Exports, &Manifest) + Send + Sync>;

/// Where deliveries to a subscriber go.
#[derive(Clone)]
pub(crate) enum SubscriberTarget {
    Callback(SubscriberFn),
    Channel(Sender<Delivery>),
}

impl SubscriberTarget {
    /// Hand a delivery to the target. Returns false if a channel target
    /// could not accept it.
    pub(crate) fn deliver(
        &self,
        dropsite: &str,
        variation: usize,
        exports: &Exports,
        manifest: &Manifest,
    ) -> bool {
        match self {
            SubscriberTarget::Callback(f) => {
                f(exports, manifest);
                true
            }
            SubscriberTarget::Channel(tx) => {
                let delivery = Delivery {
                    dropsite: dropsite.to_string(),
                    variation,
                    manifest: manifest.clone(),
                    exports: exports.clone(),
                };
                match tx.try_send(delivery) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => false,
                    Err(TrySendError::Disconnected(_)) => false,
                }
            }
        }
    }
}

impl fmt::Debug for SubscriberTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberTarget::Callback(_) => f.write_str("Callback"),
            SubscriberTarget::Channel(_) => f.write_str("Channel"),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Subscriber {
    pub(crate) id: SubscriberId,
    pub(crate) target: SubscriberTarget,
}

/// Registry entry for a dropsite.
#[derive(Debug)]
pub(crate) struct DropsiteState {
    pub(crate) id: DropsiteId,
    pub(crate) name: String,
    pub(crate) subscribers: Vec<Subscriber>,

    /// `(parcel, variation)` pairs routed here, in first-seen order.
    /// Replayed to late subscribers.
    pub(crate) seen: Vec<(ParcelId, usize)>,

    /// Subscriber ids are scoped to this dropsite.
    next_subscriber: IdSequence,
}

impl DropsiteState {
    pub(crate) fn new(id: DropsiteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            subscribers: Vec::new(),
            seen: Vec::new(),
            next_subscriber: IdSequence::default(),
        }
    }

    pub(crate) fn add_subscriber(&mut self, target: SubscriberTarget) -> SubscriberId {
        let id = SubscriberId {
            dropsite: self.id,
            seq: self.next_subscriber.next(),
        };
        self.subscribers.push(Subscriber { id, target });
        id
    }

    pub(crate) fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub(crate) fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }

    /// Cache a variation for replay. Returns false if already cached.
    pub(crate) fn remember(&mut self, parcel: ParcelId, variation: usize) -> bool {
        if self.seen.contains(&(parcel, variation)) {
            return false;
        }
        self.seen.push((parcel, variation));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscriber_ids_scoped_to_dropsite() {
        let mut a = DropsiteState::new(DropsiteId(1), "a");
        let mut b = DropsiteState::new(DropsiteId(2), "b");
        let noop: SubscriberFn = Arc::new(|_, _| {});

        let a1 = a.add_subscriber(SubscriberTarget::Callback(noop.clone()));
        let a2 = a.add_subscriber(SubscriberTarget::Callback(noop.clone()));
        let b1 = b.add_subscriber(SubscriberTarget::Callback(noop));

        assert_ne!(a1, a2);
        assert_eq!(a1.seq, b1.seq);
        assert_ne!(a1, b1);
    }

    #[test]
    fn test_remember_dedups() {
        let mut site = DropsiteState::new(DropsiteId(1), "a");
        assert!(site.remember(ParcelId(1), 0));
        assert!(site.remember(ParcelId(1), 1));
        assert!(!site.remember(ParcelId(1), 0));
        assert_eq!(site.seen, vec![(ParcelId(1), 0), (ParcelId(1), 1)]);
    }

    #[test]
    fn test_remove_subscriber() {
        let mut site = DropsiteState::new(DropsiteId(1), "a");
        let id = site.add_subscriber(SubscriberTarget::Callback(Arc::new(|_, _| {})));
        assert!(site.has_subscriber(id));
        assert!(site.remove_subscriber(id));
        assert!(!site.remove_subscriber(id));
        assert!(!site.has_subscriber(id));
        assert!(site.subscribers.is_empty());
    }

    #[test]
    fn test_callback_target_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let target = SubscriberTarget::Callback(Arc::new(move |exports, manifest| {
            assert_eq!(exports, &json!(7));
            assert_eq!(manifest.name, "cfg");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(target.deliver("a", 0, &json!(7), &Manifest::new("cfg")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_target_reports_full_buffer() {
        let (tx, rx) = bounded(1);
        let target = SubscriberTarget::Channel(tx);
        let manifest = Manifest::new("cfg");

        assert!(target.deliver("a", 0, &json!(1), &manifest));
        assert!(!target.deliver("a", 1, &json!(2), &manifest));

        let delivery = rx.try_recv().unwrap();
        assert_eq!(delivery.variation, 0);
        assert_eq!(delivery.exports, json!(1));
    }
}
