//! The mediator: parcel and dropsite registries plus the delivery coordinator.

use crate::dropsites::{DropsiteHandle, DropsiteState, SubscriberTarget};
use crate::error::{DiagnosticHook, DispatchError, Result};
use crate::naming::{inline_dropsite_name, IdSequence};
use crate::parcels::{ParcelHandle, ParcelState};
use crate::types::{DispatchStats, DropsiteId, Exports, Manifest, ParcelId, SubscriberId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Mediator configuration.
#[derive(Clone)]
pub struct DispatchConfig {
    /// Prefix for the dropsites created around inline subscriber functions.
    pub inline_prefix: String,

    /// Called for every malformed or misused call the mediator absorbs.
    pub on_diagnostic: Option<DiagnosticHook>,
}

impl DispatchConfig {
    pub fn with_inline_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inline_prefix = prefix.into();
        self
    }

    pub fn with_diagnostic_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.on_diagnostic = Some(Arc::new(hook));
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inline_prefix: "inline".to_string(),
            on_diagnostic: None,
        }
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("inline_prefix", &self.inline_prefix)
            .field("on_diagnostic", &self.on_diagnostic.is_some())
            .finish()
    }
}

/// Parcels and dropsites by id, with name lookups.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) parcels: HashMap<ParcelId, ParcelState>,
    parcel_names: HashMap<String, ParcelId>,
    pub(crate) dropsites: HashMap<DropsiteId, DropsiteState>,
    dropsite_names: HashMap<String, DropsiteId>,
}

impl Registry {
    fn stats(&self) -> DispatchStats {
        DispatchStats {
            channels: self.parcels.len(),
            variations: self.parcels.values().map(|p| p.variations.len()).sum(),
            dropsites: self.dropsites.len(),
            subscribers: self.dropsites.values().map(|d| d.subscribers.len()).sum(),
            pending: 0,
        }
    }
}

/// One queued `(parcel variation, dropsite)` delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingDelivery {
    pub(crate) parcel: ParcelId,
    pub(crate) variation: usize,
    pub(crate) dropsite: DropsiteId,
}

#[derive(Debug, Default)]
struct DeliveryQueue {
    in_progress: bool,
    pending: VecDeque<PendingDelivery>,
}

struct DispatchInner {
    config: DispatchConfig,
    registry: Mutex<Registry>,
    queue: Mutex<DeliveryQueue>,
    parcel_ids: IdSequence,
    dropsite_ids: IdSequence,
    inline_names: IdSequence,
}

/// Process-wide mediator between parcel producers and dropsite consumers.
///
/// Cloning is cheap and shares the same registries. Subscriber closures that
/// capture a clone keep the registries alive; call [`Dispatch::teardown`] to
/// release them.
#[derive(Clone)]
pub struct Dispatch {
    inner: Arc<DispatchInner>,
}

impl Dispatch {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                config,
                registry: Mutex::new(Registry::default()),
                queue: Mutex::new(DeliveryQueue::default()),
                parcel_ids: IdSequence::default(),
                dropsite_ids: IdSequence::default(),
                inline_names: IdSequence::default(),
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    // --- Channels ---

    /// Look up or create a channel, positioned at its latest variation.
    ///
    /// A new channel starts with one variation that has no exports yet.
    /// Returns `None` (and reports a diagnostic) for an empty name.
    pub fn channel(&self, name: &str) -> Option<ParcelHandle> {
        self.absorb_err(self.try_channel(name))
    }

    pub fn try_channel(&self, name: &str) -> Result<ParcelHandle> {
        if name.is_empty() {
            return Err(DispatchError::MissingName {
                operation: "channel",
            });
        }

        let id = {
            let mut registry = self.inner.registry.lock();
            let (id, created) = self.parcel_entry(&mut registry, name);
            let parcel = registry
                .parcels
                .get_mut(&id)
                .ok_or(DispatchError::Detached {
                    operation: "channel",
                })?;
            if created {
                parcel.add(Manifest::new(name), None);
            }
            parcel.latest();
            id
        };

        Ok(ParcelHandle::new(self.clone(), id, name))
    }

    /// Publish a new variation under `manifest.name`.
    ///
    /// `exports` may be left out and attached later with
    /// [`ParcelHandle::containing`]. The returned handle is positioned at the
    /// new variation. Returns `None` (and reports a diagnostic) when the
    /// manifest has no name.
    pub fn publish(&self, manifest: Manifest, exports: Option<Exports>) -> Option<ParcelHandle> {
        self.absorb_err(self.try_publish(manifest, exports))
    }

    pub fn try_publish(&self, manifest: Manifest, exports: Option<Exports>) -> Result<ParcelHandle> {
        if manifest.name.is_empty() {
            return Err(DispatchError::MissingName {
                operation: "publish",
            });
        }

        let name = manifest.name.clone();
        let id = {
            let mut registry = self.inner.registry.lock();
            let (id, _) = self.parcel_entry(&mut registry, &name);
            let parcel = registry
                .parcels
                .get_mut(&id)
                .ok_or(DispatchError::Detached {
                    operation: "publish",
                })?;
            let index = parcel.add(manifest, exports);
            parcel.latest();
            debug!(channel = %name, variation = index, "variation published");
            id
        };

        Ok(ParcelHandle::new(self.clone(), id, name))
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.inner.registry.lock().parcel_names.contains_key(name)
    }

    // --- Dropsites ---

    /// Look up or create a dropsite by name. Never fails.
    pub fn to(&self, name: &str) -> DropsiteHandle {
        let id = {
            let mut registry = self.inner.registry.lock();
            self.dropsite_entry(&mut registry, name)
        };
        DropsiteHandle::new(self.clone(), id, name)
    }

    pub fn has_dropsite(&self, name: &str) -> bool {
        self.inner.registry.lock().dropsite_names.contains_key(name)
    }

    // --- Lifecycle ---

    pub fn stats(&self) -> DispatchStats {
        let mut stats = self.inner.registry.lock().stats();
        stats.pending = self.inner.queue.lock().pending.len();
        stats
    }

    /// Drop every parcel, dropsite and queued delivery.
    ///
    /// Handles obtained earlier become inert. Returns the counters as they
    /// were just before teardown.
    pub fn teardown(&self) -> DispatchStats {
        let pending = std::mem::take(&mut self.inner.queue.lock().pending);
        let registry = std::mem::take(&mut *self.inner.registry.lock());

        let mut stats = registry.stats();
        stats.pending = pending.len();
        debug!(
            channels = stats.channels,
            dropsites = stats.dropsites,
            pending = stats.pending,
            "dispatch torn down"
        );

        // Subscriber closures may own clones of this dispatch; drop them
        // with no lock held.
        drop(registry);
        stats
    }

    // --- Crate internals ---

    pub(crate) fn same_registry(&self, other: &Dispatch) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` against a parcel. `None` if the parcel is gone (torn down).
    pub(crate) fn with_parcel<R>(
        &self,
        id: ParcelId,
        f: impl FnOnce(&mut ParcelState) -> R,
    ) -> Option<R> {
        let mut registry = self.inner.registry.lock();
        registry.parcels.get_mut(&id).map(f)
    }

    /// Run `f` against a dropsite. `None` if the dropsite is gone.
    pub(crate) fn with_dropsite<R>(
        &self,
        id: DropsiteId,
        f: impl FnOnce(&mut DropsiteState) -> R,
    ) -> Option<R> {
        let mut registry = self.inner.registry.lock();
        registry.dropsites.get_mut(&id).map(f)
    }

    /// Create a fresh, uniquely named dropsite for an inline subscriber.
    pub(crate) fn inline_dropsite(&self, channel: &str) -> DropsiteHandle {
        let (id, name) = {
            let mut registry = self.inner.registry.lock();
            let name = inline_dropsite_name(
                &self.inner.config.inline_prefix,
                channel,
                &self.inner.inline_names,
                |candidate| registry.dropsite_names.contains_key(candidate),
            );
            let id = self.dropsite_entry(&mut registry, &name);
            (id, name)
        };
        DropsiteHandle::new(self.clone(), id, name)
    }

    /// Report an absorbed misuse: log it and pass it to the hook.
    pub(crate) fn absorb(&self, err: DispatchError) {
        warn!(kind = err.as_label(), "{}", err);
        if let Some(hook) = &self.inner.config.on_diagnostic {
            hook(&err);
        }
    }

    fn absorb_err<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.absorb(err);
                None
            }
        }
    }

    fn parcel_entry(&self, registry: &mut Registry, name: &str) -> (ParcelId, bool) {
        if let Some(id) = registry.parcel_names.get(name) {
            return (*id, false);
        }

        let id = ParcelId(self.inner.parcel_ids.next());
        registry.parcels.insert(id, ParcelState::new(name));
        registry.parcel_names.insert(name.to_string(), id);
        debug!(channel = %name, "channel created");
        (id, true)
    }

    fn dropsite_entry(&self, registry: &mut Registry, name: &str) -> DropsiteId {
        if let Some(id) = registry.dropsite_names.get(name) {
            return *id;
        }

        let id = DropsiteId(self.inner.dropsite_ids.next());
        registry.dropsites.insert(id, DropsiteState::new(id, name));
        registry.dropsite_names.insert(name.to_string(), id);
        debug!(dropsite = %name, "dropsite created");
        id
    }

    // --- Delivery ---

    /// Request delivery of one variation at one dropsite.
    ///
    /// If a delivery is already running (typically because a subscriber is
    /// publishing from inside its callback) the request is queued and this
    /// returns immediately; the running coordinator drains it afterwards,
    /// in FIFO order. Otherwise this call becomes the coordinator and drains
    /// the queue until it is empty.
    pub(crate) fn deliver(&self, request: PendingDelivery) {
        {
            let mut queue = self.inner.queue.lock();
            queue.pending.push_back(request);
            if queue.in_progress {
                trace!(pending = queue.pending.len(), "delivery deferred");
                return;
            }
            queue.in_progress = true;
        }

        let mut guard = DrainGuard {
            dispatch: self,
            armed: true,
        };
        loop {
            let next = {
                let mut queue = self.inner.queue.lock();
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.in_progress = false;
                        guard.armed = false;
                        break;
                    }
                }
            };
            self.deliver_one(next);
        }
    }

    fn deliver_one(&self, request: PendingDelivery) {
        let (dropsite, targets, exports, manifest) = {
            let mut registry = self.inner.registry.lock();
            let Registry {
                parcels, dropsites, ..
            } = &mut *registry;

            let (Some(parcel), Some(site)) = (
                parcels.get_mut(&request.parcel),
                dropsites.get_mut(&request.dropsite),
            ) else {
                return;
            };

            site.remember(request.parcel, request.variation);

            let Some(variation) = parcel.variations.get_mut(request.variation) else {
                return;
            };
            let Some(exports) = variation.exports.clone() else {
                trace!(
                    channel = %parcel.name,
                    dropsite = %site.name,
                    variation = request.variation,
                    "no exports yet; kept for replay"
                );
                return;
            };

            // Check-and-mark under the registry lock keeps delivery at most
            // once per (variation, subscriber).
            let targets: Vec<_> = site
                .subscribers
                .iter()
                .filter(|s| variation.delivered_to.insert(s.id))
                .cloned()
                .collect();

            (site.name.clone(), targets, exports, variation.manifest.clone())
        };

        for subscriber in targets {
            // An earlier callback in this fan-out may have removed it.
            let attached = self
                .with_dropsite(request.dropsite, |site| site.has_subscriber(subscriber.id))
                .unwrap_or(false);
            if !attached {
                trace!(
                    dropsite = %dropsite,
                    subscriber = %subscriber.id,
                    "subscriber removed mid fan-out; skipped"
                );
                continue;
            }

            trace!(
                channel = %manifest.name,
                dropsite = %dropsite,
                variation = request.variation,
                subscriber = %subscriber.id,
                "delivering"
            );
            let accepted = subscriber
                .target
                .deliver(&dropsite, request.variation, &exports, &manifest);

            if !accepted {
                self.with_dropsite(request.dropsite, |site| {
                    site.remove_subscriber(subscriber.id)
                });
                self.absorb(DispatchError::SubscriberDropped {
                    dropsite: dropsite.clone(),
                    subscriber: subscriber.id.to_string(),
                });
            }
        }
    }

    pub(crate) fn attach_subscriber(
        &self,
        dropsite: DropsiteId,
        target: SubscriberTarget,
    ) -> Option<(SubscriberId, Vec<(ParcelId, usize)>)> {
        self.with_dropsite(dropsite, |site| {
            let id = site.add_subscriber(target);
            debug!(dropsite = %site.name, subscriber = %id, "subscriber attached");
            (id, site.seen.clone())
        })
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Releases the coordinator role if a subscriber panics mid-drain.
struct DrainGuard<'a> {
    dispatch: &'a Dispatch,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dispatch.inner.queue.lock().in_progress = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_identity_stable() {
        let dispatch = Dispatch::default();
        let a = dispatch.channel("cfg").unwrap();
        let b = dispatch.channel("cfg").unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(dispatch.stats().channels, 1);
        assert_eq!(dispatch.stats().variations, 1);
    }

    #[test]
    fn test_dropsite_identity_stable() {
        let dispatch = Dispatch::default();
        let a = dispatch.to("consumer");
        let b = dispatch.to("consumer");
        assert_eq!(a.id(), b.id());
        assert_eq!(dispatch.stats().dropsites, 1);
    }

    #[test]
    fn test_publish_appends_variations() {
        let dispatch = Dispatch::default();
        dispatch.publish(Manifest::new("cfg"), Some(json!(1)));
        let parcel = dispatch.publish(Manifest::new("cfg"), Some(json!(2))).unwrap();

        assert_eq!(parcel.variation_count(), 2);
        assert_eq!(parcel.position(), Some(1));
        assert_eq!(parcel.exports(), Some(json!(2)));
    }

    #[test]
    fn test_publish_without_name_is_absorbed() {
        let dispatch = Dispatch::default();
        assert!(dispatch.publish(Manifest::default(), Some(json!(1))).is_none());
        assert!(dispatch.channel("").is_none());
        assert_eq!(dispatch.stats().channels, 0);

        let err = dispatch.try_publish(Manifest::default(), None).unwrap_err();
        assert_eq!(err.as_label(), "missing_name");
    }

    #[test]
    fn test_teardown_clears_registries() {
        let dispatch = Dispatch::default();
        dispatch.publish(Manifest::new("cfg"), Some(json!(1))).unwrap().to("site");
        dispatch.to("site").at(|_, _| {});

        let stats = dispatch.teardown();
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.dropsites, 1);
        assert_eq!(stats.subscribers, 1);
        assert_eq!(dispatch.stats(), DispatchStats::default());
        assert!(!dispatch.has_channel("cfg"));
    }

    #[test]
    fn test_guard_cleared_after_empty_variation() {
        let dispatch = Dispatch::default();
        dispatch.channel("reserved").unwrap().to("site");
        assert!(!dispatch.inner.queue.lock().in_progress);

        dispatch
            .publish(Manifest::new("later"), Some(json!(1)))
            .unwrap()
            .to("site");
        assert!(!dispatch.inner.queue.lock().in_progress);
        assert_eq!(dispatch.stats().pending, 0);
    }
}
