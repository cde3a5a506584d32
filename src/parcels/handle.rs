//! Fluent handle over a registered parcel.

use super::parcel::Attach;
use crate::dispatch::{Dispatch, PendingDelivery};
use crate::dropsites::{DropsiteHandle, SubscriberFn};
use crate::error::DispatchError;
use crate::types::{Exports, Manifest, ParcelId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Where a parcel should be delivered.
#[derive(Clone)]
pub enum Target {
    /// A dropsite looked up (or created) by name.
    Named(String),
    /// An already resolved dropsite.
    Dropsite(DropsiteHandle),
    /// A subscriber function, wrapped in its own anonymous dropsite.
    Inline(SubscriberFn),
}

impl Target {
    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(&Exports, &Manifest) + Send + Sync + 'static,
    {
        Target::Inline(Arc::new(f))
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Named(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Named(name)
    }
}

impl From<DropsiteHandle> for Target {
    fn from(handle: DropsiteHandle) -> Self {
        Target::Dropsite(handle)
    }
}

impl From<&DropsiteHandle> for Target {
    fn from(handle: &DropsiteHandle) -> Self {
        Target::Dropsite(handle.clone())
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Target::Dropsite(handle) => f.debug_tuple("Dropsite").field(&handle.name()).finish(),
            Target::Inline(_) => f.write_str("Inline"),
        }
    }
}

/// Handle to a channel's parcel.
///
/// The position (which variation is "current") lives in the registry, so
/// every handle to the same channel observes the same position. Chaining
/// methods consume and return the handle; none of them fail. Misuse is
/// reported through the dispatch diagnostics and otherwise ignored.
#[derive(Clone)]
pub struct ParcelHandle {
    dispatch: Dispatch,
    id: ParcelId,
    name: String,
}

impl ParcelHandle {
    pub(crate) fn new(dispatch: Dispatch, id: ParcelId, name: impl Into<String>) -> Self {
        Self {
            dispatch,
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> ParcelId {
        self.id
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // --- Inspection ---

    /// Index of the positioned variation, if any.
    pub fn position(&self) -> Option<usize> {
        self.dispatch.with_parcel(self.id, |p| p.index).flatten()
    }

    pub fn variation_count(&self) -> usize {
        self.dispatch
            .with_parcel(self.id, |p| p.variations.len())
            .unwrap_or(0)
    }

    /// Manifest of the positioned variation.
    pub fn manifest(&self) -> Option<Manifest> {
        self.dispatch
            .with_parcel(self.id, |p| p.current().map(|v| v.manifest.clone()))
            .flatten()
    }

    /// Exports of the positioned variation, if published.
    pub fn exports(&self) -> Option<Exports> {
        self.dispatch
            .with_parcel(self.id, |p| p.current().and_then(|v| v.exports.clone()))
            .flatten()
    }

    /// Every variation in publish order.
    pub fn variations(&self) -> Vec<(Manifest, Option<Exports>)> {
        self.dispatch
            .with_parcel(self.id, |p| {
                p.variations
                    .iter()
                    .map(|v| (v.manifest.clone(), v.exports.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_index_locked(&self) -> bool {
        self.dispatch
            .with_parcel(self.id, |p| p.index_locked)
            .unwrap_or(false)
    }

    /// True while `only_to` restricts delivery to a single dropsite.
    pub fn is_dropsite_locked(&self) -> bool {
        self.dispatch
            .with_parcel(self.id, |p| p.dropsite_locked)
            .unwrap_or(false)
    }

    /// Number of dropsites this parcel has been directed to.
    pub fn dropsite_count(&self) -> usize {
        self.dispatch
            .with_parcel(self.id, |p| p.dropsites.len())
            .unwrap_or(0)
    }

    // --- Chaining ---

    /// Position at the first variation whose manifest names `recipient`.
    ///
    /// The position is pinned: a following [`containing`](Self::containing)
    /// is ignored until the channel is looked up again. With no match the
    /// handle is left unpositioned.
    pub fn intended_for(self, recipient: &str) -> Self {
        match self.dispatch.with_parcel(self.id, |p| p.intended_for(recipient)) {
            None => self.detached("intended_for"),
            Some(None) => self.dispatch.absorb(DispatchError::NoRecipient {
                channel: self.name.clone(),
                recipient: recipient.to_string(),
            }),
            Some(Some(index)) => {
                trace!(channel = %self.name, recipient, variation = index, "recipient located")
            }
        }
        self
    }

    /// Attach exports to the positioned variation.
    ///
    /// Published exports are never replaced: if the variation already has
    /// exports a new variation is appended and the handle moves to it.
    pub fn containing(self, exports: Exports) -> Self {
        match self.dispatch.with_parcel(self.id, |p| p.attach(exports)) {
            None => self.detached("containing"),
            Some(Attach::Locked) => {
                debug!(channel = %self.name, "position pinned by recipient lookup; exports ignored")
            }
            Some(Attach::Unpositioned) => self.dispatch.absorb(DispatchError::Unpositioned {
                channel: self.name.clone(),
                operation: "containing",
            }),
            Some(Attach::InPlace(index)) => {
                debug!(channel = %self.name, variation = index, "exports attached")
            }
            Some(Attach::Appended(index)) => {
                debug!(channel = %self.name, variation = index, "exports attached as new variation")
            }
        }
        self
    }

    /// Direct the parcel to a dropsite and deliver.
    ///
    /// Unless `only_to` locked the parcel to one dropsite, every dropsite the
    /// parcel was directed to so far is (re)delivered in order, so earlier
    /// targets are flushed before this one.
    pub fn to(self, target: impl Into<Target>) -> Self {
        self.send_to(target.into(), false)
    }

    /// Like [`to`](Self::to), but also delivers to this dropsite when the
    /// parcel is locked to a single recipient.
    pub fn to_forced(self, target: impl Into<Target>) -> Self {
        self.send_to(target.into(), true)
    }

    /// Deliver straight to a subscriber function.
    pub fn to_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Exports, &Manifest) + Send + Sync + 'static,
    {
        self.send_to(Target::inline(f), false)
    }

    /// Restrict delivery to this dropsite and deliver to it now.
    pub fn only_to(self, target: impl Into<Target>) -> Self {
        if self
            .dispatch
            .with_parcel(self.id, |p| p.dropsite_locked = true)
            .is_none()
        {
            self.detached("only_to");
            return self;
        }
        self.send_to(target.into(), true)
    }

    /// Lift the single-recipient lock and deliver the positioned variation
    /// to every dropsite this parcel was ever directed to.
    pub fn to_all(self) -> Self {
        let state = self.dispatch.with_parcel(self.id, |p| {
            p.dropsite_locked = false;
            (p.index, p.dropsites.clone())
        });

        let Some((index, dropsites)) = state else {
            self.detached("to_all");
            return self;
        };
        if dropsites.is_empty() {
            return self;
        }
        let Some(variation) = index else {
            self.dispatch.absorb(DispatchError::Unpositioned {
                channel: self.name.clone(),
                operation: "to_all",
            });
            return self;
        };

        for dropsite in dropsites {
            self.dispatch.deliver(PendingDelivery {
                parcel: self.id,
                variation,
                dropsite,
            });
        }
        self
    }

    fn send_to(self, target: Target, force: bool) -> Self {
        let Some(dropsite) = self.resolve(target) else {
            self.detached("to");
            return self;
        };

        let state = self.dispatch.with_parcel(self.id, |p| {
            p.associate(dropsite.id());
            (p.dropsite_locked, p.index)
        });
        let Some((locked, index)) = state else {
            self.detached("to");
            return self;
        };

        if !locked {
            return self.to_all();
        }

        if !force {
            debug!(
                channel = %self.name,
                dropsite = %dropsite.name(),
                "locked to a single dropsite; delivery held back"
            );
            return self;
        }

        match index {
            Some(variation) => self.dispatch.deliver(PendingDelivery {
                parcel: self.id,
                variation,
                dropsite: dropsite.id(),
            }),
            None => self.dispatch.absorb(DispatchError::Unpositioned {
                channel: self.name.clone(),
                operation: "to",
            }),
        }
        self
    }

    /// Map a target onto a dropsite of this dispatch.
    ///
    /// Returns `None` for a handle whose dropsite was torn down.
    fn resolve(&self, target: Target) -> Option<DropsiteHandle> {
        let handle = match target {
            Target::Named(name) => self.dispatch.to(&name),
            Target::Dropsite(handle) if handle.dispatch().same_registry(&self.dispatch) => {
                self.dispatch.with_dropsite(handle.id(), |_| ())?;
                handle
            }
            Target::Dropsite(handle) => self.dispatch.to(handle.name()),
            Target::Inline(f) => {
                let handle = self.dispatch.inline_dropsite(&self.name);
                handle.attach_fn(f);
                handle
            }
        };
        Some(handle)
    }

    fn detached(&self, operation: &'static str) {
        self.dispatch.absorb(DispatchError::Detached { operation });
    }
}

impl fmt::Debug for ParcelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParcelHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
