//! Parcel state: the append-only variation history of one channel.

use crate::types::{DropsiteId, Exports, Manifest, SubscriberId};
use std::collections::HashSet;

/// One manifest + exports pairing recorded under a channel.
#[derive(Debug)]
pub(crate) struct Variation {
    pub(crate) manifest: Manifest,

    /// `None` until published; set at most once.
    pub(crate) exports: Option<Exports>,

    /// Subscribers that already received this variation.
    pub(crate) delivered_to: HashSet<SubscriberId>,
}

impl Variation {
    fn new(manifest: Manifest, exports: Option<Exports>) -> Self {
        Self {
            manifest,
            exports,
            delivered_to: HashSet::new(),
        }
    }
}

/// Outcome of attaching exports to the positioned variation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Attach {
    /// Position was pinned by a recipient lookup; nothing changed.
    Locked,
    /// Exports were set on the positioned variation in place.
    InPlace(usize),
    /// The positioned variation was already published; a new one was appended.
    Appended(usize),
    /// No variation is positioned.
    Unpositioned,
}

/// Registry entry for a channel.
#[derive(Debug)]
pub(crate) struct ParcelState {
    pub(crate) name: String,
    pub(crate) variations: Vec<Variation>,

    /// Currently positioned variation.
    pub(crate) index: Option<usize>,

    /// Set by `intended_for`; blocks `attach` until the next repositioning.
    pub(crate) index_locked: bool,

    /// Set by `only_to`; cleared by `to_all`.
    pub(crate) dropsite_locked: bool,

    /// Every dropsite this parcel was directed to, in first-use order.
    pub(crate) dropsites: Vec<DropsiteId>,
}

impl ParcelState {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variations: Vec::new(),
            index: None,
            index_locked: false,
            dropsite_locked: false,
            dropsites: Vec::new(),
        }
    }

    /// Append a variation and return its index.
    pub(crate) fn add(&mut self, manifest: Manifest, exports: Option<Exports>) -> usize {
        self.variations.push(Variation::new(manifest, exports));
        self.variations.len() - 1
    }

    /// Position at the latest variation and release any recipient pin.
    pub(crate) fn latest(&mut self) -> Option<usize> {
        self.index_locked = false;
        self.index = self.variations.len().checked_sub(1);
        self.index
    }

    /// Pin the position to the first variation addressed to `recipient`.
    ///
    /// On no match the parcel is left unpositioned.
    pub(crate) fn intended_for(&mut self, recipient: &str) -> Option<usize> {
        let found = self
            .variations
            .iter()
            .position(|v| v.manifest.recipient.as_deref() == Some(recipient));

        self.index = found;
        self.index_locked = found.is_some();
        found
    }

    pub(crate) fn attach(&mut self, exports: Exports) -> Attach {
        if self.index_locked {
            return Attach::Locked;
        }

        let Some(index) = self.index else {
            return Attach::Unpositioned;
        };

        let variation = &mut self.variations[index];
        if variation.exports.is_none() {
            variation.exports = Some(exports);
            Attach::InPlace(index)
        } else {
            let index = self.add(Manifest::new(self.name.clone()), Some(exports));
            self.index = Some(index);
            Attach::Appended(index)
        }
    }

    /// Record a dropsite association. Returns false if already associated.
    pub(crate) fn associate(&mut self, dropsite: DropsiteId) -> bool {
        if self.dropsites.contains(&dropsite) {
            return false;
        }
        self.dropsites.push(dropsite);
        true
    }

    pub(crate) fn current(&self) -> Option<&Variation> {
        self.index.and_then(|i| self.variations.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parcel() -> ParcelState {
        ParcelState::new("cfg")
    }

    #[test]
    fn test_latest_on_empty_is_unpositioned() {
        let mut p = parcel();
        assert_eq!(p.latest(), None);
        assert!(p.current().is_none());
    }

    #[test]
    fn test_attach_in_place_then_append() {
        let mut p = parcel();
        p.add(Manifest::new("cfg"), None);
        p.latest();

        assert_eq!(p.attach(json!(1)), Attach::InPlace(0));
        assert_eq!(p.attach(json!(2)), Attach::Appended(1));
        assert_eq!(p.variations.len(), 2);
        assert_eq!(p.variations[0].exports, Some(json!(1)));
        assert_eq!(p.current().unwrap().exports, Some(json!(2)));
        assert_eq!(p.current().unwrap().manifest, Manifest::new("cfg"));
    }

    #[test]
    fn test_intended_for_pins_and_blocks_attach() {
        let mut p = parcel();
        p.add(Manifest::for_recipient("cfg", "moduleX"), Some(json!({"v": 1})));
        p.add(Manifest::for_recipient("cfg", "moduleY"), Some(json!({"v": 2})));
        p.latest();

        assert_eq!(p.intended_for("moduleX"), Some(0));
        assert!(p.index_locked);
        assert_eq!(p.attach(json!({"v": 3})), Attach::Locked);
        assert_eq!(p.variations.len(), 2);

        p.latest();
        assert!(!p.index_locked);
        assert_eq!(p.index, Some(1));
    }

    #[test]
    fn test_intended_for_miss_unpositions() {
        let mut p = parcel();
        p.add(Manifest::for_recipient("cfg", "moduleX"), Some(json!(1)));
        p.latest();

        assert_eq!(p.intended_for("nobody"), None);
        assert_eq!(p.index, None);
        assert!(!p.index_locked);
        assert_eq!(p.attach(json!(2)), Attach::Unpositioned);
    }

    #[test]
    fn test_associate_dedups_and_keeps_order() {
        let mut p = parcel();
        assert!(p.associate(DropsiteId(3)));
        assert!(p.associate(DropsiteId(1)));
        assert!(!p.associate(DropsiteId(3)));
        assert_eq!(p.dropsites, vec![DropsiteId(3), DropsiteId(1)]);
    }
}
