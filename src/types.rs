//! Core types for the dispatch mediator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque payload carried by a variation.
pub type Exports = Value;

/// Unique identifier for a parcel (one per channel name).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelId(pub u64);

impl fmt::Debug for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParcelId({})", self.0)
    }
}

/// Unique identifier for a dropsite.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropsiteId(pub u64);

impl fmt::Debug for DropsiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DropsiteId({})", self.0)
    }
}

/// Subscriber identifier, unique within its dropsite.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId {
    pub dropsite: DropsiteId,
    pub seq: u64,
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({}/{})", self.dropsite.0, self.seq)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dropsite.0, self.seq)
    }
}

/// Metadata describing one published variation.
///
/// Serializes as a flat object: `{"name": .., "recipient": .., ...extra}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Channel the variation was published under.
    pub name: String,

    /// Consumer this variation is addressed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Any other application-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Manifest carrying only a channel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Manifest addressed to a specific recipient.
    pub fn for_recipient(name: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self::new(name).with_recipient(recipient)
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Add an application-defined field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl From<&str> for Manifest {
    fn from(name: &str) -> Self {
        Manifest::new(name)
    }
}

impl From<String> for Manifest {
    fn from(name: String) -> Self {
        Manifest::new(name)
    }
}

/// An owned copy of one delivery, as handed to channel subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Dropsite the variation was delivered at.
    pub dropsite: String,
    /// Index of the delivered variation within its parcel.
    pub variation: usize,
    pub manifest: Manifest,
    pub exports: Exports,
}

/// Registry counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub channels: usize,
    pub variations: usize,
    pub dropsites: usize,
    pub subscribers: usize,
    /// Deliveries queued behind the one in flight.
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_serializes_flat() {
        let manifest = Manifest::for_recipient("cfg", "moduleX").with_field("version", json!(2));
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value, json!({"name": "cfg", "recipient": "moduleX", "version": 2}));

        let back: Manifest = serde_json::from_value(value).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_manifest_without_recipient_omits_field() {
        let value = serde_json::to_value(Manifest::new("feature-flags")).unwrap();
        assert_eq!(value, json!({"name": "feature-flags"}));
    }

    #[test]
    fn test_subscriber_id_display() {
        let id = SubscriberId {
            dropsite: DropsiteId(4),
            seq: 2,
        };
        assert_eq!(id.to_string(), "4/2");
    }
}
