//! # Parcel Dispatch
//!
//! An in-process mediator that lets independently loaded components exchange
//! named, versioned payloads without knowing about each other or about the
//! order in which they were started.
//!
//! ## Core Concepts
//!
//! - **Parcels**: a channel name with an append-only history of variations
//!   (manifest + exports pairs); published exports are never overwritten
//! - **Dropsites**: named endpoints with any number of subscribers and a cache
//!   of variations already routed there, replayed to late subscribers
//! - **Dispatch**: the registry of both, and the coordinator that serializes
//!   deliveries so a subscriber publishing from its own callback is queued
//!   behind the delivery in flight instead of interleaving with it
//!
//! ## Example
//!
//! ```ignore
//! use parcel_dispatch::{Dispatch, Manifest};
//! use serde_json::json;
//!
//! let dispatch = Dispatch::default();
//!
//! // Producer: publish and route, before any consumer exists.
//! dispatch
//!     .publish(Manifest::for_recipient("cfg", "moduleY"), Some(json!({"v": 2})))
//!     .unwrap()
//!     .to("consumer-1");
//!
//! // Consumer: receives the earlier parcel as soon as it attaches.
//! dispatch.to("consumer-1").at(|exports, manifest| {
//!     assert_eq!(manifest.name, "cfg");
//!     assert_eq!(exports["v"], 2);
//! });
//!
//! // Look up the variation addressed to a given recipient.
//! let cfg = dispatch.channel("cfg").unwrap().intended_for("moduleY");
//! assert_eq!(cfg.exports(), Some(json!({"v": 2})));
//! ```

pub mod dispatch;
pub mod dropsites;
pub mod error;
mod naming;
pub mod parcels;
pub mod types;

// Re-exports
pub use dispatch::{Dispatch, DispatchConfig};
pub use dropsites::{DropsiteHandle, SubscriberFn, SubscriptionHandle};
pub use error::{DiagnosticHook, DispatchError, Result};
pub use parcels::{ParcelHandle, Target};
pub use types::*;
