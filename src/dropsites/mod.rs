//! Dropsites: named delivery endpoints.
//!
//! A dropsite holds any number of subscribers and remembers every parcel
//! variation routed to it, so a subscriber that attaches late still receives
//! what was sent before it arrived:
//!
//! ```ignore
//! let dispatch = Dispatch::default();
//! dispatch
//!     .publish(Manifest::new("feature-flags"), Some(json!({"flags": ["a"]})))
//!     .unwrap()
//!     .to("consumer-1");
//!
//! // Replayed immediately on attach.
//! dispatch.to("consumer-1").at(|exports, manifest| {
//!     println!("{} -> {}", manifest.name, exports);
//! });
//! ```

mod dropsite;
mod handle;
mod subscription;

pub(crate) use dropsite::{DropsiteState, SubscriberTarget};
pub use dropsite::SubscriberFn;
pub use handle::DropsiteHandle;
pub use subscription::SubscriptionHandle;
