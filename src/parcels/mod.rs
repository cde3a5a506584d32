//! Parcels: named payloads with an append-only history of variations.

mod handle;
mod parcel;

pub use handle::{ParcelHandle, Target};
pub(crate) use parcel::ParcelState;
