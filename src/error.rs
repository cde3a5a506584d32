//! Error and diagnostic types for the dispatch mediator.
//!
//! The fluent API never surfaces these as `Err`: malformed input and misuse
//! are absorbed as no-ops. Every absorbed case is still described by a
//! [`DispatchError`], logged, and handed to the configured
//! [`DiagnosticHook`] so silent failures stay observable.

use std::sync::Arc;
use thiserror::Error;

/// Everything the mediator can absorb instead of failing.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{operation}: a channel name is required")]
    MissingName { operation: &'static str },

    #[error("{operation} on channel {channel:?}: no variation is positioned")]
    Unpositioned {
        channel: String,
        operation: &'static str,
    },

    #[error("channel {channel:?} has no variation intended for {recipient:?}")]
    NoRecipient { channel: String, recipient: String },

    #[error("{operation}: handle outlived its dispatch registry")]
    Detached { operation: &'static str },

    #[error("subscriber {subscriber} on dropsite {dropsite:?} could not accept a delivery")]
    SubscriberDropped { dropsite: String, subscriber: String },
}

impl DispatchError {
    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::MissingName { .. } => "missing_name",
            DispatchError::Unpositioned { .. } => "unpositioned",
            DispatchError::NoRecipient { .. } => "no_recipient",
            DispatchError::Detached { .. } => "detached",
            DispatchError::SubscriberDropped { .. } => "subscriber_dropped",
        }
    }
}

/// Callback invoked for every absorbed [`DispatchError`].
pub type DiagnosticHook = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Result type for the fallible `try_*` operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
