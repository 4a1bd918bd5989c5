//! State container error types.

use thiserror::Error;

/// Errors returned synchronously to the direct caller of a store operation.
///
/// These are the only failures a caller ever sees: subscriber failures are
/// contained at notification time and rerouted to error subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key was empty. Keys must be non-empty strings.
    #[error("invalid key: must be a non-empty string")]
    InvalidKey,
}

/// A panic captured while a subscriber was handling a change notification.
///
/// Delivered to error subscribers one scheduling turn after the
/// notification that produced it.
#[derive(Debug, Clone, Error)]
#[error("subscriber panicked while handling '{key}': {message}")]
pub struct SubscriberPanic {
    /// Key whose change notification panicked.
    pub key: String,
    /// Captured panic message.
    pub message: String,
}
