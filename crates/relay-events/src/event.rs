//! Event typing: key and payload contracts, plus the failure payload
//! carried on the reserved error channel.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

/// Identifier for one event channel.
///
/// Implementors are small key enums. One variant is designated as the
/// reserved failure channel via [`EventKey::ERROR`]: dispatch failures on
/// every other channel are re-emitted there as [`DispatchFailure`] payloads.
pub trait EventKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// The reserved failure channel.
    ///
    /// A failure while handling this channel is terminal: it is logged and
    /// dropped, never re-emitted.
    const ERROR: Self;
}

/// Payload type carried by an [`Emitter`](crate::Emitter).
///
/// Implementors are payload enums with one variant per [`EventKey`],
/// including a variant wrapping [`DispatchFailure`] for the error channel.
///
/// # Contract
///
/// The payload returned by [`Event::from_failure`] must report
/// `key() == Self::Key::ERROR`. The dispatcher refuses to emit failure
/// payloads that violate this and drops them with an error log.
pub trait Event: fmt::Debug + Clone + Send + Sync + 'static {
    /// The key enum identifying this payload's channel.
    type Key: EventKey;

    /// The channel this payload belongs to.
    fn key(&self) -> Self::Key;

    /// Build the error-channel payload wrapping a dispatch failure.
    fn from_failure(failure: Arc<DispatchFailure<Self>>) -> Self;
}

/// A listener failure, carried as the payload of the error channel.
///
/// Holds the channel and payload whose delivery failed, together with the
/// failure itself.
#[derive(Debug, Clone)]
pub struct DispatchFailure<E: Event> {
    /// The channel whose dispatch failed.
    pub event: E::Key,
    /// The payload that was being delivered.
    pub data: E,
    /// Human-readable description of the failure.
    pub message: String,
    /// The listener's error, or a [`ListenerPanic`] if it panicked.
    pub reason: Arc<dyn std::error::Error + Send + Sync>,
}

impl<E: Event> fmt::Display for DispatchFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.reason)
    }
}

impl<E: Event> std::error::Error for DispatchFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let reason: &(dyn std::error::Error + 'static) = self.reason.as_ref();
        Some(reason)
    }
}

/// A panic captured while a listener was handling a payload.
#[derive(Debug, Clone, Error)]
#[error("listener panicked: {message}")]
pub struct ListenerPanic {
    /// Captured panic message.
    pub message: String,
}
