//! Listener trait, closure adapter, and registration handles.

use std::future::Future;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::event::Event;

/// Error type a listener may fail with.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A callback registered on one event channel.
///
/// A listener fails by returning `Err` or by panicking; both are contained
/// by the dispatcher and never reach the emitting caller. Listeners should
/// not assume anything about the completion order of their siblings: all
/// listeners for one emission run concurrently.
#[async_trait]
pub trait Listener<E: Event>: Send + Sync {
    /// Handle one payload.
    async fn handle(&self, event: E) -> Result<(), ListenerError>;

    /// Optional name for diagnostics.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a listener.
///
/// Returned by [`Emitter::on`](crate::Emitter::on) and friends; pass it to
/// [`Emitter::off`](crate::Emitter::off) to remove the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A [`Listener`] built from a closure returning a future.
pub struct FnListener<E> {
    name: String,
    handler: Box<dyn Fn(E) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>,
}

impl<E: Event> FnListener<E> {
    /// Create an anonymous closure listener.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        Self::named("anonymous", handler)
    }

    /// Create a closure listener with a diagnostic name.
    pub fn named<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Box::new(move |event| handler(event).boxed()),
        }
    }
}

#[async_trait]
impl<E: Event> Listener<E> for FnListener<E> {
    async fn handle(&self, event: E) -> Result<(), ListenerError> {
        (self.handler)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
