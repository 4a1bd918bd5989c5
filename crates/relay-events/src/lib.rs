//! Relay Events - typed event emitter with stateful replay and isolated
//! dispatch.
//!
//! This crate provides:
//! - [`Emitter`]: per-channel listener registries with transient or stateful
//!   (replay-last-value) delivery
//! - [`Listener`] and the [`FnListener`] closure adapter
//! - A reserved error channel carrying [`DispatchFailure`] payloads whenever
//!   a listener fails
//!
//! # Architecture
//!
//! Payloads are a user enum implementing [`Event`]; channels are a key enum
//! implementing [`EventKey`], one variant of which is designated the error
//! channel. An emission records the payload as the channel's current state,
//! then fans out concurrently to the listeners registered at call time.
//!
//! A listener failure never reaches the emitting caller: the dispatcher
//! catches it, logs it, and re-emits it as a [`DispatchFailure`] on the
//! error channel. A failure while handling the error channel itself is
//! logged and dropped, never re-wrapped.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use relay_events::{DispatchFailure, Emitter, Event, EventKey, FnListener};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Key {
//!     Greeting,
//!     Error,
//! }
//!
//! impl EventKey for Key {
//!     const ERROR: Self = Key::Error;
//! }
//!
//! #[derive(Debug, Clone)]
//! enum AppEvent {
//!     Greeting(String),
//!     Failure(Arc<DispatchFailure<AppEvent>>),
//! }
//!
//! impl Event for AppEvent {
//!     type Key = Key;
//!
//!     fn key(&self) -> Key {
//!         match self {
//!             AppEvent::Greeting(_) => Key::Greeting,
//!             AppEvent::Failure(_) => Key::Error,
//!         }
//!     }
//!
//!     fn from_failure(failure: Arc<DispatchFailure<Self>>) -> Self {
//!         AppEvent::Failure(failure)
//!     }
//! }
//!
//! # async fn example() {
//! let emitter = Emitter::new();
//!
//! emitter.on(
//!     Key::Greeting,
//!     Arc::new(FnListener::new(|event: AppEvent| async move {
//!         println!("{event:?}");
//!         Ok(())
//!     })),
//! );
//!
//! emitter.emit(AppEvent::Greeting("hello".to_string())).await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod dispatcher;
mod emitter;
mod event;
mod listener;

#[cfg(test)]
mod test_support;

pub use emitter::{Emitter, EmitterBuilder};
pub use event::{DispatchFailure, Event, EventKey, ListenerPanic};
pub use listener::{FnListener, Listener, ListenerError, ListenerId};
