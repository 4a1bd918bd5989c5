//! Relay State - observable key/value state with deferred, panic-isolated
//! notification.
//!
//! This crate provides [`Store`], a flat string-keyed container where:
//! - writes are synchronous (a caller observes its own `set` immediately)
//! - change notification is deferred to a later scheduling turn, so
//!   subscribers never run inside the `set` call
//! - a panicking subscriber never stops its siblings; captured panics are
//!   redelivered to error subscribers one further turn later
//!
//! # Example
//!
//! ```rust
//! use relay_state::Store;
//!
//! # async fn example() -> Result<(), relay_state::StoreError> {
//! let store = Store::new();
//!
//! store.on("count", |value: &i64, old: Option<&i64>| {
//!     println!("count changed from {old:?} to {value}");
//! })?;
//!
//! store.set("count", 5)?;
//! assert_eq!(store.get("count")?, Some(5));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod store;

pub use error::{StoreError, SubscriberPanic};
pub use store::{ErrorSubscriber, GlobalSubscriber, Store, SubscriberId, ValueSubscriber};
