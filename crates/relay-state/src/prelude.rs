//! Prelude module - commonly used types for convenient import.
//!
//! Use `use relay_state::prelude::*;` to import all essential types.

// Store
pub use crate::{Store, SubscriberId};

// Subscriber types
pub use crate::{ErrorSubscriber, GlobalSubscriber, ValueSubscriber};

// Errors
pub use crate::{StoreError, SubscriberPanic};
