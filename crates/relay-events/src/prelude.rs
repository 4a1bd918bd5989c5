//! Prelude module - commonly used types for convenient import.
//!
//! Use `use relay_events::prelude::*;` to import all essential types.

// Emitter
pub use crate::{Emitter, EmitterBuilder};

// Event typing
pub use crate::{DispatchFailure, Event, EventKey, ListenerPanic};

// Listeners
pub use crate::{FnListener, Listener, ListenerError, ListenerId};
