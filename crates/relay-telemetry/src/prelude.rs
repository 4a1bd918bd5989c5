//! Prelude module - commonly used types for convenient import.
//!
//! Use `use relay_telemetry::prelude::*;` to import all essential types.

// Errors
pub use crate::{TelemetryError, TelemetryResult};

// Logging configuration
pub use crate::{LogConfig, LogFormat};

// Setup functions
pub use crate::{setup_default_logging, setup_logging};
