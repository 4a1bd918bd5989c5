//! Relay Telemetry - logging setup for the relay event and state crates.
//!
//! The relay crates log through the `tracing` facade; with no subscriber
//! installed every call is discarded. This crate provides the installable
//! sink: a configurable `tracing-subscriber` setup with env-filter support
//! and pretty, compact, or JSON output.
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), relay_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("relay_events=debug");
//!
//! setup_logging(&config)?;
//!
//! tracing::info!("logging installed");
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
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, setup_default_logging, setup_logging};
