//! Logging configuration and setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use crate::error::TelemetryError;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable output.
    Pretty,
    /// Single-line, human-readable output.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base filter, e.g. `"info"` or `"relay_events=debug"`.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Additional per-target directives layered on top of the base filter.
    pub directives: Vec<String>,
}

impl LogConfig {
    /// Create a config with the given base filter and compact output.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            format: LogFormat::Compact,
            directives: Vec::new(),
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a per-target directive, e.g. `"relay_state=trace"`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }
}

/// Install a process-wide tracing subscriber.
///
/// Affects subsequent log calls only; with no subscriber installed, all
/// library logging is discarded.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] if the filter or a directive does
/// not parse, and [`TelemetryError::InitError`] if a global subscriber is
/// already installed.
pub fn setup_logging(config: &LogConfig) -> Result<(), TelemetryError> {
    let mut filter = EnvFilter::try_new(&config.filter)
        .map_err(|err| TelemetryError::ConfigError(err.to_string()))?;
    for directive in &config.directives {
        let parsed = directive
            .parse::<Directive>()
            .map_err(|err| TelemetryError::ConfigError(err.to_string()))?;
        filter = filter.add_directive(parsed);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| TelemetryError::InitError(err.to_string()))
}

/// Install logging from the `RUST_LOG` environment variable, defaulting to
/// `info`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] if `RUST_LOG` does not parse, and
/// [`TelemetryError::InitError`] if a global subscriber is already installed.
pub fn setup_default_logging() -> Result<(), TelemetryError> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    setup_logging(&LogConfig::new(filter))
}
