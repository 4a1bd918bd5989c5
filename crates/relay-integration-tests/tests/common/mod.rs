//! Shared fixtures for integration tests.

use std::sync::Arc;

use relay_events::{DispatchFailure, Event, EventKey};
use relay_telemetry::{LogConfig, LogFormat, setup_logging};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Started,
    Progress,
    Error,
}

impl EventKey for SessionKey {
    const ERROR: Self = SessionKey::Error;
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started { user: String },
    Progress { percent: u8 },
    Failure(Arc<DispatchFailure<SessionEvent>>),
}

impl Event for SessionEvent {
    type Key = SessionKey;

    fn key(&self) -> SessionKey {
        match self {
            SessionEvent::Started { .. } => SessionKey::Started,
            SessionEvent::Progress { .. } => SessionKey::Progress,
            SessionEvent::Failure(_) => SessionKey::Error,
        }
    }

    fn from_failure(failure: Arc<DispatchFailure<Self>>) -> Self {
        SessionEvent::Failure(failure)
    }
}

/// Install trace logging for the test binary; later calls are no-ops.
pub fn init_logging() {
    let _ = setup_logging(&LogConfig::new("trace").with_format(LogFormat::Compact));
}
