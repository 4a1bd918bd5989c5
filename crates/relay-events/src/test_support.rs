//! Shared event fixtures for unit tests.

use std::sync::Arc;

use crate::event::{DispatchFailure, Event, EventKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TestKey {
    Ping,
    Count,
    Error,
}

impl EventKey for TestKey {
    const ERROR: Self = TestKey::Error;
}

#[derive(Debug, Clone)]
pub(crate) enum TestEvent {
    Ping(String),
    Count { n: u32 },
    Failure(Arc<DispatchFailure<TestEvent>>),
}

impl Event for TestEvent {
    type Key = TestKey;

    fn key(&self) -> TestKey {
        match self {
            TestEvent::Ping(_) => TestKey::Ping,
            TestEvent::Count { .. } => TestKey::Count,
            TestEvent::Failure(_) => TestKey::Error,
        }
    }

    fn from_failure(failure: Arc<DispatchFailure<Self>>) -> Self {
        TestEvent::Failure(failure)
    }
}
