//! Delivery of one payload to one listener, with contained failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tracing::{error, trace};

use crate::emitter::{Emitter, EmitterInner};
use crate::event::{DispatchFailure, Event, EventKey, ListenerPanic};
use crate::listener::Listener;

/// Invokes one listener with one payload and reports the outcome.
///
/// Failures (an `Err` return or a panic) are logged and re-emitted on the
/// owning emitter's error channel, except when the failing channel is the
/// error channel itself: that case is terminal and only logged, which is
/// what bounds the failure-of-failure recursion.
pub(crate) struct Dispatcher<E: Event> {
    emitter: Weak<EmitterInner<E>>,
}

impl<E: Event> Dispatcher<E> {
    pub(crate) fn new(emitter: Weak<EmitterInner<E>>) -> Self {
        Self { emitter }
    }

    /// Deliver `data` to `listener`. The returned future always completes;
    /// it never propagates the listener's failure.
    pub(crate) async fn dispatch(&self, key: E::Key, data: E, listener: Arc<dyn Listener<E>>) {
        let outcome = AssertUnwindSafe(listener.handle(data.clone()))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {
                trace!(event = ?key, listener = listener.name(), "dispatched");
            },
            Ok(Err(err)) => {
                self.report(key, data, listener.name(), Arc::from(err));
            },
            Err(panic) => {
                let reason: Arc<dyn std::error::Error + Send + Sync> = Arc::new(ListenerPanic {
                    message: panic_message(panic.as_ref()),
                });
                self.report(key, data, listener.name(), reason);
            },
        }
    }

    fn report(
        &self,
        key: E::Key,
        data: E,
        listener: &str,
        reason: Arc<dyn std::error::Error + Send + Sync>,
    ) {
        error!(event = ?key, listener, error = %reason, "listener failed");
        if key == E::Key::ERROR {
            // Terminal: a failure on the error channel is never re-wrapped.
            return;
        }

        let payload = E::from_failure(Arc::new(DispatchFailure {
            event: key,
            data,
            message: format!("a listener failed while handling '{key:?}'"),
            reason,
        }));
        if payload.key() != E::Key::ERROR {
            // Invariant: from_failure must map to the error channel.
            error!(
                event = ?payload.key(),
                "failure payload is not on the error channel, dropping"
            );
            return;
        }

        let Some(inner) = self.emitter.upgrade() else {
            return;
        };
        let emitter = Emitter::from_inner(inner);
        // The originating emission does not wait for error-channel listeners.
        tokio::spawn(async move {
            emitter.emit(payload).await;
        });
    }
}

impl<E: Event> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            emitter: Weak::clone(&self.emitter),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;
    use crate::test_support::{TestEvent, TestKey};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type CollectedFailures = Arc<Mutex<Vec<Arc<DispatchFailure<TestEvent>>>>>;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    fn failure_collector(failures: CollectedFailures) -> Arc<FnListener<TestEvent>> {
        Arc::new(FnListener::named("collector", move |event: TestEvent| {
            let failures = Arc::clone(&failures);
            async move {
                if let TestEvent::Failure(failure) = event {
                    failures.lock().unwrap().push(failure);
                }
                Ok(())
            }
        }))
    }

    #[tokio::test]
    async fn failing_listener_reports_on_the_error_channel() {
        let emitter = Emitter::<TestEvent>::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        emitter.on(TestKey::Error, failure_collector(Arc::clone(&failures)));
        emitter.on(
            TestKey::Ping,
            Arc::new(FnListener::named("failing", |_event: TestEvent| async move {
                Err("boom".into())
            })),
        );

        emitter.emit(TestEvent::Ping("hello".to_string())).await;
        settle().await;

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event, TestKey::Ping);
        assert!(failures[0].reason.to_string().contains("boom"));
        assert!(matches!(&failures[0].data, TestEvent::Ping(text) if text == "hello"));
    }

    #[tokio::test]
    async fn failing_error_listener_is_terminal() {
        let emitter = Emitter::<TestEvent>::new();
        let error_invocations = Arc::new(AtomicUsize::new(0));
        {
            let error_invocations = Arc::clone(&error_invocations);
            emitter.on(
                TestKey::Error,
                Arc::new(FnListener::named("failing-error", move |_event: TestEvent| {
                    let error_invocations = Arc::clone(&error_invocations);
                    async move {
                        error_invocations.fetch_add(1, Ordering::SeqCst);
                        Err("error listener failed".into())
                    }
                })),
            );
        }
        emitter.on(
            TestKey::Ping,
            Arc::new(FnListener::named("failing", |_event: TestEvent| async move {
                Err("boom".into())
            })),
        );

        emitter.emit(TestEvent::Ping("hello".to_string())).await;
        settle().await;

        // One invocation for the original failure and none for its own.
        assert_eq!(error_invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_affect_siblings_or_the_caller() {
        let emitter = Emitter::<TestEvent>::new();
        let sibling = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));
        emitter.on(TestKey::Error, failure_collector(Arc::clone(&failures)));
        emitter.on(
            TestKey::Ping,
            Arc::new(FnListener::named("panicking", |_event: TestEvent| async move {
                panic!("kaboom");
            })),
        );
        {
            let sibling = Arc::clone(&sibling);
            emitter.on(
                TestKey::Ping,
                Arc::new(FnListener::new(move |_event: TestEvent| {
                    let sibling = Arc::clone(&sibling);
                    async move {
                        sibling.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            );
        }

        emitter.emit(TestEvent::Ping("hello".to_string())).await;
        settle().await;

        assert_eq!(sibling.load(Ordering::SeqCst), 1);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].reason.to_string(),
            "listener panicked: kaboom"
        );
    }

    mod miskeyed {
        use super::*;
        use crate::event::EventKey;

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        enum BadKey {
            Ping,
            Error,
        }

        impl EventKey for BadKey {
            const ERROR: Self = BadKey::Error;
        }

        /// Violates the `from_failure` contract by mapping failures back to
        /// an ordinary channel.
        #[derive(Debug, Clone)]
        enum BadEvent {
            Ping,
            Failure,
        }

        impl Event for BadEvent {
            type Key = BadKey;

            fn key(&self) -> BadKey {
                match self {
                    BadEvent::Ping | BadEvent::Failure => BadKey::Ping,
                }
            }

            fn from_failure(_failure: Arc<DispatchFailure<Self>>) -> Self {
                BadEvent::Failure
            }
        }

        #[tokio::test]
        async fn miskeyed_failure_payload_is_dropped() {
            let emitter = Emitter::<BadEvent>::new();
            let invocations = Arc::new(AtomicUsize::new(0));
            {
                let invocations = Arc::clone(&invocations);
                emitter.on(
                    BadKey::Ping,
                    Arc::new(FnListener::named("failing", move |_event: BadEvent| {
                        let invocations = Arc::clone(&invocations);
                        async move {
                            invocations.fetch_add(1, Ordering::SeqCst);
                            Err("boom".into())
                        }
                    })),
                );
            }

            emitter.emit(BadEvent::Ping).await;
            settle().await;

            // The mis-keyed failure payload must not re-dispatch to Ping.
            assert_eq!(invocations.load(Ordering::SeqCst), 1);
        }
    }
}
