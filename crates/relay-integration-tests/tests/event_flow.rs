//! End-to-end scenarios for the event emitter and dispatcher.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_events::{Emitter, FnListener};
use relay_state::Store;

use common::{SessionEvent, SessionKey};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[tokio::test]
async fn stateful_channel_replays_through_its_lifecycle() {
    common::init_logging();
    let emitter = Emitter::builder()
        .initial(SessionEvent::Progress { percent: 0 })
        .build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        emitter.on(
            SessionKey::Progress,
            Arc::new(FnListener::new(move |event: SessionEvent| {
                let seen = Arc::clone(&seen);
                async move {
                    if let SessionEvent::Progress { percent } = event {
                        seen.lock().unwrap().push(percent);
                    }
                    Ok(())
                }
            })),
        );
    }

    emitter.emit(SessionEvent::Progress { percent: 50 }).await;
    emitter.emit(SessionEvent::Progress { percent: 100 }).await;
    settle().await;
    assert_eq!(*seen.lock().unwrap(), vec![0, 50, 100]);

    // A late subscriber sees only the last recorded value.
    let value = emitter.next(SessionKey::Progress).await;
    assert!(matches!(value, SessionEvent::Progress { percent: 100 }));
}

#[tokio::test]
async fn listener_failure_surfaces_on_the_error_channel() {
    let emitter = Emitter::new();
    emitter.on(
        SessionKey::Started,
        Arc::new(FnListener::named("failing", |_event: SessionEvent| async move {
            Err("session handler rejected".into())
        })),
    );

    let waiter = {
        let emitter = emitter.clone();
        tokio::spawn(async move { emitter.next(SessionKey::Error).await })
    };
    settle().await;

    emitter
        .emit(SessionEvent::Started {
            user: "ada".to_string(),
        })
        .await;

    let event = waiter.await.unwrap();
    let SessionEvent::Failure(failure) = event else {
        panic!("expected a failure payload");
    };
    assert_eq!(failure.event, SessionKey::Started);
    assert!(failure.reason.to_string().contains("session handler rejected"));
    assert!(matches!(&failure.data, SessionEvent::Started { user } if user == "ada"));
}

#[tokio::test]
async fn emitter_can_drive_an_observable_store() {
    let emitter = Emitter::new();
    let store = Store::new();

    {
        let store = store.clone();
        emitter.on(
            SessionKey::Progress,
            Arc::new(FnListener::named("persist", move |event: SessionEvent| {
                let store = store.clone();
                async move {
                    if let SessionEvent::Progress { percent } = event {
                        store.set("progress", i64::from(percent))?;
                    }
                    Ok(())
                }
            })),
        );
    }

    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let observed = Arc::clone(&observed);
        store
            .on("progress", move |value: &i64, old| {
                observed.lock().unwrap().push((*value, old.copied()));
            })
            .unwrap();
    }

    emitter.emit(SessionEvent::Progress { percent: 30 }).await;
    emitter.emit(SessionEvent::Progress { percent: 60 }).await;
    settle().await;

    assert_eq!(store.get("progress").unwrap(), Some(60));
    assert_eq!(*observed.lock().unwrap(), vec![(30, None), (60, Some(30))]);
}

#[tokio::test]
async fn one_bad_listener_never_breaks_the_emission() {
    common::init_logging();
    let emitter = Emitter::new();
    let healthy = Arc::new(AtomicUsize::new(0));
    let error_hits = Arc::new(AtomicUsize::new(0));

    emitter.on(
        SessionKey::Started,
        Arc::new(FnListener::named("panicking", |_event: SessionEvent| async move {
            panic!("handler exploded");
        })),
    );
    {
        let healthy = Arc::clone(&healthy);
        emitter.on(
            SessionKey::Started,
            Arc::new(FnListener::new(move |_event: SessionEvent| {
                let healthy = Arc::clone(&healthy);
                async move {
                    healthy.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
        );
    }
    {
        let error_hits = Arc::clone(&error_hits);
        emitter.on(
            SessionKey::Error,
            Arc::new(FnListener::named(
                "failing-error",
                move |_event: SessionEvent| {
                    let error_hits = Arc::clone(&error_hits);
                    async move {
                        error_hits.fetch_add(1, Ordering::SeqCst);
                        Err("error handler also failed".into())
                    }
                },
            )),
        );
    }

    emitter
        .emit(SessionEvent::Started {
            user: "ada".to_string(),
        })
        .await;
    settle().await;

    assert_eq!(healthy.load(Ordering::SeqCst), 1);
    // Exactly one error delivery: the error handler's own failure is terminal.
    assert_eq!(error_hits.load(Ordering::SeqCst), 1);
}
