//! Observable key/value store with deferred change notification.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::{StoreError, SubscriberPanic};

/// Per-key change subscriber, invoked with the new and previous value.
pub type ValueSubscriber<V> = Arc<dyn Fn(&V, Option<&V>) + Send + Sync>;

/// Any-key change subscriber, invoked with the key, new, and previous value.
pub type GlobalSubscriber<V> = Arc<dyn Fn(&str, &V, Option<&V>) + Send + Sync>;

/// Subscriber receiving panics captured from value and global subscribers.
pub type ErrorSubscriber<V> = Arc<dyn Fn(&SubscriberPanic, &str, &V, Option<&V>) + Send + Sync>;

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

enum Registration<V> {
    Value {
        key: String,
        subscriber: ValueSubscriber<V>,
    },
    Global(GlobalSubscriber<V>),
    Error(ErrorSubscriber<V>),
}

enum Notification<V> {
    Change {
        key: String,
        value: V,
        old: Option<V>,
    },
    Failures {
        errors: Vec<SubscriberPanic>,
        key: String,
        value: V,
        old: Option<V>,
    },
}

/// Observable key/value store.
///
/// Writes are synchronous: the caller observes its own `set` via `get`
/// immediately. Change notification is deferred to a later scheduling turn
/// through the store's internal queue, so subscribers never run inside the
/// `set` call. A panicking subscriber never stops its siblings; captured
/// panics are redelivered to error subscribers one further turn later.
///
/// **WARNING:** Clones share the same values, subscribers, and notification
/// queue. Storing a cloned `Store` inside a subscriber creates a memory leak
/// via an `Arc` reference cycle.
pub struct Store<V> {
    inner: Arc<StoreInner<V>>,
    queue: mpsc::UnboundedSender<Notification<V>>,
}

struct StoreInner<V> {
    values: RwLock<HashMap<String, V>>,
    subscribers: RwLock<HashMap<SubscriberId, Registration<V>>>,
}

impl<V: Clone + Send + Sync + 'static> Store<V> {
    /// Create an empty store.
    ///
    /// Spawns the store's notification worker; the worker exits when the
    /// store (and every clone of it) is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(StoreInner {
            values: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
        });
        let (queue, notifications) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            Arc::downgrade(&inner),
            notifications,
            queue.downgrade(),
        ));
        Self { inner, queue }
    }

    /// Create a store pre-populated with initial values.
    ///
    /// Initial values do not notify anyone; subscribers only observe changes
    /// made through [`Store::set`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if any initial key is empty.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if the internal lock is
    /// poisoned.
    pub fn with_values<K, I>(values: I) -> Result<Self, StoreError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        {
            let mut map = store.inner.values.write().expect("lock poisoned");
            for (key, value) in values {
                let key = key.into();
                validate_key(&key)?;
                map.insert(key, value);
            }
        }
        Ok(store)
    }

    /// Current value for a key, or `None` if the key was never set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the key is empty.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        validate_key(key)?;
        let values = self.inner.values.read().expect("lock poisoned");
        Ok(values.get(key).cloned())
    }

    /// Write a value and schedule change notification.
    ///
    /// The write is visible to `get` as soon as this returns; subscribers
    /// are notified on a later scheduling turn with the new and previous
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the key is empty; no state is
    /// mutated in that case.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<(), StoreError> {
        let key = key.into();
        validate_key(&key)?;
        let old = {
            let mut values = self.inner.values.write().expect("lock poisoned");
            values.insert(key.clone(), value.clone())
        };
        trace!(key = %key, "value written");
        // The queue only closes at runtime shutdown; the write above holds
        // either way.
        let _ = self.queue.send(Notification::Change { key, value, old });
        Ok(())
    }

    /// Subscribe to changes of one key.
    ///
    /// The current value is not replayed; the subscriber only observes
    /// future changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the key is empty.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn on<F>(&self, key: impl Into<String>, subscriber: F) -> Result<SubscriberId, StoreError>
    where
        F: Fn(&V, Option<&V>) + Send + Sync + 'static,
    {
        let key = key.into();
        validate_key(&key)?;
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .write()
            .expect("lock poisoned")
            .insert(
                id,
                Registration::Value {
                    key: key.clone(),
                    subscriber: Arc::new(subscriber),
                },
            );
        debug!(key = %key, "value subscriber registered");
        Ok(id)
    }

    /// Subscribe to changes of every key.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn on_all<F>(&self, subscriber: F) -> SubscriberId
    where
        F: Fn(&str, &V, Option<&V>) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .write()
            .expect("lock poisoned")
            .insert(id, Registration::Global(Arc::new(subscriber)));
        debug!("global subscriber registered");
        id
    }

    /// Subscribe to panics captured from value and global subscribers.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn on_error<F>(&self, subscriber: F) -> SubscriberId
    where
        F: Fn(&SubscriberPanic, &str, &V, Option<&V>) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .write()
            .expect("lock poisoned")
            .insert(id, Registration::Error(Arc::new(subscriber)));
        debug!("error subscriber registered");
        id
    }

    /// Remove a registration.
    ///
    /// Returns `true` if the subscriber was found and removed; removing an
    /// already-removed registration is a safe no-op returning `false`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .inner
            .subscribers
            .write()
            .expect("lock poisoned")
            .remove(&id)
            .is_some();
        if removed {
            debug!("subscriber removed");
        }
        removed
    }

    /// Number of keys currently holding a value.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.read().expect("lock poisoned").len()
    }

    /// Whether the store holds no values.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.read().expect("lock poisoned").is_empty()
    }

    /// Number of registered subscribers of all kinds.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().expect("lock poisoned").len()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for Store<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        // A clone shares the same values, subscribers, and notification queue
        Self {
            inner: Arc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

impl<V: Clone + Send + Sync> StoreInner<V> {
    /// Invoke every per-key and global subscriber for one change, panics
    /// contained. Returns the captured panics.
    fn notify(&self, key: &str, value: &V, old: Option<&V>) -> Vec<SubscriberPanic> {
        let (value_subs, global_subs) = {
            let subscribers = self.subscribers.read().expect("lock poisoned");
            let mut value_subs = Vec::new();
            let mut global_subs = Vec::new();
            for registration in subscribers.values() {
                match registration {
                    Registration::Value {
                        key: subscribed,
                        subscriber,
                    } if subscribed.as_str() == key => {
                        value_subs.push(Arc::clone(subscriber));
                    },
                    Registration::Global(subscriber) => {
                        global_subs.push(Arc::clone(subscriber));
                    },
                    _ => {},
                }
            }
            (value_subs, global_subs)
        };

        let mut errors = Vec::new();
        for subscriber in value_subs {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*subscriber)(value, old))) {
                let captured = SubscriberPanic {
                    key: key.to_string(),
                    message: panic_message(panic.as_ref()),
                };
                warn!(key, error = %captured, "value subscriber panicked");
                errors.push(captured);
            }
        }
        for subscriber in global_subs {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*subscriber)(key, value, old))) {
                let captured = SubscriberPanic {
                    key: key.to_string(),
                    message: panic_message(panic.as_ref()),
                };
                warn!(key, error = %captured, "global subscriber panicked");
                errors.push(captured);
            }
        }
        errors
    }

    /// Deliver each captured panic to every error subscriber. An error
    /// subscriber that itself panics is terminal: logged, never redelivered.
    fn notify_failures(&self, errors: &[SubscriberPanic], key: &str, value: &V, old: Option<&V>) {
        let error_subs: Vec<ErrorSubscriber<V>> = {
            let subscribers = self.subscribers.read().expect("lock poisoned");
            subscribers
                .values()
                .filter_map(|registration| match registration {
                    Registration::Error(subscriber) => Some(Arc::clone(subscriber)),
                    _ => None,
                })
                .collect()
        };

        for captured in errors {
            for subscriber in &error_subs {
                if catch_unwind(AssertUnwindSafe(|| (**subscriber)(captured, key, value, old)))
                    .is_err()
                {
                    error!(key, "an error subscriber failed while handling a subscriber error");
                }
            }
        }
    }
}

/// Drains the notification queue, one change per loop pass. Captured panics
/// are re-enqueued so error delivery runs in a later turn than the change
/// that produced it.
async fn run_worker<V: Clone + Send + Sync + 'static>(
    inner: Weak<StoreInner<V>>,
    mut notifications: mpsc::UnboundedReceiver<Notification<V>>,
    queue: mpsc::WeakUnboundedSender<Notification<V>>,
) {
    while let Some(notification) = notifications.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match notification {
            Notification::Change { key, value, old } => {
                let errors = inner.notify(&key, &value, old.as_ref());
                if errors.is_empty() {
                    continue;
                }
                if let Some(queue) = queue.upgrade() {
                    let _ = queue.send(Notification::Failures {
                        errors,
                        key,
                        value,
                        old,
                    });
                }
            },
            Notification::Failures {
                errors,
                key,
                value,
                old,
            } => {
                inner.notify_failures(&errors, &key, &value, old.as_ref());
            },
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
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
