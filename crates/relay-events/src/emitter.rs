//! Typed event emitter with per-channel listener registries and stateful
//! replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;
use crate::event::Event;
use crate::listener::{Listener, ListenerError, ListenerId};

/// Typed event emitter.
///
/// Each channel (a variant of [`Event::Key`]) owns its own listener registry
/// and its last recorded payload. Channels configured as stateful via
/// [`EmitterBuilder`] replay that payload to listeners registered after the
/// fact; transient channels deliver only to listeners present at emission
/// time.
///
/// Emission fans out to all listeners concurrently and resolves once every
/// dispatch has settled; a failing listener never affects its siblings or
/// the emitting caller (see [`DispatchFailure`](crate::DispatchFailure)).
///
/// **WARNING:** Clones share the same registries and recorded state. Storing
/// a cloned `Emitter` inside a listener creates a memory leak via an `Arc`
/// reference cycle; store it elsewhere or keep the listener's registration
/// short-lived.
pub struct Emitter<E: Event> {
    inner: Arc<EmitterInner<E>>,
}

pub(crate) struct EmitterInner<E: Event> {
    contexts: RwLock<HashMap<E::Key, EventContext<E>>>,
    dispatcher: Dispatcher<E>,
}

/// Per-channel registry state, created lazily on first access.
struct EventContext<E: Event> {
    listeners: HashMap<ListenerId, Arc<dyn Listener<E>>>,
    stateful: bool,
    state: Option<E>,
}

impl<E: Event> EventContext<E> {
    fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            stateful: false,
            state: None,
        }
    }
}

impl<E: Event> Emitter<E> {
    /// Create an emitter with every channel transient.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring per-channel statefulness.
    #[must_use]
    pub fn builder() -> EmitterBuilder<E> {
        EmitterBuilder {
            configs: HashMap::new(),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EmitterInner<E>>) -> Self {
        Self { inner }
    }

    /// Emit a payload on its channel.
    ///
    /// The payload is recorded as the channel's current state regardless of
    /// statefulness (statefulness only controls replay-on-subscribe), then
    /// delivered concurrently to every listener registered at call time; a
    /// listener added while the emission is in flight does not receive it.
    /// Resolves once all dispatches have settled. With no listeners, it
    /// resolves after yielding one scheduling turn, so emission timing is
    /// consistent either way.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if the internal lock is
    /// poisoned.
    pub async fn emit(&self, data: E) {
        let key = data.key();
        let listeners: Vec<Arc<dyn Listener<E>>> = {
            let mut contexts = self.inner.contexts.write().expect("lock poisoned");
            let context = contexts.entry(key).or_insert_with(EventContext::new);
            context.state = Some(data.clone());
            context.listeners.values().map(Arc::clone).collect()
        };

        if listeners.is_empty() {
            tokio::task::yield_now().await;
            trace!(event = ?key, "emitted to 0 listeners");
            return;
        }

        let count = listeners.len();
        let dispatches: Vec<_> = listeners
            .into_iter()
            .map(|listener| {
                let dispatcher = self.inner.dispatcher.clone();
                let data = data.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(key, data, listener).await;
                })
            })
            .collect();
        // Dispatch never panics; a join error only occurs at runtime shutdown.
        let _ = futures::future::join_all(dispatches).await;
        trace!(event = ?key, listeners = count, "emitted");
    }

    /// Register a listener on a channel.
    ///
    /// If the channel is stateful and has recorded state (from an emission or
    /// a construction-time initial payload), that state is replayed to the
    /// new listener through the normal dispatch path; registration happens
    /// regardless of the replay's outcome, and a replay failure is reported
    /// exactly like a live-emission failure.
    ///
    /// # Panics
    ///
    /// Panics if a replay is triggered outside a Tokio runtime, or if the
    /// internal lock is poisoned.
    pub fn on(&self, key: E::Key, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let id = ListenerId::new();
        let name = listener.name().to_string();
        let replay = {
            let mut contexts = self.inner.contexts.write().expect("lock poisoned");
            let context = contexts.entry(key).or_insert_with(EventContext::new);
            let replay = if context.stateful {
                context.state.clone()
            } else {
                None
            };
            context.listeners.insert(id, Arc::clone(&listener));
            replay
        };
        if let Some(state) = replay {
            let dispatcher = self.inner.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(key, state, listener).await;
            });
        }
        debug!(event = ?key, listener = %name, "listener added");
        id
    }

    /// Register a listener invoked at most once.
    ///
    /// The wrapper removes itself from the registry before delegating, and an
    /// atomic fired-flag guarantees a single invocation even when two
    /// emissions are in flight concurrently. Stateful replay counts as the
    /// one invocation.
    ///
    /// # Panics
    ///
    /// Panics if a replay is triggered outside a Tokio runtime, or if the
    /// internal lock is poisoned.
    pub fn once(&self, key: E::Key, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let wrapper = Arc::new(OnceListener {
            inner: Arc::downgrade(&self.inner),
            key,
            id: OnceLock::new(),
            fired: AtomicBool::new(false),
            listener,
        });
        let id = self.on(key, Arc::clone(&wrapper) as Arc<dyn Listener<E>>);
        // Dispatch reaches the wrapper no earlier than the next scheduling
        // turn, after the id is published.
        let _ = wrapper.id.set(id);
        id
    }

    /// Resolve with the channel's next value, then unregister.
    ///
    /// For a stateful channel with recorded state this resolves with the
    /// replayed state; otherwise it waits for the next emission.
    ///
    /// # Panics
    ///
    /// Panics if a replay is triggered outside a Tokio runtime, or if the
    /// internal lock is poisoned.
    pub async fn next(&self, key: E::Key) -> E {
        let (tx, rx) = oneshot::channel();
        self.once(
            key,
            Arc::new(NextListener {
                tx: Mutex::new(Some(tx)),
            }),
        );
        match rx.await {
            Ok(value) => value,
            // The registered listener holds the sender until a value arrives.
            Err(_) => std::future::pending().await,
        }
    }

    /// Remove a registration.
    ///
    /// Returns `true` if the listener was found and removed; removing an
    /// already-removed registration is a safe no-op returning `false`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn off(&self, key: E::Key, id: ListenerId) -> bool {
        let removed = self.inner.remove_listener(key, id);
        if removed {
            debug!(event = ?key, "listener removed");
        }
        removed
    }

    /// Number of listeners currently registered on a channel.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn listener_count(&self, key: E::Key) -> usize {
        let contexts = self.inner.contexts.read().expect("lock poisoned");
        contexts.get(&key).map_or(0, |context| context.listeners.len())
    }
}

impl<E: Event> EmitterInner<E> {
    fn remove_listener(&self, key: E::Key, id: ListenerId) -> bool {
        let mut contexts = self.contexts.write().expect("lock poisoned");
        let context = contexts.entry(key).or_insert_with(EventContext::new);
        context.listeners.remove(&id).is_some()
    }
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        // A clone shares the same channels, listeners, and recorded state
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Configures per-channel statefulness before building an [`Emitter`].
pub struct EmitterBuilder<E: Event> {
    configs: HashMap<E::Key, EventConfig<E>>,
}

struct EventConfig<E> {
    stateful: bool,
    initial: Option<E>,
}

impl<E> Default for EventConfig<E> {
    fn default() -> Self {
        Self {
            stateful: false,
            initial: None,
        }
    }
}

impl<E: Event> EmitterBuilder<E> {
    /// Mark a channel as stateful: its last payload replays to late
    /// subscribers.
    #[must_use]
    pub fn stateful(mut self, key: E::Key) -> Self {
        self.configs.entry(key).or_default().stateful = true;
        self
    }

    /// Mark the payload's channel as stateful and pre-populate its state,
    /// so the first subscriber sees `data` before any emission.
    #[must_use]
    pub fn initial(mut self, data: E) -> Self {
        let config = self.configs.entry(data.key()).or_default();
        config.stateful = true;
        config.initial = Some(data);
        self
    }

    /// Build the emitter.
    #[must_use]
    pub fn build(self) -> Emitter<E> {
        let mut contexts = HashMap::new();
        for (key, config) in self.configs {
            contexts.insert(
                key,
                EventContext {
                    listeners: HashMap::new(),
                    stateful: config.stateful,
                    state: config.initial,
                },
            );
        }
        let inner = Arc::new_cyclic(|weak: &Weak<EmitterInner<E>>| EmitterInner {
            contexts: RwLock::new(contexts),
            dispatcher: Dispatcher::new(weak.clone()),
        });
        Emitter { inner }
    }
}

/// Wrapper enforcing the at-most-once contract of [`Emitter::once`].
struct OnceListener<E: Event> {
    inner: Weak<EmitterInner<E>>,
    key: E::Key,
    id: OnceLock<ListenerId>,
    fired: AtomicBool,
    listener: Arc<dyn Listener<E>>,
}

#[async_trait]
impl<E: Event> Listener<E> for OnceListener<E> {
    async fn handle(&self, event: E) -> Result<(), ListenerError> {
        if let (Some(id), Some(inner)) = (self.id.get().copied(), self.inner.upgrade()) {
            inner.remove_listener(self.key, id);
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.listener.handle(event).await
    }

    fn name(&self) -> &str {
        "once"
    }
}

/// Single-shot listener backing [`Emitter::next`].
struct NextListener<E> {
    tx: Mutex<Option<oneshot::Sender<E>>>,
}

#[async_trait]
impl<E: Event> Listener<E> for NextListener<E> {
    async fn handle(&self, event: E) -> Result<(), ListenerError> {
        if let Some(tx) = self.tx.lock().expect("lock poisoned").take() {
            let _ = tx.send(event);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "next"
    }
}
