//! # Turnstile Runtime
//!
//! Runtime implementation for the Turnstile reducer architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Tracks tasks spawned for `Effect::Cancellable` so
//!   `Effect::Cancel` can abort timers and streams that are still in flight
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::AbortHandle;
use turnstile_core::effect::{Effect, EffectId};
use turnstile_core::reducer::Reducer;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        ///
        /// The action broadcast channel was closed, typically because the
        /// store is shutting down.
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(5));
///
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of actions buffered for slow observers
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects of one
/// action to complete. Only the immediate effects are tracked: actions fed
/// back by those effects get handles of their own. Long-lived
/// `Effect::Stream` effects are never tracked, since they may not end.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle together with its internal tracking context
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            // Every tracking context is gone, so nothing is left to run
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }

    /// Start tracking one effect, returning the guard that ends it
    fn start(&self) -> DecrementGuard {
        self.increment();
        DecrementGuard(self.clone())
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Guards are created before the task is spawned and moved into it, so the
/// counter is decremented even when the task is aborted before its first poll.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl AtomicCounterGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Internal: abort handles of tasks spawned under a cancellation id
#[derive(Default)]
struct CancellationRegistry {
    tasks: Mutex<HashMap<EffectId, Vec<AbortHandle>>>,
}

impl CancellationRegistry {
    fn register(&self, id: EffectId, handle: AbortHandle) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = tasks.entry(id).or_default();
        entry.retain(|task| !task.is_finished());
        entry.push(handle);
    }

    fn cancel(&self, id: EffectId) -> usize {
        let handles = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .unwrap_or_default();
        abort_all(handles)
    }

    fn cancel_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .flat_map(|(_, handles)| handles)
            .collect();
        abort_all(handles)
    }

    fn in_flight(&self, id: EffectId) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map_or(0, |handles| handles.iter().filter(|task| !task.is_finished()).count())
    }
}

fn abort_all(handles: Vec<AbortHandle>) -> usize {
    let mut aborted = 0;
    for handle in handles {
        if !handle.is_finished() {
            handle.abort();
            aborted += 1;
        }
    }
    aborted
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, CancellationRegistry, Duration, Effect,
        EffectHandle, EffectId, EffectTracking, Ordering, Reducer, RwLock, StoreConfig,
        StoreError,
    };
    use futures::StreamExt;
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: Arc<CancellationRegistry>,
        /// Action broadcast channel for observing actions produced by effects.
        ///
        /// All actions produced by effects (futures, delays, streams) are
        /// broadcast to observers such as UI bindings.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Uses [`StoreConfig::default()`].
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: Arc::new(CancellationRegistry::default()),
                action_broadcast,
            }
        }

        /// The environment this store was built with
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Default shutdown timeout from the store configuration
        #[must_use]
        pub const fn default_shutdown_timeout(&self) -> Duration {
            self.config.default_shutdown_timeout
        }

        /// Number of tasks currently running under a cancellation id
        #[must_use]
        pub fn in_flight(&self, id: EffectId) -> usize {
            self.cancellations.in_flight(id)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// This method:
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Aborts every cancellable effect (timers, streams)
        /// 3. Waits for the remaining effects to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let aborted = self.cancellations.cancel_all();
            tracing::debug!(aborted, "Aborted cancellable effects");

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects, in order, before releasing the lock
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// The reducer executes synchronously while holding the write lock, so
        /// concurrent `send()` calls serialize at the reducer level. Starting
        /// effects only spawns tasks and never awaits, so it happens under the
        /// same lock: cancellations and registrations from concurrent sends
        /// apply in reducer order. An `Effect::Cancel` followed by a new
        /// `Effect::Cancellable` with the same id is therefore a reliable
        /// "replace in flight" pattern.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let mut state = self.state.write().await;

            let effects = {
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, &tracking, None);
            }
            drop(state);

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, then returns the
        /// first action produced by effects that matches the predicate.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Actions sent directly via `send` are not broadcast.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let scanning = store.state(|s| s.is_scanning()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Spawn an effect task, registering it under `cancel` when present
        fn spawn_effect<F>(&self, cancel: Option<EffectId>, task: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            let handle = tokio::spawn(task);
            if let Some(id) = cancel {
                self.cancellations.register(id, handle.abort_handle());
            }
        }

        /// Feed an action produced by an effect back into the store
        async fn feedback(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            let _ = self.action_broadcast.send(action.clone());
            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Dropped feedback action");
            }
        }

        /// Execute an effect with tracking
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Stream`: Sends every item until the stream ends (not tracked by handles)
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        /// - `Cancellable`: Executes the inner effect with its tasks registered under the id
        /// - `Cancel`: Aborts every task registered under the id
        ///
        /// Effect tasks that panic are isolated in their spawned task; the
        /// guards moved into the task keep the counters consistent.
        #[allow(clippy::too_many_lines)]
        fn execute_effect_internal(
            &self,
            effect: Effect<A>,
            tracking: &EffectTracking,
            cancel: Option<EffectId>,
        ) where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    let guard = tracking.start();
                    let pending_guard = AtomicCounterGuard::acquire(&self.pending_effects);
                    let store = self.clone();

                    self.spawn_effect(cancel, async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            store.feedback(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);

                    let guard = tracking.start();
                    let pending_guard = AtomicCounterGuard::acquire(&self.pending_effects);
                    let store = self.clone();

                    self.spawn_effect(cancel, async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay elapsed, sending action");
                        store.feedback(*action).await;
                    });
                },
                Effect::Stream(mut stream) => {
                    tracing::trace!("Executing Effect::Stream");
                    metrics::counter!("store.effects.executed", "type" => "stream").increment(1);

                    let pending_guard = AtomicCounterGuard::acquire(&self.pending_effects);
                    let store = self.clone();

                    self.spawn_effect(cancel, async move {
                        let _pending_guard = pending_guard;

                        while let Some(action) = stream.next().await {
                            metrics::counter!("store.stream.items").increment(1);
                            store.feedback(action).await;
                        }
                        tracing::trace!("Effect::Stream completed");
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);

                    for effect in effects {
                        self.execute_effect_internal(effect, tracking, cancel);
                    }
                },
                Effect::Sequential(effects) => {
                    let effect_count = effects.len();
                    tracing::trace!("Executing Effect::Sequential with {} effects", effect_count);
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);

                    let guard = tracking.start();
                    let pending_guard = AtomicCounterGuard::acquire(&self.pending_effects);
                    let store = self.clone();

                    self.spawn_effect(cancel, async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        for (idx, effect) in effects.into_iter().enumerate() {
                            tracing::trace!(
                                "Executing sequential effect {} of {}",
                                idx + 1,
                                effect_count
                            );

                            let (mut sub_handle, sub_tracking) = EffectHandle::new();
                            store.execute_effect_internal(effect, &sub_tracking, cancel);
                            drop(sub_tracking);
                            sub_handle.wait().await;
                        }
                    });
                },
                Effect::Cancellable { id, effect } => {
                    tracing::trace!(%id, "Executing Effect::Cancellable");
                    self.execute_effect_internal(*effect, tracking, Some(id));
                },
                Effect::Cancel(id) => {
                    let aborted = self.cancellations.cancel(id);
                    tracing::trace!(%id, aborted, "Executing Effect::Cancel");
                    metrics::counter!("store.effects.cancelled").increment(aborted as u64);
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: Arc::clone(&self.cancellations),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use turnstile_core::{SmallVec, smallvec};

    const TIMER: EffectId = EffectId::new("test.timer");
    const TICKER: EffectId = EffectId::new("test.ticker");
    const LISTENER: EffectId = EffectId::new("test.listener");

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
        listening: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        Produce,
        Schedule,
        Reschedule,
        CancelSchedule,
        StartTicker,
        StopTicker,
        Listen,
        Unlisten,
        Sequence,
        Panic,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            let delay = || Effect::Delay {
                duration: Duration::from_millis(100),
                action: Box::new(TestAction::Increment),
            };

            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::Produce => {
                    smallvec![Effect::Future(Box::pin(async { Some(TestAction::Increment) }))]
                },
                TestAction::Schedule => smallvec![delay().cancellable(TIMER)],
                TestAction::Reschedule => {
                    smallvec![Effect::Cancel(TIMER), delay().cancellable(TIMER)]
                },
                TestAction::CancelSchedule => smallvec![Effect::Cancel(TIMER)],
                TestAction::StartTicker => {
                    let ticks = futures::stream::repeat(TestAction::Increment).then(|action| async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        action
                    });
                    smallvec![Effect::Stream(Box::pin(ticks)).cancellable(TICKER)]
                },
                TestAction::StopTicker => smallvec![Effect::Cancel(TICKER)],
                TestAction::Listen => {
                    state.listening = true;
                    let idle = futures::stream::pending::<TestAction>();
                    smallvec![
                        Effect::Cancel(LISTENER),
                        Effect::Stream(Box::pin(idle)).cancellable(LISTENER)
                    ]
                },
                TestAction::Unlisten => {
                    state.listening = false;
                    smallvec![Effect::Cancel(LISTENER)]
                },
                TestAction::Sequence => smallvec![Effect::chain(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Decrement) })),
                ])],
                TestAction::Panic => smallvec![Effect::Future(Box::pin(async {
                    panic!("Intentional panic in effect for testing");
                }))],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(
            TestState {
                value: 0,
                listening: false,
            },
            TestReducer,
            TestEnv,
        )
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_send_action() {
        let store = store();
        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_future_feeds_action_back() {
        let store = store();
        let mut handle = store.send(TestAction::Produce).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_future_result_is_broadcast() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::Produce,
                |action| *action == TestAction::Increment,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result, TestAction::Increment);
    }

    #[tokio::test]
    async fn test_sequential_effects_run_in_order() {
        let store = store();
        let mut handle = store.send(TestAction::Sequence).await.unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_fires_after_duration() {
        let store = store();
        store.send(TestAction::Schedule).await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_millis(99)).await;
        settle().await;
        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(store.state(|s| s.value).await, 1);
        assert_eq!(store.in_flight(TIMER), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_pending_delay() {
        let store = store();
        let mut handle = store.send(TestAction::Schedule).await.unwrap();
        settle().await;
        assert_eq!(store.in_flight(TIMER), 1);

        store.send(TestAction::CancelSchedule).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;

        assert_eq!(store.state(|s| s.value).await, 0);
        assert_eq!(store.in_flight(TIMER), 0);
        // Aborted effects still complete their handle
        handle.wait().await;
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_in_flight_timer() {
        let store = store();
        store.send(TestAction::Schedule).await.unwrap();
        settle().await;

        tokio::time::advance(Duration::from_millis(60)).await;
        store.send(TestAction::Reschedule).await.unwrap();
        settle().await;

        // The first timer would have fired at 100ms
        tokio::time::advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::advance(Duration::from_millis(40)).await;
        settle().await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_stream() {
        let store = store();
        store.send(TestAction::StartTicker).await.unwrap();
        settle().await;

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(10)).await;
            settle().await;
        }
        assert_eq!(store.state(|s| s.value).await, 3);

        store.send(TestAction::StopTicker).await.unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(store.state(|s| s.value).await, 3);
        assert_eq!(store.in_flight(TICKER), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_register_in_reducer_order() {
        for _ in 0..50 {
            let store = store();
            let senders: Vec<_> = (0..16)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let action = if i % 2 == 0 {
                            TestAction::Listen
                        } else {
                            TestAction::Unlisten
                        };
                        store.send(action).await.unwrap();
                    })
                })
                .collect();
            for sender in senders {
                sender.await.unwrap();
            }

            let listening = store.state(|s| s.listening).await;
            assert_eq!(store.in_flight(LISTENER), usize::from(listening));

            store.shutdown(Duration::from_secs(1)).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_cancellable_effects() {
        let store = store();
        store.send(TestAction::StartTicker).await.unwrap();
        store.send(TestAction::Schedule).await.unwrap();
        settle().await;

        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(matches!(
            store.send(TestAction::Increment).await,
            Err(StoreError::ShutdownInProgress)
        ));
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() {
        let store = store();
        let mut handle = store.send(TestAction::Panic).await.unwrap();
        handle.wait().await;

        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_store_clone_shares_state() {
        let store1 = store();
        let store2 = store1.clone();

        store1.send(TestAction::Increment).await.unwrap();
        assert_eq!(store2.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_completed_handle() {
        let mut handle = EffectHandle::completed();
        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_ok());
    }
}
