//! # Kiosk Runtime
//!
//! The [`Store`] is the only place queue state changes. It holds the state
//! behind a `tokio::sync::RwLock`, runs the reducer while holding the write
//! lock, and starts the effects the reducer returns once the lock is
//! released.
//!
//! Actions produced by effects take two paths: they are broadcast to
//! observers (the display board, operator consoles) and then sent back into
//! the reducer. Callers that need the outcome of a command use
//! [`Store::send_and_wait_for`]; callers that need the side effects of one
//! action finished wait on the [`EffectHandle`] returned by [`Store::send`].
//!
//! ```ignore
//! use kiosk_runtime::Store;
//!
//! let store = Store::new(initial_state, reducer, environment);
//! let mut handle = store.send(QueueAction::CallNext { window_id }).await?;
//! handle.wait_with_timeout(Duration::from_secs(2)).await?;
//!
//! let waiting = store.state(|s| s.total_waiting()).await;
//! ```

use kiosk_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

pub mod metrics;

/// Store errors
pub mod error {
    use thiserror::Error;

    /// Failures reported by the [`Store`](crate::Store)
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// `send` was called after `shutdown`
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown deadline passed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action arrived in time
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action broadcast was closed while waiting
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Waits for the effects started by one `send`.
///
/// Effects run in their own tasks, so `send` returns before announcements or
/// receipts reach the notifier. The handle counts the effects still running
/// and wakes waiters when the count drops to zero.
#[derive(Clone)]
pub struct EffectHandle {
    running: Arc<AtomicUsize>,
    done: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, Tracker) {
        let running = Arc::new(AtomicUsize::new(0));
        let (done_tx, done) = watch::channel(());

        let handle = Self {
            running: Arc::clone(&running),
            done,
        };
        (handle, Tracker { running, done_tx })
    }

    /// A handle with nothing to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracker) = Self::new();
        handle
    }

    /// Effects of this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Waits until every effect of this action has finished
    pub async fn wait(&mut self) {
        while self.pending() > 0 {
            // All trackers dropped: nothing left to finish
            if self.done.changed().await.is_err() {
                break;
            }
        }
    }

    /// [`wait`](Self::wait) with a deadline
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when the
    /// timeout expires.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Producer side of an [`EffectHandle`]
#[derive(Clone)]
struct Tracker {
    running: Arc<AtomicUsize>,
    done_tx: watch::Sender<()>,
}

/// Marks one effect as running, per action and store-wide, until dropped.
///
/// Dropping happens even when the effect task panics, so neither counter
/// can leak.
struct PendingGuard {
    tracker: Tracker,
    in_flight: Arc<AtomicUsize>,
}

impl PendingGuard {
    fn start(tracker: &Tracker, in_flight: &Arc<AtomicUsize>) -> Self {
        tracker.running.fetch_add(1, Ordering::SeqCst);
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            tracker: tracker.clone(),
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.tracker.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.tracker.done_tx.send(());
        }
    }
}

/// The store
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectHandle, Ordering, PendingGuard,
        Reducer, RwLock, StoreError, Tracker,
    };
    use tokio::sync::broadcast;

    /// Actions buffered for each observer before it starts lagging
    pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

    /// Runs a reducer against shared state.
    ///
    /// Cloning a store is cheap and every clone drives the same state, the
    /// same broadcast channel and the same shutdown flag.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        env: E,
        closing: Arc<AtomicBool>,
        in_flight: Arc<AtomicUsize>,
        actions: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Creates a store with [`DEFAULT_BROADCAST_CAPACITY`]
        #[must_use]
        pub fn new(initial_state: S, reducer: R, env: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, env, DEFAULT_BROADCAST_CAPACITY)
        }

        /// Creates a store whose observers may fall `capacity` actions behind
        #[must_use]
        pub fn with_broadcast_capacity(initial_state: S, reducer: R, env: E, capacity: usize) -> Self {
            let (actions, _) = broadcast::channel(capacity.max(1));
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                env,
                closing: Arc::new(AtomicBool::new(false)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                actions,
            }
        }

        /// Effects still running, across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.in_flight.load(Ordering::Acquire)
        }

        /// Stops accepting actions and waits for running effects.
        ///
        /// Actions produced by effects that finish during shutdown are still
        /// broadcast but no longer reduced.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running when `timeout` expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.closing.store(true, Ordering::Release);
            tracing::info!(pending = self.pending_effects(), "Store shutting down");

            let drained = tokio::time::timeout(timeout, async {
                while self.pending_effects() > 0 {
                    tokio::time::sleep(SHUTDOWN_POLL).await;
                }
            })
            .await;

            match drained {
                Ok(()) => {
                    tracing::info!("Store drained");
                    Ok(())
                },
                Err(_) => {
                    let pending = self.pending_effects();
                    tracing::error!(pending, "Shutdown deadline passed with effects running");
                    Err(StoreError::ShutdownTimeout(pending))
                },
            }
        }

        /// Reduces one action and starts its effects.
        ///
        /// Returns as soon as the effects are spawned. Concurrent sends are
        /// serialized by the write lock, so each reducer call sees the result
        /// of the previous one.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
        ///
        /// # Panics
        ///
        /// A panicking reducer panics the caller.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.closing.load(Ordering::Acquire) {
                tracing::warn!("Action refused, store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }
            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                let started = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.env);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                effects
            };
            tracing::trace!(effects = effects.len(), "Reduced");

            let (handle, tracker) = EffectHandle::new();
            for effect in effects {
                self.run_effect(effect, &tracker);
            }
            Ok(handle)
        }

        /// Sends an action and returns the first broadcast action matching
        /// `predicate`.
        ///
        /// The subscription is taken before sending, so an outcome produced
        /// immediately is not lost.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
        /// - [`StoreError::Timeout`] if nothing matched in time
        /// - [`StoreError::ChannelClosed`] if the broadcast closed
        ///
        /// ```ignore
        /// let command = QueueAction::CallNext { window_id };
        /// let outcome = store
        ///     .send_and_wait_for(command.clone(), move |a| a.answers(&command), Duration::from_secs(1))
        ///     .await?;
        /// ```
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
            let mut rx = self.actions.subscribe();
            self.send(action).await?;

            let matching = async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Waiter lagged behind the action broadcast");
                        },
                        Err(broadcast::error::RecvError::Closed) => return Err(StoreError::ChannelClosed),
                    }
                }
            };

            tokio::time::timeout(timeout, matching)
                .await
                .map_err(|_| StoreError::Timeout)?
        }

        /// Receiver for every action produced by an effect.
        ///
        /// Actions passed to `send` are not broadcast. A receiver that falls
        /// more than the broadcast capacity behind gets `RecvError::Lagged`.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.actions.subscribe()
        }

        /// Reads the state under the read lock
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&*self.state.read().await)
        }

        /// Broadcasts an effect's action, then reduces it
        async fn deliver(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            let _ = self.actions.send(action.clone());
            if self.closing.load(Ordering::Acquire) {
                tracing::trace!("Shutting down, action broadcast only");
                return;
            }
            let _ = self.send(action).await;
        }

        fn run_effect(&self, effect: Effect<A>, tracker: &Tracker)
        where
            R: Clone,
            E: Clone,
        {
            let kind = match &effect {
                Effect::None => "none",
                Effect::Future(_) => "future",
                Effect::Delay { .. } => "delay",
                Effect::Parallel(_) => "parallel",
                Effect::Sequential(_) => "sequential",
            };
            metrics::counter!("store.effects.executed", "type" => kind).increment(1);

            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    for effect in effects {
                        self.run_effect(effect, tracker);
                    }
                },
                Effect::Future(fut) => {
                    let guard = PendingGuard::start(tracker, &self.in_flight);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Some(action) = fut.await {
                            store.deliver(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    let guard = PendingGuard::start(tracker, &self.in_flight);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        tokio::time::sleep(duration).await;
                        store.deliver(*action).await;
                    });
                },
                Effect::Sequential(effects) => {
                    let guard = PendingGuard::start(tracker, &self.in_flight);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        for effect in effects {
                            let (mut step, step_tracker) = EffectHandle::new();
                            store.run_effect(effect, &step_tracker);
                            drop(step_tracker);
                            step.wait().await;
                        }
                    });
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
                env: self.env.clone(),
                closing: Arc::clone(&self.closing),
                in_flight: Arc::clone(&self.in_flight),
                actions: self.actions.clone(),
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::{smallvec, SmallVec};

    /// A take-a-number dispenser: the smallest store-driven queue
    #[derive(Debug, Clone, Default)]
    struct Dispenser {
        issued: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum DispenserAction {
        Take,
        Void,
        Idle,
        TakeLater,
        TakeAfter(Duration),
        TakeThreeAtOnce,
        TakeTakeVoid,
        BrokenPrinter,
        SlowPrinter,
    }

    #[derive(Debug, Clone)]
    struct DispenserReducer;

    impl Reducer for DispenserReducer {
        type State = Dispenser;
        type Action = DispenserAction;
        type Environment = ();

        #[allow(clippy::panic)]
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            use DispenserAction::{Take, Void};

            match action {
                Take => {
                    state.issued += 1;
                    SmallVec::new()
                },
                Void => {
                    state.issued -= 1;
                    SmallVec::new()
                },
                DispenserAction::Idle => smallvec![Effect::None],
                DispenserAction::TakeLater => smallvec![Effect::emit(Take)],
                DispenserAction::TakeAfter(duration) => smallvec![Effect::Delay {
                    duration,
                    action: Box::new(Take),
                }],
                DispenserAction::TakeThreeAtOnce => smallvec![Effect::Parallel(vec![
                    Effect::emit(Take),
                    Effect::emit(Take),
                    Effect::emit(Take),
                ])],
                DispenserAction::TakeTakeVoid => smallvec![Effect::Sequential(vec![
                    Effect::emit(Take),
                    Effect::emit(Take),
                    Effect::emit(Void),
                ])],
                DispenserAction::BrokenPrinter => smallvec![Effect::Future(Box::pin(async {
                    panic!("printer on fire");
                }))],
                DispenserAction::SlowPrinter => smallvec![Effect::Future(Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    None
                }))],
            }
        }
    }

    fn dispenser() -> Store<Dispenser, DispenserAction, (), DispenserReducer> {
        Store::new(Dispenser::default(), DispenserReducer, ())
    }

    #[tokio::test]
    async fn test_send_reduces_synchronously() -> Result<(), StoreError> {
        let store = dispenser();
        assert_eq!(store.state(|s| s.issued).await, 0);

        store.send(DispenserAction::Take).await?;
        store.send(DispenserAction::Idle).await?;
        assert_eq!(store.state(|s| s.issued).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_future_action_is_fed_back() -> Result<(), StoreError> {
        let store = dispenser();

        let mut handle = store.send(DispenserAction::TakeLater).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.state(|s| s.issued).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delay_waits_before_feeding_back() -> Result<(), StoreError> {
        let store = dispenser();

        let mut handle = store.send(DispenserAction::TakeAfter(Duration::from_millis(30))).await?;
        assert_eq!(store.state(|s| s.issued).await, 0);

        handle.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.state(|s| s.issued).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_parallel_and_sequential() -> Result<(), StoreError> {
        let store = dispenser();

        let mut parallel = store.send(DispenserAction::TakeThreeAtOnce).await?;
        parallel.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.state(|s| s.issued).await, 3);

        let mut sequential = store.send(DispenserAction::TakeTakeVoid).await?;
        sequential.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.state(|s| s.issued).await, 4);
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn test_concurrent_sends_serialize() {
        let store = dispenser();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.send(DispenserAction::Take).await.is_ok() })
            })
            .collect();

        for task in tasks {
            match task.await {
                Ok(sent) => assert!(sent),
                Err(e) => panic!("send task failed: {e}"),
            }
        }
        assert_eq!(store.state(|s| s.issued).await, 10);
    }

    #[tokio::test]
    async fn test_panicking_effect_is_isolated() -> Result<(), StoreError> {
        let store = dispenser();

        let mut handle = store.send(DispenserAction::BrokenPrinter).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.pending_effects(), 0);

        store.send(DispenserAction::Take).await?;
        assert_eq!(store.state(|s| s.issued).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_counts_running_effects() -> Result<(), StoreError> {
        let store = dispenser();

        let mut handle = store.send(DispenserAction::SlowPrinter).await?;
        assert_eq!(handle.pending(), 1);
        assert_eq!(store.pending_effects(), 1);

        handle.wait().await;
        assert_eq!(handle.pending(), 0);
        assert!(EffectHandle::completed().wait_with_timeout(Duration::from_millis(10)).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown() -> Result<(), StoreError> {
        let store = dispenser();
        store.send(DispenserAction::SlowPrinter).await?;

        let result = store.shutdown(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
        assert!(matches!(
            store.send(DispenserAction::Take).await,
            Err(StoreError::ShutdownInProgress)
        ));

        // Clones share the flag
        assert!(store.clone().send(DispenserAction::Take).await.is_err());
        Ok(())
    }

    /// Log sink shared with a `tracing` subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_drain_broadcasts_without_refusals() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        // Current-thread test runtime: spawned effects log on this thread too
        let _subscriber = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish(),
        );

        let store = dispenser();
        let mut rx = store.subscribe_actions();
        tokio_test::assert_ok!(
            store
                .send(DispenserAction::TakeAfter(Duration::from_millis(30)))
                .await
        );

        tokio_test::assert_ok!(store.shutdown(Duration::from_secs(1)).await);

        // Observers still get the action; the reducer does not
        assert_eq!(tokio_test::assert_ok!(rx.try_recv()), DispenserAction::Take);
        assert_eq!(store.state(|s| s.issued).await, 0);
        assert!(!logs.text().contains("Action refused"), "{}", logs.text());
    }
}
