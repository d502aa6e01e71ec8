//! # Cinebook Runtime
//!
//! The `Store` runtime that coordinates reducer execution and effect
//! handling for one aggregate.
//!
//! A store owns the aggregate state behind an async `RwLock`. Every
//! `send(action)` acquires the write lock, runs the reducer synchronously,
//! then executes the returned effects on spawned tasks. Actions produced by
//! effects are fed back into the store and broadcast to observers, which is
//! what makes request/response flows (`send_and_wait_for`) possible.
//!
//! Because the reducer runs under the write lock, concurrent `send` calls
//! serialize at the reducer. That lock is the single coordination point per
//! aggregate: a seat claim or an order status transition is atomic with
//! respect to every other command racing for the same aggregate.

use cinebook_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action in `send_and_wait_for`
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed (store shutting down)
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// The Store - runtime coordinator for a reducer
///
/// Cloning a store is cheap; clones share state, shutdown flag, and the
/// action broadcast channel.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: R,
    environment: E,
    shutdown: Arc<AtomicBool>,
    pending_effects: Arc<AtomicUsize>,
    /// All actions produced by effects are broadcast to observers. This
    /// enables request-response patterns over an asynchronous saga.
    action_broadcast: broadcast::Sender<A>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
    }

    /// Create a store with a custom action broadcast capacity.
    ///
    /// Increase the capacity when many observers subscribe or callbacks
    /// arrive in bursts; lagged observers skip old actions.
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(capacity);

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer,
            environment,
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_effects: Arc::new(AtomicUsize::new(0)),
            action_broadcast,
        }
    }

    /// Read a projection of the current state
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let guard = self.state.read().await;
        f(&guard)
    }

    /// Send an action to the store
    ///
    /// 1. Acquires the write lock on state
    /// 2. Runs the reducer with (state, action, environment)
    /// 3. Executes returned effects on spawned tasks
    ///
    /// `send()` returns after starting effect execution, not completion.
    /// Effects may produce more actions, which re-enter through this path
    /// and are broadcast to observers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting
    /// down.
    pub async fn send(&self, action: A) -> Result<(), StoreError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(StoreError::ShutdownInProgress);
        }

        metrics::counter!("store.actions.sent").increment(1);

        let effects = {
            let mut state = self.state.write().await;
            self.reducer.reduce(&mut state, action, &self.environment)
        };

        for effect in effects {
            self.spawn_effect(effect);
        }

        Ok(())
    }

    /// Send an action and wait for a matching result action
    ///
    /// Designed for request-response flows: subscribes to the action
    /// broadcast before sending (no race), sends the action, then returns
    /// the first effect-produced action matching the predicate.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if no matching action arrives in time
    /// - [`StoreError::ChannelClosed`] if the broadcast channel closed
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        // Subscribe BEFORE sending to avoid missing a fast result
        let mut rx = self.action_broadcast.subscribe();

        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow consumer; if the terminal action was dropped
                        // the timeout catches it.
                        tracing::warn!(skipped, "action observer lagged");
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

    /// Subscribe to all actions produced by effects on this store
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Initiate graceful shutdown
    ///
    /// Sets the shutdown flag (rejecting new actions) and waits for pending
    /// effects to complete, polling until the timeout expires.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when the timeout expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("initiating graceful shutdown");
        self.shutdown.store(true, Ordering::Release);

        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            let pending = self.pending_effects.load(Ordering::Acquire);
            if pending == 0 {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::error!(pending, "shutdown timeout with effects still running");
                return Err(StoreError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Number of effects currently in flight (tests and health checks)
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects.load(Ordering::Acquire)
    }

    fn spawn_effect(&self, effect: Effect<A>) {
        if matches!(effect, Effect::None) {
            return;
        }

        let store = self.clone();
        self.pending_effects.fetch_add(1, Ordering::AcqRel);
        metrics::counter!("store.effects.spawned").increment(1);

        tokio::spawn(async move {
            store.execute_effect(effect).await;
            store.pending_effects.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Execute one effect, feeding produced actions back into the store.
    fn execute_effect(
        &self,
        effect: Effect<A>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    let mut handles = Vec::with_capacity(effects.len());
                    for inner in effects {
                        let store = self.clone();
                        handles.push(tokio::spawn(async move {
                            store.execute_effect(inner).await;
                        }));
                    }
                    for handle in handles {
                        if let Err(err) = handle.await {
                            tracing::error!(error = %err, "parallel effect task failed");
                        }
                    }
                },
                Effect::Sequential(effects) => {
                    for inner in effects {
                        self.execute_effect(inner).await;
                    }
                },
                Effect::Delay { duration, action } => {
                    tokio::time::sleep(duration).await;
                    self.feed_back(*action).await;
                },
                Effect::Future(fut) => {
                    if let Some(action) = fut.await {
                        self.feed_back(action).await;
                    }
                },
            }
        })
    }

    async fn feed_back(&self, action: A) {
        // Broadcast first so request-response observers see terminal
        // actions even when the store is already draining.
        let _ = self.action_broadcast.send(action.clone());
        metrics::counter!("store.actions.fed_back").increment(1);

        if let Err(err) = self.send(action).await {
            tracing::debug!(error = %err, "dropped feedback action during shutdown");
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
            shutdown: Arc::clone(&self.shutdown),
            pending_effects: Arc::clone(&self.pending_effects),
            action_broadcast: self.action_broadcast.clone(),
        }
    }
}
