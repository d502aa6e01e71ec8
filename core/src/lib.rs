//! # Cinebook Core
//!
//! Core traits and types for the Cinebook booking engine.
//!
//! The engine is built on the Reducer pattern: every aggregate is a pure
//! function `(State, Action, Environment) → (State, Effects)`. State changes
//! happen in the reducer; side effects are returned as values and executed
//! by the runtime, possibly feeding actions back into the reducer.
//!
//! ## Core concepts
//!
//! - **State**: owned domain state for one aggregate
//! - **Action**: all possible inputs to a reducer (commands and events)
//! - **Reducer**: pure business logic
//! - **Effect**: side effect descriptions, not execution
//! - **Environment**: injected dependencies behind traits

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub use effect::Effect;
pub use reducer::{Effects, Reducer};

/// Reducer module - the core trait for business logic
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effect list returned by a reducer. Most reducers emit zero to four
    /// effects per action, so the inline capacity avoids allocation on the
    /// hot path.
    pub type Effects<A> = SmallVec<[Effect<A>; 4]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// A reducer validates the action, updates state in place, and returns
    /// descriptions of the side effects to run. It must not perform I/O
    /// itself; everything external goes through the `Environment`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for WalletReducer {
    ///     type State = WalletState;
    ///     type Action = WalletAction;
    ///     type Environment = WalletEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut WalletState,
    ///         action: WalletAction,
    ///         env: &WalletEnvironment,
    ///     ) -> Effects<WalletAction> {
    ///         // Business logic here
    ///         SmallVec::new()
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Effect module - side effect descriptions
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Describes a side effect to be executed by the runtime.
    ///
    /// Effects are NOT executed immediately. They are values returned from
    /// reducers; the `Store` runtime executes them and feeds any produced
    /// action back into the reducer.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Dispatch an action after a delay (timeouts, retries)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after the delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if `Some`, the action is fed back
        /// into the reducer.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap a future that may produce a follow-up action
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter, keeping reducers deterministic in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Fixed clock for deterministic tests
    #[derive(Clone, Copy, Debug)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Creates a clock frozen at the given instant
        #[must_use]
        pub const fn at(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }
}
