//! # Kiosk Core
//!
//! Core traits and types shared by every part of the queue kiosk.
//!
//! The kiosk is built as a functional core with an imperative shell:
//!
//! - **State**: the ticket queue, window slots and call history
//! - **Action**: every input to the queue (operator commands and the domain
//!   events they produce)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`, the only
//!   place queue state changes
//! - **Effect**: a description of a side effect (voice announcement, ticket
//!   printing) that the runtime executes after the state change is committed
//! - **Environment**: injected collaborators (clock, notifier)
//!
//! ## Example
//!
//! ```
//! use kiosk_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     issued: u32,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Issue,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Issue => {
//!                 state.issued += 1;
//!                 smallvec![Effect::None]
//!             }
//!         }
//!     }
//! }
//!
//! let mut state = CounterState::default();
//! let _ = CounterReducer.reduce(&mut state, CounterAction::Issue, &());
//! assert_eq!(state.issued, 1);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// The reducer trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Applies one action to the state and describes what should happen next.
    ///
    /// Implementations mutate `state` in place and return effects for the
    /// runtime to execute. Nothing in `reduce` may block or perform I/O;
    /// anything slow belongs in an [`Effect`]. Given the same environment,
    /// the same state and action always yield the same result.
    ///
    /// Up to four effects fit in the returned `SmallVec` without allocating.
    pub trait Reducer {
        /// State owned by the store
        type State;

        /// Commands and events
        type Action;

        /// Injected collaborators such as the clock
        type Environment;

        /// Reduces `action` into `state`, returning the effects to run
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effects as values
///
/// A reducer that returns an announcement effect has not announced anything
/// yet; the store runs it after the state change is committed.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// A side effect for the store to run.
    ///
    /// Effects that yield an action feed it back into the store, which
    /// broadcasts it and reduces it like any other action.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// All at once
        Parallel(Vec<Effect<Action>>),

        /// One after another, each finishing before the next starts
        Sequential(Vec<Effect<Action>>),

        /// Dispatch `action` after `duration`
        Delay {
            /// Wait before dispatching
            duration: Duration,
            /// Dispatched afterwards
            action: Box<Action>,
        },

        /// Async work, optionally yielding an action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => f.write_str("Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Runs `effects` concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Self>) -> Self {
            Self::Parallel(effects)
        }

        /// Runs `effects` in order
        #[must_use]
        pub const fn chain(effects: Vec<Self>) -> Self {
            Self::Sequential(effects)
        }

        /// Yields `action` as soon as the effect runs.
        ///
        /// This is how a reducer publishes a domain event: the store
        /// broadcasts it to observers and then reduces it.
        #[must_use]
        pub fn emit(action: Action) -> Self
        where
            Action: Send + 'static,
        {
            Self::Future(Box::pin(async move { Some(action) }))
        }

        /// `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Collaborators injected through a reducer's environment
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of "now" for ticket and call timestamps.
    ///
    /// Tests pin or step time to make FIFO ordering deterministic.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
