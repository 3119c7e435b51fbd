//! # Kiosk Testing
//!
//! Testing utilities and helpers for the queue kiosk.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for returned effects
//!
//! ## Example
//!
//! ```ignore
//! use kiosk_testing::{ManualClock, ReducerTest};
//!
//! ReducerTest::new(QueueReducer::new())
//!     .with_env(test_environment())
//!     .given_state(QueueState::new(config))
//!     .when_action(QueueAction::IssueTicket { service_id })
//!     .then_state(|state| assert_eq!(state.tickets().len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use kiosk_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use kiosk_testing::mocks::FixedClock;
    /// use kiosk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// `advance` moves it explicitly; `with_step` makes every `now()` call
    /// return the current time and then move forward by the step, which
    /// gives each ticket a distinct creation time without sleeping.
    ///
    /// # Example
    ///
    /// ```
    /// use kiosk_testing::mocks::ManualClock;
    /// use kiosk_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::starting_at_epoch_day();
    /// let before = clock.now();
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - before, Duration::minutes(5));
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
        step: chrono::Duration,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
                step: chrono::Duration::zero(),
            }
        }

        /// Create a clock at the same instant as [`test_clock`]
        #[must_use]
        pub fn starting_at_epoch_day() -> Self {
            Self::new(test_clock().now())
        }

        /// Advance automatically by `step` after every reading
        #[must_use]
        pub const fn with_step(mut self, step: chrono::Duration) -> Self {
            self.step = step;
            self
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Set the clock to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            let current = *time;
            *time += self.step;
            current
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::{assertions, ReducerTest};
