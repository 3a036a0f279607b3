//! # Turnstile Testing
//!
//! Testing utilities and helpers for the Turnstile reducer architecture.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect assertion helpers
//! - Async helpers for driving a `Store` under tokio's paused test clock
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::{helpers::settle, test_clock};
//!
//! #[tokio::test(start_paused = true)]
//! async fn gate_closes_after_timeout() {
//!     let store = Store::new(GateState::default(), GateReducer, env(test_clock()));
//!
//!     store.send(GateAction::Open).await?;
//!     tokio::time::advance(Duration::from_secs(5)).await;
//!     settle().await;
//!
//!     assert!(!store.state(|s| s.open).await);
//! }
//! ```

pub mod reducer_test;

use chrono::{DateTime, Utc};
use turnstile_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Async test helpers
pub mod helpers {
    /// Let every ready task run without advancing tokio's clock.
    ///
    /// Under `#[tokio::test(start_paused = true)]` spawned effect tasks only
    /// make progress when the test task yields. Yielding never auto-advances
    /// the paused clock, so timers stay exactly where the test put them.
    pub async fn settle() {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Honours `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
