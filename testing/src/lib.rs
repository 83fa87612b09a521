//! # Card Market Testing
//!
//! Testing utilities and helpers for the card marketplace ledger.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - Journal doubles ([`InMemoryJournal`], [`UnavailableJournal`])
//! - Fixture helpers for accounts, prices, and card drafts
//!
//! ## Example
//!
//! ```ignore
//! use card_market_testing::{account, card_draft, ether, InMemoryJournal, SteppingClock};
//! use card_market::{Market, MarketConfig};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_initial_sale() -> Result<(), card_market_core::MarketError> {
//!     let market = Market::new(
//!         MarketConfig::default(),
//!         Arc::new(SteppingClock::default()),
//!         Arc::new(InMemoryJournal::new()),
//!     );
//!     let card = market.mint(account("inventory"), card_draft("Striker", "0.06")).await?;
//!     market.purchase_initial(card.id, account("alice"), ether("0.06")).await?;
//!     Ok(())
//! }
//! ```

use card_market_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};

pub mod fixtures;
pub mod journal_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use card_market_testing::mocks::FixedClock;
    /// use card_market_core::environment::Clock;
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
        FixedClock::new(epoch())
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Gives every listing and sale a distinct, strictly increasing
    /// timestamp, which keeps history ordering assertions exact.
    ///
    /// # Example
    ///
    /// ```
    /// use card_market_testing::mocks::SteppingClock;
    /// use card_market_core::environment::Clock;
    ///
    /// let clock = SteppingClock::default();
    /// let first = clock.now();
    /// assert!(clock.now() > first);
    /// ```
    #[derive(Debug)]
    pub struct SteppingClock {
        start: DateTime<Utc>,
        step: Duration,
        ticks: AtomicI64,
    }

    impl SteppingClock {
        /// Create a clock starting at `start` and advancing by `step`
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                start,
                step,
                ticks: AtomicI64::new(0),
            }
        }

        /// Number of readings taken so far
        #[must_use]
        pub fn readings(&self) -> i64 {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    impl Default for SteppingClock {
        fn default() -> Self {
            Self::new(epoch(), Duration::seconds(1))
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + self.step * i32::try_from(tick).unwrap_or(i32::MAX)
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Install a test subscriber so `tracing` output shows up with `--nocapture`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{account, card_draft, ether};
pub use journal_mocks::{InMemoryJournal, UnavailableJournal};
pub use mocks::{FixedClock, SteppingClock, test_clock};
