//! Injected dependencies for the ledger.
//!
//! All ambient inputs the ledger needs (currently only time) are abstracted
//! behind traits so production and test environments can differ.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Listing creation times and sale timestamps are taken from the clock at
/// the moment a command is validated.
///
/// # Examples
///
/// ```
/// use card_market_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = clock.now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
