//! Event journal trait for durable ledger storage.
//!
//! The journal is the ledger's only storage collaborator: an append-only log
//! of [`SerializedEvent`]s. The in-memory tables of the ledger are a pure
//! function of the journal, so replaying it from the start reconstructs cards,
//! listings, and trade history.
//!
//! # Implementations
//!
//! - `FileJournal` (in the `card-market` crate): length-prefixed frames in a local file
//! - `InMemoryJournal` (in `card-market-testing`): fast, deterministic testing
//! - `UnavailableJournal` (in `card-market-testing`): always fails, for failure-path tests

use crate::event::SerializedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// The backing store cannot be reached.
    #[error("journal unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing the backing store failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// An event could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data is not a valid journal.
    #[error("journal corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Byte offset (or entry index) where the damage was found
        offset: u64,
        /// Description of the damage
        reason: String,
    },
}

impl From<std::io::Error> for JournalError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Append-only storage for market events.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the ledger shares one journal
/// between every in-flight command.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` rather than using `async fn` so the
/// ledger can hold an `Arc<dyn EventJournal>`.
pub trait EventJournal: Send + Sync {
    /// Durably append a batch of events.
    ///
    /// A batch is all-or-nothing: when this returns an error, none of the
    /// events may be visible to a later [`load_all`](Self::load_all).
    ///
    /// Returns the journal length (in events) after the append.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the events could not be made durable.
    fn append(
        &self,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, JournalError>> + Send + '_>>;

    /// Load every event in append order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the store cannot be read or is corrupted.
    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, JournalError>> + Send + '_>>;
}
