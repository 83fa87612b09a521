//! In-memory journal doubles
//!
//! - [`InMemoryJournal`]: Vec-backed journal with a switchable outage mode
//! - [`UnavailableJournal`]: a journal that is never reachable

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use card_market_core::event::{MarketEvent, SerializedEvent};
use card_market_core::journal::{EventJournal, JournalError};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory journal for fast, deterministic testing.
///
/// Clones share the same underlying log, so a test can keep a handle for
/// inspection after passing the journal to the ledger.
///
/// # Example
///
/// ```
/// use card_market_testing::InMemoryJournal;
///
/// let journal = InMemoryJournal::new();
/// journal.set_available(false);
/// assert!(journal.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryJournal {
    events: Arc<RwLock<Vec<SerializedEvent>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryJournal {
    /// Create a new empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a journal pre-populated with events (for replay tests)
    #[must_use]
    pub fn with_events(events: Vec<SerializedEvent>) -> Self {
        Self {
            events: Arc::new(RwLock::new(events)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of journaled events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Check if nothing has been journaled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().unwrap().is_empty()
    }

    /// Raw journaled events, in append order
    #[must_use]
    pub fn serialized(&self) -> Vec<SerializedEvent> {
        self.events.read().unwrap().clone()
    }

    /// Decoded journaled events, in append order
    ///
    /// Undecodable entries are skipped.
    #[must_use]
    pub fn decoded(&self) -> Vec<MarketEvent> {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter_map(|stored| MarketEvent::from_serialized(stored).ok())
            .collect()
    }

    fn outage(&self) -> Option<JournalError> {
        self.unavailable
            .load(Ordering::SeqCst)
            .then(|| JournalError::Unavailable("in-memory journal is offline".to_string()))
    }
}

impl EventJournal for InMemoryJournal {
    fn append(
        &self,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, JournalError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(error) = self.outage() {
                return Err(error);
            }
            let mut log = self.events.write().unwrap();
            log.extend(events);
            Ok(log.len() as u64)
        })
    }

    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, JournalError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(error) = self.outage() {
                return Err(error);
            }
            Ok(self.events.read().unwrap().clone())
        })
    }
}

/// A journal whose storage is never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableJournal;

impl EventJournal for UnavailableJournal {
    fn append(
        &self,
        _events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, JournalError>> + Send + '_>> {
        Box::pin(async { Err(JournalError::Unavailable("storage detached".to_string())) })
    }

    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, JournalError>> + Send + '_>> {
        Box::pin(async { Err(JournalError::Unavailable("storage detached".to_string())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(kind: &str) -> SerializedEvent {
        SerializedEvent::new(kind.to_string(), vec![1, 2, 3])
    }

    #[tokio::test]
    async fn appends_are_visible_to_clones() {
        let journal = InMemoryJournal::new();
        let handle = journal.clone();

        let len = journal.append(vec![stored("a"), stored("b")]).await.unwrap();
        assert_eq!(len, 2);
        assert_eq!(handle.len(), 2);
        assert_eq!(handle.load_all().await.unwrap()[1].event_type, "b");
    }

    #[tokio::test]
    async fn outage_rejects_appends_without_side_effects() {
        let journal = InMemoryJournal::new();
        journal.set_available(false);

        let result = journal.append(vec![stored("a")]).await;
        assert!(matches!(result, Err(JournalError::Unavailable(_))));
        assert!(journal.is_empty());

        journal.set_available(true);
        assert_eq!(journal.append(vec![stored("a")]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_journal_always_fails() {
        assert!(UnavailableJournal.append(vec![]).await.is_err());
        assert!(UnavailableJournal.load_all().await.is_err());
    }
}
