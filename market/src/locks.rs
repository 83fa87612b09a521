//! Per-token serialization.
//!
//! Every command that reads then writes a card's ownership or listing state
//! holds that card's slot for the whole check-then-act. Commands on
//! different cards take different slots and run in parallel.
//!
//! A slot lives only while someone holds or waits for it, so commands
//! naming tokens that were never minted leave nothing behind.

use card_market_core::TokenId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as TableMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = HashMap<TokenId, Arc<Mutex<()>>>;

fn table(slots: &TableMutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to one token. The slot is released on drop.
#[derive(Debug)]
pub struct TokenGuard {
    token_id: TokenId,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<TableMutex<Slots>>,
}

impl TokenGuard {
    /// The token this guard serializes
    #[must_use]
    pub const fn token_id(&self) -> TokenId {
        self.token_id
    }
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the slot under the table lock, so a count of one
        // here means nobody else can reach it.
        let mut slots = table(&self.slots);
        if slots
            .get(&self.token_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.token_id);
        }
    }
}

/// Table of per-token mutexes, populated on demand.
#[derive(Debug, Default)]
pub struct TokenLocks {
    slots: Arc<TableMutex<Slots>>,
}

impl TokenLocks {
    /// Creates an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `token_id`.
    ///
    /// The table lock is only held long enough to find or create the slot,
    /// never while waiting on the slot itself.
    pub async fn acquire(&self, token_id: TokenId) -> TokenGuard {
        let slot = Arc::clone(table(&self.slots).entry(token_id).or_default());
        let guard = slot.lock_owned().await;
        TokenGuard {
            token_id,
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of tokens currently held or awaited
    #[must_use]
    pub fn len(&self) -> usize {
        table(&self.slots).len()
    }

    /// Checks if no token is held or awaited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        table(&self.slots).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_token_is_exclusive() {
        let locks = Arc::new(TokenLocks::new());
        let guard = locks.acquire(TokenId::new(1)).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(TokenId::new(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        let second = contender.await.unwrap();
        assert_eq!(second.token_id(), TokenId::new(1));
        assert_eq!(locks.len(), 1);

        drop(second);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_tokens_do_not_contend() {
        let locks = TokenLocks::new();
        let _first = locks.acquire(TokenId::new(1)).await;
        let _second = locks.acquire(TokenId::new(2)).await;
        assert_eq!(locks.len(), 2);
        assert!(!locks.is_empty());
    }

    #[tokio::test]
    async fn released_slots_are_removed() {
        let locks = TokenLocks::new();
        for id in 1..=500 {
            drop(locks.acquire(TokenId::new(id)).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn slot_is_removed_after_the_last_waiter() {
        let locks = Arc::new(TokenLocks::new());
        let guard = locks.acquire(TokenId::new(7)).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { drop(locks.acquire(TokenId::new(7)).await) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
