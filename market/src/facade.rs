//! Trading facade: the single entry point for callers.
//!
//! Every command follows the same path:
//!
//! 1. acquire the token's slot in [`TokenLocks`] (mints take the mint lock)
//! 2. validate against read guards and build the resulting [`MarketEvent`]s
//! 3. append the events to the journal
//! 4. apply them under write guards, taken in the order cards, listings, ledger
//! 5. broadcast them to subscribers
//!
//! Nothing is applied until the journal has accepted the events, so a storage
//! failure leaves the in-memory tables exactly as they were. Because the
//! token slot is held from step 1 to step 4, no other command can change the
//! token between validation and apply.

use crate::config::MarketConfig;
use crate::ledger::TransactionLedger;
use crate::listings::ListingBook;
use crate::locks::TokenLocks;
use crate::registry::CardRegistry;
use crate::sale::{self, SaleChannel, SaleRequest};
use crate::telemetry;
use card_market_core::{
    AccountId, Card, CardDraft, CardView, Clock, EventJournal, JournalError, Listing, MarketError,
    MarketEvent, Price, Result, SaleRecord, SaleStats, SerializedEvent, TokenId, TradingStats,
};
use smallvec::{SmallVec, smallvec};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, broadcast};

/// Events produced by one command. Most commands produce exactly one.
type Events = SmallVec<[MarketEvent; 4]>;

/// The marketplace ledger.
///
/// Share it between tasks with an [`Arc`]; every method takes `&self`.
pub struct Market {
    config: MarketConfig,
    clock: Arc<dyn Clock>,
    journal: Arc<dyn EventJournal>,
    registry: RwLock<CardRegistry>,
    listings: RwLock<ListingBook>,
    ledger: RwLock<TransactionLedger>,
    token_locks: TokenLocks,
    mint_lock: Mutex<()>,
    next_sequence: AtomicU64,
    events: broadcast::Sender<MarketEvent>,
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("config", &self.config)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Construction and recovery
// ============================================================================

impl Market {
    /// Creates an empty market.
    ///
    /// The journal is assumed to be empty; use [`Market::recover`] to start
    /// from an existing one.
    #[must_use]
    pub fn new(config: MarketConfig, clock: Arc<dyn Clock>, journal: Arc<dyn EventJournal>) -> Self {
        Self::from_tables(
            config,
            clock,
            journal,
            CardRegistry::new(),
            ListingBook::new(),
            TransactionLedger::new(),
        )
    }

    fn from_tables(
        config: MarketConfig,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn EventJournal>,
        registry: CardRegistry,
        listings: ListingBook,
        ledger: TransactionLedger,
    ) -> Self {
        // A zero-capacity broadcast channel is not allowed.
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let next_sequence = ledger.last_sequence().map_or(1, |last| last + 1);
        Self {
            config,
            clock,
            journal,
            registry: RwLock::new(registry),
            listings: RwLock::new(listings),
            ledger: RwLock::new(ledger),
            token_locks: TokenLocks::new(),
            mint_lock: Mutex::new(()),
            next_sequence: AtomicU64::new(next_sequence),
            events,
        }
    }

    /// Rebuilds a market by replaying every event in `journal`.
    ///
    /// Replay runs the same validation as live commands, so a journal that
    /// describes an impossible history is rejected rather than loaded.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Storage`] if the journal cannot be read, holds
    /// an undecodable entry, or holds an entry that does not apply cleanly
    /// (reported as [`JournalError::Corrupted`] at that entry's index).
    #[tracing::instrument(skip_all)]
    pub async fn recover(
        config: MarketConfig,
        clock: Arc<dyn Clock>,
        journal: Arc<dyn EventJournal>,
    ) -> Result<Self> {
        let stored = journal.load_all().await?;
        let mut registry = CardRegistry::new();
        let mut listings = ListingBook::new();
        let mut ledger = TransactionLedger::new();

        for (index, entry) in stored.iter().enumerate() {
            let event = MarketEvent::from_serialized(entry).map_err(|error| {
                JournalError::Corrupted {
                    offset: index as u64,
                    reason: error.to_string(),
                }
            })?;
            apply_event(&mut registry, &mut listings, &mut ledger, &event).map_err(|error| {
                JournalError::Corrupted {
                    offset: index as u64,
                    reason: format!("{} does not apply: {error}", entry.event_type),
                }
            })?;
        }

        tracing::info!(
            events = stored.len(),
            cards = registry.total_supply(),
            sales = ledger.len(),
            "market recovered from journal"
        );
        Ok(Self::from_tables(config, clock, journal, registry, listings, ledger))
    }

    /// Configuration the market was built with
    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Receives every event after it has been journaled and applied.
    ///
    /// Receivers that fall more than `event_capacity` events behind observe
    /// `RecvError::Lagged` and should re-read state through the queries.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Commit pipeline
// ============================================================================

/// Applies one journaled event to the tables.
///
/// Shared by live commits and replay, so recovered state is built by exactly
/// the code that built the original.
fn apply_event(
    registry: &mut CardRegistry,
    listings: &mut ListingBook,
    ledger: &mut TransactionLedger,
    event: &MarketEvent,
) -> Result<()> {
    match event {
        MarketEvent::CardMinted { card } => registry.insert(card.clone()),
        MarketEvent::InitialSaleToggled {
            token_id, for_sale, ..
        } => registry.set_for_sale(*token_id, *for_sale),
        MarketEvent::CardListed { listing } => {
            listings.validate_listing(registry, listing.token_id, &listing.seller, listing.price)?;
            listings.insert(listing.clone());
            Ok(())
        }
        MarketEvent::ListingRepriced {
            token_id,
            seller,
            new_price,
            ..
        } => listings
            .update_price(*token_id, seller, *new_price)
            .map(|_| ()),
        MarketEvent::ListingCancelled {
            token_id, seller, ..
        } => listings.cancel(*token_id, seller).map(|_| ()),
        MarketEvent::CardSold { record } => {
            sale::settle(record.clone(), registry, listings, ledger).map(|_| ())
        }
    }
}

impl Market {
    /// Runs a command body with logging and metrics around it.
    async fn run<T>(
        &self,
        command: &'static str,
        body: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        metrics::counter!(telemetry::COMMANDS_TOTAL, "command" => command).increment(1);
        let result = body.await;
        match &result {
            Ok(_) => tracing::debug!(command, "command accepted"),
            Err(error) => {
                metrics::counter!(
                    telemetry::COMMANDS_REJECTED,
                    "command" => command,
                    "kind" => error.kind()
                )
                .increment(1);
                if error.is_fatal() {
                    tracing::error!(command, %error, "command failed, storage unavailable");
                } else {
                    tracing::warn!(
                        command,
                        kind = error.kind(),
                        token = ?error.token_id(),
                        %error,
                        "command rejected"
                    );
                }
            }
        }
        result
    }

    /// Journals `events`, then applies and broadcasts them.
    async fn commit(&self, events: Events) -> Result<()> {
        let started = Instant::now();
        let serialized = events
            .iter()
            .map(SerializedEvent::from_event)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|error| JournalError::Serialization(error.to_string()))?;

        if let Err(error) = self.journal.append(serialized).await {
            metrics::counter!(telemetry::JOURNAL_FAILURES).increment(1);
            return Err(error.into());
        }

        {
            let mut registry = self.registry.write().await;
            let mut listings = self.listings.write().await;
            let mut ledger = self.ledger.write().await;
            for event in &events {
                if let Err(error) = apply_event(&mut registry, &mut listings, &mut ledger, event) {
                    // Validation ran under the same token slot, so this means
                    // the in-memory tables and the journal have diverged.
                    tracing::error!(
                        event = event.event_type(),
                        token = %event.token_id(),
                        %error,
                        "journaled event failed to apply"
                    );
                    return Err(error);
                }
            }
        }

        metrics::histogram!(telemetry::COMMIT_DURATION).record(started.elapsed().as_secs_f64());
        for event in events {
            // Having no subscribers is not an error.
            let _ = self.events.send(event);
        }
        Ok(())
    }
}

// ============================================================================
// Commands
// ============================================================================

impl Market {
    /// Mints a card into the primary inventory under the next identifier.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidAccount`] if `owner` is blank
    /// - [`MarketError::InvalidPrice`] if the base price is zero
    /// - [`MarketError::SupplyExhausted`] once `u64::MAX` has been minted
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self, draft), fields(name = %draft.display_name))]
    pub async fn mint(&self, owner: AccountId, draft: CardDraft) -> Result<Card> {
        self.run("mint", async {
            let _mint = self.mint_lock.lock().await;
            let card = {
                let registry = self.registry.read().await;
                registry.prepare_mint(registry.next_token_id()?, owner, draft, self.clock.now())?
            };
            self.commit(smallvec![MarketEvent::CardMinted { card: card.clone() }])
                .await?;
            tracing::info!(token = %card.id, owner = %card.owner, price = %card.base_price, "card minted");
            Ok(card)
        })
        .await
    }

    /// Mints several cards with consecutive identifiers, all or none.
    ///
    /// # Errors
    ///
    /// - [`MarketError::BatchTooLarge`] above the configured batch limit
    /// - any error [`mint`](Self::mint) can return, for any card in the batch
    #[tracing::instrument(skip(self, drafts), fields(count = drafts.len()))]
    pub async fn mint_batch(&self, owner: AccountId, drafts: Vec<CardDraft>) -> Result<Vec<Card>> {
        self.run("mint_batch", async {
            let limit = self.config.max_batch_mint;
            if drafts.len() > limit {
                return Err(MarketError::BatchTooLarge {
                    requested: drafts.len(),
                    limit,
                });
            }
            if drafts.is_empty() {
                return Ok(Vec::new());
            }

            let _mint = self.mint_lock.lock().await;
            let cards = {
                let registry = self.registry.read().await;
                let now = self.clock.now();
                let mut id = registry.next_token_id()?;
                let mut cards = Vec::with_capacity(drafts.len());
                let mut drafts = drafts.into_iter().peekable();
                while let Some(draft) = drafts.next() {
                    cards.push(registry.prepare_mint(id, owner.clone(), draft, now)?);
                    if drafts.peek().is_some() {
                        id = id.next().ok_or(MarketError::SupplyExhausted(id))?;
                    }
                }
                cards
            };

            let events: Events = cards
                .iter()
                .map(|card| MarketEvent::CardMinted { card: card.clone() })
                .collect();
            self.commit(events).await?;
            tracing::info!(count = cards.len(), owner = %owner, "card batch minted");
            Ok(cards)
        })
        .await
    }

    /// Mints a card under an explicit identifier, for imports and restores.
    ///
    /// Identifiers generated afterwards stay above every minted identifier.
    ///
    /// # Errors
    ///
    /// - [`MarketError::AlreadyExists`] if `token_id` is taken
    /// - [`MarketError::InvalidTokenId`] for identifier 0
    /// - any other error [`mint`](Self::mint) can return
    #[tracing::instrument(skip(self, draft))]
    pub async fn mint_with_id(
        &self,
        token_id: TokenId,
        owner: AccountId,
        draft: CardDraft,
    ) -> Result<Card> {
        self.run("mint_with_id", async {
            let _mint = self.mint_lock.lock().await;
            let _token = self.token_locks.acquire(token_id).await;
            let card = self
                .registry
                .read()
                .await
                .prepare_mint(token_id, owner, draft, self.clock.now())?;
            self.commit(smallvec![MarketEvent::CardMinted { card: card.clone() }])
                .await?;
            tracing::info!(token = %card.id, owner = %card.owner, "card minted with explicit id");
            Ok(card)
        })
        .await
    }

    /// Lists a card on the secondary market.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] for an unminted token
    /// - [`MarketError::NotOwner`] if `seller` does not own the card
    /// - [`MarketError::InvalidPrice`] if `price` is zero
    /// - [`MarketError::AlreadyListed`] if the card is already listed
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, token_id: TokenId, seller: AccountId, price: Price) -> Result<Listing> {
        self.run("list", async {
            let _token = self.token_locks.acquire(token_id).await;
            {
                let registry = self.registry.read().await;
                let listings = self.listings.read().await;
                listings.validate_listing(&registry, token_id, &seller, price)?;
            }
            let listing = Listing::new(token_id, seller, price, self.clock.now());
            self.commit(smallvec![MarketEvent::CardListed {
                listing: listing.clone()
            }])
            .await?;
            Ok(listing)
        })
        .await
    }

    /// Withdraws a listing. Returns the listing as it now stands, inactive.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if the card is not listed
    /// - [`MarketError::NotSeller`] if `seller` did not create the listing
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, token_id: TokenId, seller: AccountId) -> Result<Listing> {
        self.run("cancel", async {
            let _token = self.token_locks.acquire(token_id).await;
            let mut listing = self
                .listings
                .read()
                .await
                .seller_listing(token_id, &seller)?
                .clone();
            self.commit(smallvec![MarketEvent::ListingCancelled {
                token_id,
                seller,
                cancelled_at: self.clock.now(),
            }])
            .await?;
            listing.active = false;
            Ok(listing)
        })
        .await
    }

    /// Changes the asking price of an active listing.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if the card is not listed
    /// - [`MarketError::NotSeller`] if `seller` did not create the listing
    /// - [`MarketError::InvalidPrice`] if `new_price` is zero
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn reprice(
        &self,
        token_id: TokenId,
        seller: AccountId,
        new_price: Price,
    ) -> Result<Listing> {
        self.run("reprice", async {
            let _token = self.token_locks.acquire(token_id).await;
            let mut listing = self
                .listings
                .read()
                .await
                .validate_update_price(token_id, &seller, new_price)?
                .clone();
            self.commit(smallvec![MarketEvent::ListingRepriced {
                token_id,
                seller,
                old_price: listing.price,
                new_price,
                repriced_at: self.clock.now(),
            }])
            .await?;
            listing.price = new_price;
            Ok(listing)
        })
        .await
    }

    /// Buys a card from the primary inventory at its base price.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] for an unminted token
    /// - [`MarketError::NotForSale`] once the card has left the inventory
    /// - [`MarketError::PriceMismatch`] unless `amount` equals the base price
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn purchase_initial(
        &self,
        token_id: TokenId,
        buyer: AccountId,
        amount: Price,
    ) -> Result<SaleRecord> {
        self.run(
            "purchase_initial",
            self.purchase(SaleChannel::Initial, token_id, buyer, amount),
        )
        .await
    }

    /// Buys a card from its active listing.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if the card is not listed, including
    ///   when a concurrent buyer got there first
    /// - [`MarketError::SelfPurchase`] if `buyer` is the seller
    /// - [`MarketError::PriceMismatch`] unless `amount` equals the listing price
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn purchase_secondary(
        &self,
        token_id: TokenId,
        buyer: AccountId,
        amount: Price,
    ) -> Result<SaleRecord> {
        self.run(
            "purchase_secondary",
            self.purchase(SaleChannel::Secondary, token_id, buyer, amount),
        )
        .await
    }

    async fn purchase(
        &self,
        channel: SaleChannel,
        token_id: TokenId,
        buyer: AccountId,
        amount: Price,
    ) -> Result<SaleRecord> {
        let _token = self.token_locks.acquire(token_id).await;
        let request = SaleRequest {
            token_id,
            buyer,
            paid: amount,
            at: self.clock.now(),
        };
        let mut record = {
            let registry = self.registry.read().await;
            let listings = self.listings.read().await;
            channel.prepare(&registry, &listings, &request)?
        };
        TransactionLedger::validate(&record)?;
        record.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);

        self.commit(smallvec![MarketEvent::CardSold {
            record: record.clone()
        }])
        .await?;

        metrics::counter!(telemetry::SALES_TOTAL, "channel" => record.kind.as_str()).increment(1);
        tracing::info!(
            token = %record.token_id,
            seller = %record.seller,
            buyer = %record.buyer,
            price = %record.price,
            channel = %record.kind,
            sequence = record.sequence,
            "card sold"
        );
        Ok(record)
    }

    /// Sets whether a card can be bought from the primary inventory.
    ///
    /// Administrative surface: callers are expected to restrict access.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] for an unminted token
    /// - [`MarketError::Storage`] if the journal is unavailable
    #[tracing::instrument(skip(self))]
    pub async fn set_for_sale(&self, token_id: TokenId, for_sale: bool) -> Result<Card> {
        self.run("set_for_sale", async {
            let _token = self.token_locks.acquire(token_id).await;
            let mut card = self.registry.read().await.get(token_id)?.clone();
            self.commit(smallvec![MarketEvent::InitialSaleToggled {
                token_id,
                for_sale,
                toggled_at: self.clock.now(),
            }])
            .await?;
            card.for_sale = for_sale;
            Ok(card)
        })
        .await
    }
}

// ============================================================================
// Queries
// ============================================================================

impl Market {
    /// Current owner of a card.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] for an unminted token.
    pub async fn owner_of(&self, token_id: TokenId) -> Result<AccountId> {
        self.registry.read().await.owner_of(token_id).cloned()
    }

    /// A card's current state.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] for an unminted token.
    pub async fn card(&self, token_id: TokenId) -> Result<Card> {
        self.registry.read().await.get(token_id).cloned()
    }

    /// A card with its active listing and effective asking price.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] for an unminted token.
    pub async fn card_view(&self, token_id: TokenId) -> Result<CardView> {
        let registry = self.registry.read().await;
        let listings = self.listings.read().await;
        let card = registry.get(token_id)?.clone();
        Ok(CardView::new(card, listings.get_active_listing(token_id).cloned()))
    }

    /// The card's active listing, if any
    pub async fn get_active_listing(&self, token_id: TokenId) -> Option<Listing> {
        self.listings.read().await.get_active_listing(token_id).cloned()
    }

    /// Active listings created by `seller`, in token order
    pub async fn listings_by_seller(&self, seller: &AccountId) -> Vec<Listing> {
        self.listings
            .read()
            .await
            .list_active_listings_by_seller(seller)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every active peer listing on the market, in token order.
    ///
    /// Unlike [`for_sale_cards`](Self::for_sale_cards) this leaves out
    /// cards only offered through the initial inventory.
    pub async fn all_active_listings(&self) -> Vec<Listing> {
        self.listings
            .read()
            .await
            .active_listings()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Alias of [`listings_by_seller`](Self::listings_by_seller)
    pub async fn active_listings(&self, account: &AccountId) -> Vec<Listing> {
        self.listings_by_seller(account).await
    }

    /// Sales `account` took part in, as buyer or seller, oldest first
    pub async fn history_for(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.ledger.read().await.history_for(account)
    }

    /// Alias of [`history_for`](Self::history_for)
    pub async fn sale_history(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.history_for(account).await
    }

    /// Sales where `account` was the buyer, oldest first
    pub async fn purchases_by(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.ledger.read().await.purchases_by(account)
    }

    /// Every sale of one card, oldest first
    pub async fn token_history(&self, token_id: TokenId) -> Vec<SaleRecord> {
        self.ledger.read().await.for_token(token_id)
    }

    /// Seller totals for `account`
    pub async fn stats_for(&self, account: &AccountId) -> SaleStats {
        self.ledger.read().await.stats_for(account)
    }

    /// Seller totals plus the number of listings `account` has open
    pub async fn trading_stats(&self, account: &AccountId) -> TradingStats {
        let listings = self.listings.read().await;
        let ledger = self.ledger.read().await;
        TradingStats::new(
            ledger.stats_for(account),
            listings.list_active_listings_by_seller(account).len(),
        )
    }

    /// Cards owned by `account`, in token order
    pub async fn owned_cards(&self, account: &AccountId) -> Vec<Card> {
        self.registry
            .read()
            .await
            .owned_by(account)
            .cloned()
            .collect()
    }

    /// Every minted card with its marketplace state, in token order
    pub async fn all_cards(&self) -> Vec<CardView> {
        let registry = self.registry.read().await;
        let listings = self.listings.read().await;
        registry
            .iter()
            .map(|card| CardView::new(card.clone(), listings.get_active_listing(card.id).cloned()))
            .collect()
    }

    /// Cards purchasable through either channel, in token order
    pub async fn for_sale_cards(&self) -> Vec<CardView> {
        let mut cards = self.all_cards().await;
        cards.retain(CardView::is_for_sale);
        cards
    }

    /// Number of minted cards
    pub async fn total_supply(&self) -> u64 {
        self.registry.read().await.total_supply()
    }

    /// Number of recorded sales across all accounts
    pub async fn sale_count(&self) -> usize {
        self.ledger.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use card_market_core::{PriceSource, SystemClock};
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;

    /// Minimal journal so the facade can be tested without the testing crate.
    #[derive(Default)]
    struct VecJournal {
        entries: StdMutex<Vec<SerializedEvent>>,
    }

    impl EventJournal for VecJournal {
        fn append(
            &self,
            events: Vec<SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<u64, JournalError>> + Send + '_>>
        {
            Box::pin(async move {
                let mut entries = self.entries.lock().unwrap();
                entries.extend(events);
                Ok(entries.len() as u64)
            })
        }

        fn load_all(
            &self,
        ) -> Pin<
            Box<dyn Future<Output = std::result::Result<Vec<SerializedEvent>, JournalError>> + Send + '_>,
        > {
            Box::pin(async move { Ok(self.entries.lock().unwrap().clone()) })
        }
    }

    fn market() -> Market {
        Market::new(
            MarketConfig::default().with_max_batch_mint(3),
            Arc::new(SystemClock),
            Arc::new(VecJournal::default()),
        )
    }

    fn draft(wei: u128) -> CardDraft {
        CardDraft::new(Price::from_wei(wei), "ipfs://card", "Keeper")
    }

    #[tokio::test]
    async fn batch_mint_is_bounded_and_consecutive() {
        let market = market();
        let inventory = AccountId::new("inventory");

        let error = market
            .mint_batch(inventory.clone(), vec![draft(1), draft(2), draft(3), draft(4)])
            .await
            .unwrap_err();
        assert_eq!(error, MarketError::BatchTooLarge { requested: 4, limit: 3 });
        assert_eq!(market.total_supply().await, 0);

        let cards = market
            .mint_batch(inventory.clone(), vec![draft(1), draft(2)])
            .await
            .unwrap();
        let ids: Vec<_> = cards.iter().map(|card| card.id.value()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn batch_mint_is_all_or_nothing() {
        let market = market();
        let result = market
            .mint_batch(AccountId::new("inventory"), vec![draft(1), draft(0)])
            .await;
        assert!(matches!(result, Err(MarketError::InvalidPrice { .. })));
        assert_eq!(market.total_supply().await, 0);
    }

    #[tokio::test]
    async fn generated_ids_stay_above_forced_ids() {
        let market = market();
        let inventory = AccountId::new("inventory");
        market
            .mint_with_id(TokenId::new(7), inventory.clone(), draft(5))
            .await
            .unwrap();

        assert_eq!(
            market
                .mint_with_id(TokenId::new(7), inventory.clone(), draft(5))
                .await
                .unwrap_err(),
            MarketError::AlreadyExists(TokenId::new(7))
        );
        let next = market.mint(inventory, draft(5)).await.unwrap();
        assert_eq!(next.id, TokenId::new(8));
        assert_eq!(market.total_supply().await, 2);
    }

    #[tokio::test]
    async fn minting_stops_cleanly_at_the_last_identifier() {
        let market = market();
        let inventory = AccountId::new("inventory");
        let last = TokenId::new(u64::MAX);
        market
            .mint_with_id(TokenId::new(u64::MAX - 2), inventory.clone(), draft(5))
            .await
            .unwrap();

        let cards = market
            .mint_batch(inventory.clone(), vec![draft(1), draft(2)])
            .await
            .unwrap();
        assert_eq!(cards.last().map(|card| card.id), Some(last));

        assert_eq!(
            market.mint(inventory.clone(), draft(5)).await,
            Err(MarketError::SupplyExhausted(last))
        );
        assert_eq!(
            market.mint_batch(inventory, vec![draft(5)]).await,
            Err(MarketError::SupplyExhausted(last))
        );
        assert_eq!(market.total_supply().await, 3);
    }

    #[tokio::test]
    async fn batch_crossing_the_last_identifier_mints_nothing() {
        let market = market();
        let inventory = AccountId::new("inventory");
        market
            .mint_with_id(TokenId::new(u64::MAX - 1), inventory.clone(), draft(5))
            .await
            .unwrap();

        let result = market
            .mint_batch(inventory, vec![draft(1), draft(2), draft(3)])
            .await;
        assert_eq!(result, Err(MarketError::SupplyExhausted(TokenId::new(u64::MAX))));
        assert_eq!(market.total_supply().await, 1);
    }

    #[tokio::test]
    async fn commands_on_unminted_tokens_leave_no_lock_slots() {
        let market = market();
        let buyer = AccountId::new("0xbuyer");
        for id in 1..=500 {
            let token = TokenId::new(id);
            assert_eq!(
                market.purchase_secondary(token, buyer.clone(), Price::from_wei(1)).await,
                Err(MarketError::NotFound(token))
            );
            assert!(market.list(token, buyer.clone(), Price::from_wei(1)).await.is_err());
            assert!(market.cancel(token, buyer.clone()).await.is_err());
        }
        assert!(market.token_locks.is_empty());

        let card = market.mint(AccountId::new("inventory"), draft(4)).await.unwrap();
        market
            .purchase_initial(card.id, buyer, Price::from_wei(4))
            .await
            .unwrap();
        assert!(market.token_locks.is_empty());
    }

    #[tokio::test]
    async fn card_view_prefers_the_listing_price() {
        let market = market();
        let owner = AccountId::new("inventory");
        let card = market.mint(owner.clone(), draft(10)).await.unwrap();

        let view = market.card_view(card.id).await.unwrap();
        assert_eq!(view.asking_price, Price::from_wei(10));
        assert_eq!(view.price_source, PriceSource::Inventory);

        market.list(card.id, owner, Price::from_wei(25)).await.unwrap();
        let view = market.card_view(card.id).await.unwrap();
        assert_eq!(view.asking_price, Price::from_wei(25));
        assert_eq!(view.price_source, PriceSource::Listing);
    }

    #[tokio::test]
    async fn subscribers_see_committed_events() {
        let market = market();
        let mut events = market.subscribe();
        let card = market.mint(AccountId::new("inventory"), draft(10)).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type(), "CardMinted.v1");
        assert_eq!(event.token_id(), card.id);
    }

    #[test]
    fn replay_rejects_impossible_history() {
        let mut registry = CardRegistry::new();
        let mut listings = ListingBook::new();
        let mut ledger = TransactionLedger::new();
        let listing = Listing::new(
            TokenId::new(1),
            AccountId::new("alice"),
            Price::from_wei(5),
            chrono::Utc::now(),
        );

        let result = apply_event(
            &mut registry,
            &mut listings,
            &mut ledger,
            &MarketEvent::CardListed { listing },
        );
        assert_eq!(result, Err(MarketError::NotFound(TokenId::new(1))));
    }
}
