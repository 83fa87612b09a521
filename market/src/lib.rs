//! # Card Market
//!
//! Ownership and marketplace ledger for unique collectible cards.
//!
//! The ledger guarantees, under concurrent access, that every card has exactly
//! one owner, that a listing is sold at most once, that only the owner can list
//! or reprice a card, and that every sale is durably recorded.
//!
//! ## Components
//!
//! - [`CardRegistry`]: card identity and ownership
//! - [`ListingBook`]: secondary-market listings
//! - [`SaleChannel`]: the initial-inventory and peer sale paths
//! - [`TransactionLedger`]: append-only sale history
//! - [`Market`]: the facade that composes them into atomic commands
//!
//! The component tables are plain synchronous data structures. [`Market`]
//! adds per-token serialization, the journal, logging, and metrics.
//!
//! ## Example
//!
//! ```
//! use card_market::{Market, MarketConfig};
//! use card_market_core::{AccountId, CardDraft, Price, SystemClock};
//! use card_market_testing::InMemoryJournal;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let market = Market::new(
//!     MarketConfig::default(),
//!     Arc::new(SystemClock),
//!     Arc::new(InMemoryJournal::new()),
//! );
//!
//! let price = Price::parse_ether("0.06").unwrap_or(Price::ZERO);
//! let draft = CardDraft::new(price, "ipfs://cards/1.json", "Goalkeeper");
//! let card = market.mint(AccountId::new("inventory"), draft).await?;
//!
//! let buyer = AccountId::new("0xbuyer");
//! market.purchase_initial(card.id, buyer.clone(), price).await?;
//! assert_eq!(market.owner_of(card.id).await?, buyer);
//! # Ok::<(), card_market_core::MarketError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod facade;
pub mod file_journal;
pub mod ledger;
pub mod listings;
pub mod locks;
pub mod registry;
pub mod sale;
pub mod telemetry;

pub use config::MarketConfig;
pub use facade::Market;
pub use file_journal::FileJournal;
pub use ledger::TransactionLedger;
pub use listings::ListingBook;
pub use locks::{TokenGuard, TokenLocks};
pub use registry::CardRegistry;
pub use sale::{SaleChannel, SaleRequest, settle};
pub use telemetry::describe_metrics;
