//! # Card Market Core
//!
//! Core types for the collectible card marketplace ledger.
//!
//! This crate holds the vocabulary shared by the ledger runtime, its test
//! doubles, and any presentation layer sitting on top of it. It performs no
//! I/O of its own.
//!
//! ## Core Concepts
//!
//! - **Card**: A uniquely numbered collectible with exactly one owner
//! - **Listing**: An optional fixed-price secondary-market offer on a card
//! - **Sale Record**: An immutable entry in the trade history
//! - **Market Event**: A fact about an accepted command, persisted to the journal
//! - **Event Journal**: The storage collaborator that makes events durable
//! - **Clock**: Injected time source, so tests stay deterministic
//!
//! ## Example
//!
//! ```
//! use card_market_core::{AccountId, Price, TokenId};
//!
//! let token = TokenId::new(1);
//! let owner = AccountId::new("0xAbC");
//! let price = Price::parse_ether("0.06").unwrap_or(Price::ZERO);
//!
//! assert_eq!(owner.as_str(), "0xabc");
//! assert_eq!(price.to_string(), "0.06 ETH");
//! assert_eq!(token.to_string(), "#1");
//! ```

pub mod environment;
pub mod error;
pub mod event;
pub mod journal;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use environment::{Clock, SystemClock};
pub use error::{MarketError, Result};
pub use event::{EventError, MarketEvent, SerializedEvent};
pub use journal::{EventJournal, JournalError};
pub use types::{
    AccountId, Card, CardDraft, CardView, Listing, PriceSource, Price, PriceParseError,
    SaleKind, SaleRecord, SaleStats, TokenId, TradingStats,
};
