//! Market events and their journal encoding.
//!
//! Every accepted command produces one or more [`MarketEvent`]s. Events are
//! facts: once journaled they are never modified, and replaying them in order
//! rebuilds the ledger's tables.
//!
//! Events are serialized with `bincode`. The versioned `event_type` string is
//! stored alongside the bytes so a reader can route (or reject) payloads
//! without decoding them first.
//!
//! # Example
//!
//! ```
//! use card_market_core::event::{MarketEvent, SerializedEvent};
//! use card_market_core::types::{AccountId, TokenId};
//! use chrono::Utc;
//!
//! let event = MarketEvent::ListingCancelled {
//!     token_id: TokenId::new(3),
//!     seller: AccountId::new("alice"),
//!     cancelled_at: Utc::now(),
//! };
//!
//! let stored = SerializedEvent::from_event(&event).unwrap();
//! assert_eq!(stored.event_type, "ListingCancelled.v1");
//! assert_eq!(MarketEvent::from_serialized(&stored).unwrap(), event);
//! ```

use crate::types::{AccountId, Card, Listing, Price, SaleRecord, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Facts recorded by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// A card was minted into the primary inventory
    CardMinted {
        /// The new card
        card: Card,
    },

    /// The initial-inventory eligibility flag was changed administratively
    InitialSaleToggled {
        /// Card concerned
        token_id: TokenId,
        /// New flag value
        for_sale: bool,
        /// When the flag changed
        toggled_at: DateTime<Utc>,
    },

    /// The owner listed a card on the secondary market
    CardListed {
        /// The new listing
        listing: Listing,
    },

    /// The seller changed the asking price of an active listing
    ListingRepriced {
        /// Card concerned
        token_id: TokenId,
        /// Seller
        seller: AccountId,
        /// Price before the change
        old_price: Price,
        /// Price after the change
        new_price: Price,
        /// When the price changed
        repriced_at: DateTime<Utc>,
    },

    /// The seller withdrew an active listing
    ListingCancelled {
        /// Card concerned
        token_id: TokenId,
        /// Seller
        seller: AccountId,
        /// When the listing was withdrawn
        cancelled_at: DateTime<Utc>,
    },

    /// A card changed hands through either sale channel
    CardSold {
        /// The sale
        record: SaleRecord,
    },
}

impl MarketEvent {
    /// Returns the versioned event type identifier
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::CardMinted { .. } => "CardMinted.v1",
            Self::InitialSaleToggled { .. } => "InitialSaleToggled.v1",
            Self::CardListed { .. } => "CardListed.v1",
            Self::ListingRepriced { .. } => "ListingRepriced.v1",
            Self::ListingCancelled { .. } => "ListingCancelled.v1",
            Self::CardSold { .. } => "CardSold.v1",
        }
    }

    /// Returns the card this event concerns
    #[must_use]
    pub const fn token_id(&self) -> TokenId {
        match self {
            Self::CardMinted { card } => card.id,
            Self::CardListed { listing } => listing.token_id,
            Self::CardSold { record } => record.token_id,
            Self::InitialSaleToggled { token_id, .. }
            | Self::ListingRepriced { token_id, .. }
            | Self::ListingCancelled { token_id, .. } => *token_id,
        }
    }

    const KNOWN_TYPES: [&'static str; 6] = [
        "CardMinted.v1",
        "InitialSaleToggled.v1",
        "CardListed.v1",
        "ListingRepriced.v1",
        "ListingCancelled.v1",
        "CardSold.v1",
    ];

    /// Decode a journaled event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] for an unrecognised type name,
    /// and [`EventError::DeserializationError`] if the bytes do not decode or
    /// decode to a different event type than the one recorded.
    pub fn from_serialized(stored: &SerializedEvent) -> Result<Self, EventError> {
        if !Self::KNOWN_TYPES.contains(&stored.event_type.as_str()) {
            return Err(EventError::UnknownEventType(stored.event_type.clone()));
        }
        let event: Self = bincode::deserialize(&stored.data)
            .map_err(|e| EventError::DeserializationError(e.to_string()))?;
        if event.event_type() != stored.event_type {
            return Err(EventError::DeserializationError(format!(
                "payload decodes to {}, recorded as {}",
                event.event_type(),
                stored.event_type
            )));
        }
        Ok(event)
    }
}

/// A serialized event ready for storage.
///
/// The wire format between the ledger and its journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "CardSold.v1").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, data: Vec<u8>) -> Self {
        Self { event_type, data }
    }

    /// Serialize a market event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event(event: &MarketEvent) -> Result<Self, EventError> {
        let data =
            bincode::serialize(event).map_err(|e| EventError::SerializationError(e.to_string()))?;
        Ok(Self {
            event_type: event.event_type().to_string(),
            data,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}
