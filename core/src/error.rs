//! Error taxonomy for marketplace commands.
//!
//! Every variant except [`MarketError::Storage`] is a recoverable,
//! caller-facing rejection: the command had no effect and the caller decides
//! whether to retry or display it. `Storage` means the journal could not be
//! read or durably written and must never be swallowed.

use crate::journal::JournalError;
use crate::types::{AccountId, Price, TokenId};
use thiserror::Error;

/// Result alias used throughout the ledger
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors returned by marketplace commands and queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// The token was never minted
    #[error("card {0} has not been minted")]
    NotFound(TokenId),

    /// A forced identifier collides with an existing card
    #[error("card {0} already exists")]
    AlreadyExists(TokenId),

    /// The account does not own the card
    #[error("{account} does not own card {token_id}")]
    NotOwner {
        /// Card concerned
        token_id: TokenId,
        /// Account that claimed ownership
        account: AccountId,
    },

    /// The account is not the seller on the card's active listing
    #[error("{account} is not the seller of card {token_id}")]
    NotSeller {
        /// Card concerned
        token_id: TokenId,
        /// Account that claimed to be the seller
        account: AccountId,
    },

    /// The initial-inventory channel has no offer for this card
    #[error("card {0} is not for sale in the initial inventory")]
    NotForSale(TokenId),

    /// The card has no active listing
    #[error("card {0} has no active listing")]
    NoActiveListing(TokenId),

    /// The card already has an active listing
    #[error("card {0} is already listed")]
    AlreadyListed(TokenId),

    /// Prices must be strictly positive
    #[error("invalid price {price} for card {token_id}")]
    InvalidPrice {
        /// Card concerned
        token_id: TokenId,
        /// Rejected price
        price: Price,
    },

    /// The amount paid differs from the amount required
    #[error("card {token_id} costs {expected}, but {paid} was paid")]
    PriceMismatch {
        /// Card concerned
        token_id: TokenId,
        /// Required amount
        expected: Price,
        /// Offered amount
        paid: Price,
    },

    /// A seller tried to buy their own listing
    #[error("{account} cannot buy their own listing of card {token_id}")]
    SelfPurchase {
        /// Card concerned
        token_id: TokenId,
        /// Buyer and seller
        account: AccountId,
    },

    /// A sale record failed validation
    #[error("invalid sale record for card {token_id}: {reason}")]
    InvalidRecord {
        /// Card concerned
        token_id: TokenId,
        /// What was wrong with it
        reason: String,
    },

    /// Token identifiers start at 1
    #[error("token identifier {0} is reserved")]
    InvalidTokenId(TokenId),

    /// A batch mint asked for more cards than allowed
    #[error("batch of {requested} cards exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Cards requested
        requested: usize,
        /// Configured maximum
        limit: usize,
    },

    /// An account identifier was blank
    #[error("account identifier cannot be empty")]
    InvalidAccount,

    /// Every identifier above the highest minted card is taken
    #[error("no token identifier follows {0}")]
    SupplyExhausted(TokenId),

    /// The journal could not be read or durably written
    #[error("storage unavailable: {0}")]
    Storage(#[from] JournalError),
}

impl MarketError {
    /// Returns the token the failure refers to, if any
    #[must_use]
    pub const fn token_id(&self) -> Option<TokenId> {
        match self {
            Self::NotFound(id)
            | Self::AlreadyExists(id)
            | Self::InvalidTokenId(id)
            | Self::NotForSale(id)
            | Self::NoActiveListing(id)
            | Self::AlreadyListed(id)
            | Self::NotOwner { token_id: id, .. }
            | Self::NotSeller { token_id: id, .. }
            | Self::InvalidPrice { token_id: id, .. }
            | Self::PriceMismatch { token_id: id, .. }
            | Self::SelfPurchase { token_id: id, .. }
            | Self::InvalidRecord { token_id: id, .. }
            | Self::SupplyExhausted(id) => Some(*id),
            Self::BatchTooLarge { .. } | Self::InvalidAccount | Self::Storage(_) => None,
        }
    }

    /// Returns a stable name for the error kind (used for metrics and logs)
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotOwner { .. } => "not_owner",
            Self::NotSeller { .. } => "not_seller",
            Self::NotForSale(_) => "not_for_sale",
            Self::NoActiveListing(_) => "no_active_listing",
            Self::AlreadyListed(_) => "already_listed",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::PriceMismatch { .. } => "price_mismatch",
            Self::SelfPurchase { .. } => "self_purchase",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::InvalidTokenId(_) => "invalid_token_id",
            Self::BatchTooLarge { .. } => "batch_too_large",
            Self::InvalidAccount => "invalid_account",
            Self::SupplyExhausted(_) => "supply_exhausted",
            Self::Storage(_) => "storage",
        }
    }

    /// Storage failures are the only fatal-class condition
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_carry_the_offending_token() {
        let error = MarketError::PriceMismatch {
            token_id: TokenId::new(7),
            expected: Price::from_wei(10),
            paid: Price::from_wei(9),
        };
        assert_eq!(error.token_id(), Some(TokenId::new(7)));
        assert_eq!(error.kind(), "price_mismatch");
        assert!(!error.is_fatal());
    }

    #[test]
    fn storage_errors_are_fatal() {
        let error = MarketError::from(JournalError::Unavailable("disk detached".to_string()));
        assert!(error.is_fatal());
        assert_eq!(error.token_id(), None);
        assert!(error.to_string().contains("disk detached"));
    }
}
