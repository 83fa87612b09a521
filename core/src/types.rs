//! Domain types for the card marketplace.
//!
//! - Cards: unique, numbered collectibles with a single owner
//! - Listings: fixed-price secondary-market offers attached to a card
//! - Sale records: the immutable trade history shared by both sale channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier of a minted card.
///
/// Identifiers are positive and assigned in strictly increasing order by the
/// registry. They are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(u64);

impl TokenId {
    /// Creates a `TokenId` from its numeric value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the identifier that follows this one, or `None` at `u64::MAX`
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Account identifier (a wallet address or any other opaque account handle).
///
/// Identifiers are compared case-insensitively: construction trims
/// surrounding whitespace and lowercases the value, so `0xAbC` and `0xabc`
/// name the same account.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Creates a normalized `AccountId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_lowercase())
    }

    /// Returns the normalized identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether the identifier is blank
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Price
// ============================================================================

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

/// Errors produced when parsing an ether-denominated amount.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceParseError {
    /// The input was empty
    #[error("price is empty")]
    Empty,

    /// The input was negative
    #[error("price cannot be negative: {0}")]
    Negative(String),

    /// The input contained something other than digits and one decimal point
    #[error("price is not a decimal number: {0}")]
    Malformed(String),

    /// More than 18 fractional digits
    #[error("price has more than 18 decimal places: {0}")]
    TooPrecise(String),

    /// The amount does not fit in 128 bits of wei
    #[error("price is too large: {0}")]
    Overflow(String),
}

/// An amount of currency in wei (10^-18 ether).
///
/// Integer arithmetic avoids the rounding problems of floating point prices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u128);

impl Price {
    /// The zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Price` from wei
    #[must_use]
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Returns the amount in wei
    #[must_use]
    pub const fn wei(&self) -> u128 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the maximum representable value
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Parses a decimal ether amount such as `"0.06"` or `"12"`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceParseError`] if the input is empty, negative, not a plain
    /// decimal number, has more than 18 fractional digits, or overflows.
    pub fn parse_ether(input: &str) -> Result<Self, PriceParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PriceParseError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(PriceParseError::Negative(trimmed.to_string()));
        }

        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
            return Err(PriceParseError::Malformed(trimmed.to_string()));
        }
        if fraction.len() > ETHER_DECIMALS {
            return Err(PriceParseError::TooPrecise(trimmed.to_string()));
        }

        let overflow = || PriceParseError::Overflow(trimmed.to_string());
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(WEI_PER_ETHER)
                .ok_or_else(overflow)?
        };
        let fraction_wei = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = ETHER_DECIMALS);
            padded.parse::<u128>().map_err(|_| overflow())?
        };

        whole_wei
            .checked_add(fraction_wei)
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / WEI_PER_ETHER;
        let fraction = self.0 % WEI_PER_ETHER;
        if fraction == 0 {
            return write!(f, "{whole} ETH");
        }
        let digits = format!("{fraction:0>width$}", width = ETHER_DECIMALS);
        write!(f, "{whole}.{} ETH", digits.trim_end_matches('0'))
    }
}

impl std::str::FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ether(s)
    }
}

// ============================================================================
// Cards
// ============================================================================

/// Input for minting a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDraft {
    /// Fixed price charged by the initial-inventory channel
    pub base_price: Price,
    /// Reference to the externally hosted metadata document
    pub metadata_uri: String,
    /// Human readable name, denormalized onto sale records
    pub display_name: String,
}

impl CardDraft {
    /// Creates a new `CardDraft`
    #[must_use]
    pub fn new(
        base_price: Price,
        metadata_uri: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            base_price,
            metadata_uri: metadata_uri.into(),
            display_name: display_name.into(),
        }
    }
}

/// A minted collectible card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card identifier
    pub id: TokenId,
    /// Current owner (never empty once minted)
    pub owner: AccountId,
    /// Eligible for purchase through the initial-inventory channel
    pub for_sale: bool,
    /// Price charged by the initial-inventory channel
    pub base_price: Price,
    /// Opaque metadata reference, not interpreted by the ledger
    pub metadata_uri: String,
    /// Display name
    pub display_name: String,
    /// When the card was minted
    pub minted_at: DateTime<Utc>,
}

impl Card {
    /// Creates a freshly minted card, eligible for its initial sale
    #[must_use]
    pub fn mint(id: TokenId, owner: AccountId, draft: CardDraft, minted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            for_sale: true,
            base_price: draft.base_price,
            metadata_uri: draft.metadata_uri,
            display_name: draft.display_name,
            minted_at,
        }
    }

    /// Checks whether `account` owns this card
    #[must_use]
    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        self.owner == *account
    }
}

// ============================================================================
// Listings
// ============================================================================

/// A fixed-price secondary-market listing.
///
/// Inactive listings are kept for audit; they never show up in active
/// listing queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Listed card
    pub token_id: TokenId,
    /// Seller (the card owner when the listing was created)
    pub seller: AccountId,
    /// Asking price (strictly positive)
    pub price: Price,
    /// When the listing was created (repricing does not change it)
    pub listed_at: DateTime<Utc>,
    /// Whether the listing can still be bought
    pub active: bool,
}

impl Listing {
    /// Creates a new active listing
    #[must_use]
    pub const fn new(
        token_id: TokenId,
        seller: AccountId,
        price: Price,
        listed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            seller,
            price,
            listed_at,
            active: true,
        }
    }
}

// ============================================================================
// Sale records
// ============================================================================

/// Which channel a sale went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleKind {
    /// First sale out of the fixed-price primary inventory
    Initial,
    /// Purchase of a peer listing
    Secondary,
}

impl SaleKind {
    /// Returns a stable lowercase label (used for metrics and logs)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for SaleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of a completed sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Position in the ledger (auto-increment, starting at 1)
    pub sequence: u64,
    /// Card that changed hands
    pub token_id: TokenId,
    /// Previous owner
    pub seller: AccountId,
    /// New owner
    pub buyer: AccountId,
    /// Amount paid
    pub price: Price,
    /// When the sale completed
    pub sold_at: DateTime<Utc>,
    /// Sale channel
    pub kind: SaleKind,
    /// Card display name at the time of sale
    pub display_name: String,
}

impl SaleRecord {
    /// Checks whether `account` took part in this sale
    #[must_use]
    pub fn involves(&self, account: &AccountId) -> bool {
        self.seller == *account || self.buyer == *account
    }
}

/// Aggregate figures over the sales an account made as seller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleStats {
    /// Number of sales
    pub total_sales: u64,
    /// Sum of sale prices
    pub total_revenue: Price,
    /// `total_revenue / total_sales`, zero when there were no sales
    pub average_sale_price: Price,
}

/// Trading overview for one account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingStats {
    /// Number of cards sold
    pub total_sales: u64,
    /// Revenue from all sales
    pub total_revenue: Price,
    /// Average sale price
    pub average_sale_price: Price,
    /// Listings currently active for this seller
    pub active_listings: usize,
}

impl TradingStats {
    /// Combines seller statistics with the current listing count
    #[must_use]
    pub const fn new(sales: SaleStats, active_listings: usize) -> Self {
        Self {
            total_sales: sales.total_sales,
            total_revenue: sales.total_revenue,
            average_sale_price: sales.average_sale_price,
            active_listings,
        }
    }
}

// ============================================================================
// Views
// ============================================================================

/// Where a card's effective asking price comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    /// An active peer listing
    Listing,
    /// The card's base price in the primary inventory
    Inventory,
}

/// A card together with its marketplace state, for presentation layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    /// The card
    pub card: Card,
    /// Active listing, if any
    pub listing: Option<Listing>,
    /// Listing price when listed, base price otherwise
    pub asking_price: Price,
    /// Origin of `asking_price`
    pub price_source: PriceSource,
}

impl CardView {
    /// Builds a view, ignoring `listing` unless it is active
    #[must_use]
    pub fn new(card: Card, listing: Option<Listing>) -> Self {
        let listing = listing.filter(|l| l.active);
        let (asking_price, price_source) = match &listing {
            Some(l) => (l.price, PriceSource::Listing),
            None => (card.base_price, PriceSource::Inventory),
        };
        Self {
            card,
            listing,
            asking_price,
            price_source,
        }
    }

    /// Purchasable through either channel
    #[must_use]
    pub const fn is_for_sale(&self) -> bool {
        self.card.for_sale || self.listing.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_ether_amounts() {
        assert_eq!(Price::parse_ether("0.06").unwrap().wei(), 60_000_000_000_000_000);
        assert_eq!(Price::parse_ether("1").unwrap().wei(), WEI_PER_ETHER);
        assert_eq!(Price::parse_ether(" 2.5 ").unwrap().wei(), 2_500_000_000_000_000_000);
        assert_eq!(Price::parse_ether(".5").unwrap().wei(), 500_000_000_000_000_000);
        assert_eq!(Price::parse_ether("0").unwrap(), Price::ZERO);
    }

    #[test]
    fn rejects_bad_ether_amounts() {
        assert_eq!(Price::parse_ether(""), Err(PriceParseError::Empty));
        assert!(matches!(Price::parse_ether("-0.1"), Err(PriceParseError::Negative(_))));
        assert!(matches!(Price::parse_ether("1.2.3"), Err(PriceParseError::Malformed(_))));
        assert!(matches!(Price::parse_ether("."), Err(PriceParseError::Malformed(_))));
        assert!(matches!(Price::parse_ether("abc"), Err(PriceParseError::Malformed(_))));
        assert!(matches!(
            Price::parse_ether("0.0000000000000000001"),
            Err(PriceParseError::TooPrecise(_))
        ));
        assert!(matches!(
            Price::parse_ether("999999999999999999999999999999"),
            Err(PriceParseError::Overflow(_))
        ));
    }

    #[test]
    fn displays_prices_as_ether() {
        assert_eq!(Price::parse_ether("0.06").unwrap().to_string(), "0.06 ETH");
        assert_eq!(Price::parse_ether("3").unwrap().to_string(), "3 ETH");
        assert_eq!(Price::from_wei(1).to_string(), "0.000000000000000001 ETH");
        assert_eq!(Price::ZERO.to_string(), "0 ETH");
    }

    #[test]
    fn token_ids_stop_at_the_last_value() {
        assert_eq!(TokenId::new(41).next(), Some(TokenId::new(42)));
        assert_eq!(TokenId::new(u64::MAX).next(), None);
    }

    #[test]
    fn account_ids_are_case_insensitive() {
        assert_eq!(AccountId::new(" 0xABCdef "), AccountId::new("0xabcdef"));
        assert!(AccountId::new("   ").is_empty());
    }

    #[test]
    fn card_view_prefers_active_listing_price() {
        let now = Utc::now();
        let card = Card::mint(
            TokenId::new(1),
            AccountId::new("alice"),
            CardDraft::new(Price::from_wei(60), "ipfs://card-1", "Striker"),
            now,
        );

        let unlisted = CardView::new(card.clone(), None);
        assert_eq!(unlisted.asking_price, Price::from_wei(60));
        assert_eq!(unlisted.price_source, PriceSource::Inventory);

        let listing = Listing::new(card.id, card.owner.clone(), Price::from_wei(100), now);
        let listed = CardView::new(card.clone(), Some(listing.clone()));
        assert_eq!(listed.asking_price, Price::from_wei(100));
        assert_eq!(listed.price_source, PriceSource::Listing);

        let mut cancelled = listing;
        cancelled.active = false;
        let view = CardView::new(card, Some(cancelled));
        assert!(view.listing.is_none());
        assert_eq!(view.price_source, PriceSource::Inventory);
    }
}
