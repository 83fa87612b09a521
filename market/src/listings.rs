//! Listing manager: secondary-market offers on cards.
//!
//! Each token keeps its full listing history. Only the most recent entry can
//! be active, which makes "at most one active listing per token" structural
//! rather than something to check. Cancelled and sold listings stay in the
//! history for audit and are excluded from every active-listing query.

use crate::registry::CardRegistry;
use card_market_core::{AccountId, Listing, MarketError, Price, Result, TokenId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Listing table, keyed by token identifier.
#[derive(Clone, Debug, Default)]
pub struct ListingBook {
    listings: HashMap<TokenId, Vec<Listing>>,
}

impl ListingBook {
    /// Creates an empty listing book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `seller` may list `token_id` at `price`.
    ///
    /// Ownership is read from `registry`, never from the listing book.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the token was never minted
    /// - [`MarketError::NotOwner`] if `seller` does not own the card
    /// - [`MarketError::InvalidPrice`] if `price` is zero
    /// - [`MarketError::AlreadyListed`] if an active listing exists
    pub fn validate_listing(
        &self,
        registry: &CardRegistry,
        token_id: TokenId,
        seller: &AccountId,
        price: Price,
    ) -> Result<()> {
        if registry.owner_of(token_id)? != seller {
            return Err(MarketError::NotOwner {
                token_id,
                account: seller.clone(),
            });
        }
        if price.is_zero() {
            return Err(MarketError::InvalidPrice { token_id, price });
        }
        if self.get_active_listing(token_id).is_some() {
            return Err(MarketError::AlreadyListed(token_id));
        }
        Ok(())
    }

    /// Lists a card for sale.
    ///
    /// # Errors
    ///
    /// See [`validate_listing`](Self::validate_listing).
    pub fn create_listing(
        &mut self,
        registry: &CardRegistry,
        token_id: TokenId,
        seller: AccountId,
        price: Price,
        listed_at: DateTime<Utc>,
    ) -> Result<Listing> {
        self.validate_listing(registry, token_id, &seller, price)?;
        let listing = Listing::new(token_id, seller, price, listed_at);
        self.insert(listing.clone());
        Ok(listing)
    }

    /// Stores a validated listing as the token's current entry
    pub(crate) fn insert(&mut self, listing: Listing) {
        self.listings.entry(listing.token_id).or_default().push(listing);
    }

    /// Returns the active listing that `requester` controls.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if nothing is listed
    /// - [`MarketError::NotSeller`] if `requester` is not the seller
    pub fn seller_listing(&self, token_id: TokenId, requester: &AccountId) -> Result<&Listing> {
        let listing = self
            .get_active_listing(token_id)
            .ok_or(MarketError::NoActiveListing(token_id))?;
        if listing.seller != *requester {
            return Err(MarketError::NotSeller {
                token_id,
                account: requester.clone(),
            });
        }
        Ok(listing)
    }

    /// Checks that `requester` may reprice the listing to `new_price`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if nothing is listed
    /// - [`MarketError::NotSeller`] if `requester` is not the seller
    /// - [`MarketError::InvalidPrice`] if `new_price` is zero
    pub fn validate_update_price(
        &self,
        token_id: TokenId,
        requester: &AccountId,
        new_price: Price,
    ) -> Result<&Listing> {
        let listing = self.seller_listing(token_id, requester)?;
        if new_price.is_zero() {
            return Err(MarketError::InvalidPrice {
                token_id,
                price: new_price,
            });
        }
        Ok(listing)
    }

    /// Changes the asking price. The creation timestamp is kept.
    ///
    /// # Errors
    ///
    /// See [`validate_update_price`](Self::validate_update_price).
    pub fn update_price(
        &mut self,
        token_id: TokenId,
        requester: &AccountId,
        new_price: Price,
    ) -> Result<Listing> {
        self.validate_update_price(token_id, requester, new_price)?;
        self.reprice(token_id, new_price)
    }

    /// Applies a validated price change
    pub(crate) fn reprice(&mut self, token_id: TokenId, new_price: Price) -> Result<Listing> {
        let listing = self
            .active_mut(token_id)
            .ok_or(MarketError::NoActiveListing(token_id))?;
        listing.price = new_price;
        Ok(listing.clone())
    }

    /// Withdraws a listing. The record is kept, inactive.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NoActiveListing`] if nothing is listed
    /// - [`MarketError::NotSeller`] if `requester` is not the seller
    pub fn cancel(&mut self, token_id: TokenId, requester: &AccountId) -> Result<Listing> {
        self.seller_listing(token_id, requester)?;
        self.deactivate(token_id)
            .ok_or(MarketError::NoActiveListing(token_id))
    }

    /// Deactivates the token's active listing, returning it if there was one
    pub(crate) fn deactivate(&mut self, token_id: TokenId) -> Option<Listing> {
        let listing = self.active_mut(token_id)?;
        listing.active = false;
        Some(listing.clone())
    }

    fn active_mut(&mut self, token_id: TokenId) -> Option<&mut Listing> {
        self.listings
            .get_mut(&token_id)?
            .last_mut()
            .filter(|listing| listing.active)
    }

    /// The token's active listing, if any
    #[must_use]
    pub fn get_active_listing(&self, token_id: TokenId) -> Option<&Listing> {
        self.listings
            .get(&token_id)?
            .last()
            .filter(|listing| listing.active)
    }

    /// Every active listing in the book, in token order
    #[must_use]
    pub fn active_listings(&self) -> Vec<&Listing> {
        let mut active: Vec<&Listing> = self
            .listings
            .keys()
            .filter_map(|token_id| self.get_active_listing(*token_id))
            .collect();
        active.sort_by_key(|listing| listing.token_id);
        active
    }

    /// Active listings created by `seller`, in token order
    #[must_use]
    pub fn list_active_listings_by_seller(&self, seller: &AccountId) -> Vec<&Listing> {
        let mut active = self.active_listings();
        active.retain(|listing| listing.seller == *seller);
        active
    }

    /// Every listing ever created for the token, oldest first
    #[must_use]
    pub fn history(&self, token_id: TokenId) -> &[Listing] {
        self.listings.get(&token_id).map_or(&[], Vec::as_slice)
    }

    /// Number of active listings across all tokens
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.listings
            .values()
            .filter(|entries| entries.last().is_some_and(|listing| listing.active))
            .count()
    }
}
