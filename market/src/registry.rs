//! Card registry: identity and ownership of every minted card.
//!
//! The registry is the ground truth for "who owns card N". Everything else
//! in the ledger reads ownership through it, and only the sale channels may
//! change it (via [`CardRegistry::transfer_ownership`], which is crate-private).

use crate::listings::ListingBook;
use card_market_core::{AccountId, Card, CardDraft, MarketError, Result, TokenId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Table of minted cards, keyed by token identifier.
#[derive(Clone, Debug, Default)]
pub struct CardRegistry {
    cards: BTreeMap<TokenId, Card>,
}

impl CardRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The identifier the next generated mint will receive.
    ///
    /// Always strictly greater than every identifier minted so far,
    /// including identifiers forced through [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::SupplyExhausted`] once `u64::MAX` is minted.
    pub fn next_token_id(&self) -> Result<TokenId> {
        match self.highest_token_id() {
            None => Ok(TokenId::new(1)),
            Some(highest) => highest.next().ok_or(MarketError::SupplyExhausted(highest)),
        }
    }

    /// Highest minted identifier, if any card exists
    #[must_use]
    pub fn highest_token_id(&self) -> Option<TokenId> {
        self.cards.keys().next_back().copied()
    }

    /// Validates mint input and builds the card without storing it.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidAccount`] if `owner` is blank
    /// - [`MarketError::InvalidTokenId`] for identifier 0
    /// - [`MarketError::AlreadyExists`] if `id` is taken
    /// - [`MarketError::InvalidPrice`] if the base price is zero
    pub fn prepare_mint(
        &self,
        id: TokenId,
        owner: AccountId,
        draft: CardDraft,
        minted_at: DateTime<Utc>,
    ) -> Result<Card> {
        if owner.is_empty() {
            return Err(MarketError::InvalidAccount);
        }
        if id.value() == 0 {
            return Err(MarketError::InvalidTokenId(id));
        }
        if self.cards.contains_key(&id) {
            return Err(MarketError::AlreadyExists(id));
        }
        if draft.base_price.is_zero() {
            return Err(MarketError::InvalidPrice {
                token_id: id,
                price: draft.base_price,
            });
        }
        Ok(Card::mint(id, owner, draft, minted_at))
    }

    /// Mints a card under a fresh identifier, eligible for its initial sale.
    ///
    /// # Errors
    ///
    /// See [`prepare_mint`](Self::prepare_mint).
    pub fn mint(
        &mut self,
        owner: AccountId,
        draft: CardDraft,
        minted_at: DateTime<Utc>,
    ) -> Result<TokenId> {
        let card = self.prepare_mint(self.next_token_id()?, owner, draft, minted_at)?;
        let id = card.id;
        self.insert(card)?;
        Ok(id)
    }

    /// Stores a prepared card.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::AlreadyExists`] if the identifier is taken.
    pub fn insert(&mut self, card: Card) -> Result<()> {
        if self.cards.contains_key(&card.id) {
            return Err(MarketError::AlreadyExists(card.id));
        }
        self.cards.insert(card.id, card);
        Ok(())
    }

    /// Looks up a card.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] if the token was never minted.
    pub fn get(&self, id: TokenId) -> Result<&Card> {
        self.cards.get(&id).ok_or(MarketError::NotFound(id))
    }

    /// Current owner of a card.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] if the token was never minted.
    pub fn owner_of(&self, id: TokenId) -> Result<&AccountId> {
        self.get(id).map(|card| &card.owner)
    }

    /// Moves a card from `from` to `to` and retires any listing on it.
    ///
    /// Ownership and listing state change together: the caller holds both
    /// tables mutably, so no reader can see the new owner alongside the old
    /// owner's listing. The initial-inventory flag is cleared as well, since
    /// the inventory no longer holds the card.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotFound`] if the token was never minted
    /// - [`MarketError::NotOwner`] if `from` is not the current owner
    pub(crate) fn transfer_ownership(
        &mut self,
        id: TokenId,
        from: &AccountId,
        to: &AccountId,
        listings: &mut ListingBook,
    ) -> Result<()> {
        let card = self.cards.get_mut(&id).ok_or(MarketError::NotFound(id))?;
        if !card.is_owned_by(from) {
            return Err(MarketError::NotOwner {
                token_id: id,
                account: from.clone(),
            });
        }

        card.owner = to.clone();
        card.for_sale = false;
        if let Some(retired) = listings.deactivate(id) {
            tracing::debug!(
                token = %id,
                seller = %retired.seller,
                "listing retired by ownership transfer"
            );
        }
        Ok(())
    }

    /// Sets the initial-inventory eligibility flag.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::NotFound`] if the token was never minted.
    pub fn set_for_sale(&mut self, id: TokenId, for_sale: bool) -> Result<()> {
        let card = self.cards.get_mut(&id).ok_or(MarketError::NotFound(id))?;
        card.for_sale = for_sale;
        Ok(())
    }

    /// Number of minted cards
    #[must_use]
    pub fn total_supply(&self) -> u64 {
        self.cards.len() as u64
    }

    /// Checks if nothing has been minted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Every card in identifier order.
    ///
    /// Equivalent to probing `1..=highest_token_id()` and skipping
    /// identifiers that were never minted.
    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    /// Cards owned by `account`, in identifier order
    pub fn owned_by<'a>(&'a self, account: &'a AccountId) -> impl Iterator<Item = &'a Card> + 'a {
        self.cards.values().filter(move |card| card.is_owned_by(account))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use card_market_core::{Listing, Price};

    fn draft(name: &str) -> CardDraft {
        CardDraft::new(Price::from_wei(60), format!("ipfs://{name}"), name)
    }

    fn inventory() -> AccountId {
        AccountId::new("inventory")
    }

    #[test]
    fn mint_assigns_strictly_increasing_ids() {
        let mut registry = CardRegistry::new();
        let now = Utc::now();

        let first = registry.mint(inventory(), draft("a"), now).unwrap();
        let second = registry.mint(inventory(), draft("b"), now).unwrap();

        assert_eq!(first, TokenId::new(1));
        assert_eq!(second, TokenId::new(2));
        assert!(registry.get(first).unwrap().for_sale);
        assert_eq!(registry.total_supply(), 2);
    }

    #[test]
    fn forced_ids_collide_and_push_the_generator_forward() {
        let mut registry = CardRegistry::new();
        let now = Utc::now();
        let forced = registry
            .prepare_mint(TokenId::new(10), inventory(), draft("x"), now)
            .unwrap();
        registry.insert(forced).unwrap();

        assert_eq!(
            registry.prepare_mint(TokenId::new(10), inventory(), draft("y"), now),
            Err(MarketError::AlreadyExists(TokenId::new(10)))
        );
        assert_eq!(registry.mint(inventory(), draft("z"), now).unwrap(), TokenId::new(11));

        let ids: Vec<_> = registry.iter().map(|card| card.id.value()).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn generator_stops_after_the_last_identifier() {
        let mut registry = CardRegistry::new();
        let now = Utc::now();
        let last = TokenId::new(u64::MAX);
        let card = registry.prepare_mint(last, inventory(), draft("last"), now).unwrap();
        registry.insert(card).unwrap();

        assert_eq!(registry.next_token_id(), Err(MarketError::SupplyExhausted(last)));
        assert_eq!(
            registry.mint(inventory(), draft("after"), now),
            Err(MarketError::SupplyExhausted(last))
        );
        assert_eq!(registry.total_supply(), 1);
    }

    #[test]
    fn mint_rejects_blank_owner_zero_id_and_free_cards() {
        let registry = CardRegistry::new();
        let now = Utc::now();

        assert_eq!(
            registry.prepare_mint(TokenId::new(1), AccountId::new(" "), draft("a"), now),
            Err(MarketError::InvalidAccount)
        );
        assert_eq!(
            registry.prepare_mint(TokenId::new(0), inventory(), draft("a"), now),
            Err(MarketError::InvalidTokenId(TokenId::new(0)))
        );
        let free = CardDraft::new(Price::ZERO, "ipfs://free", "Free");
        assert!(matches!(
            registry.prepare_mint(TokenId::new(1), inventory(), free, now),
            Err(MarketError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn owner_of_unminted_token_is_not_found() {
        let registry = CardRegistry::new();
        assert_eq!(
            registry.owner_of(TokenId::new(3)),
            Err(MarketError::NotFound(TokenId::new(3)))
        );
    }

    #[test]
    fn transfer_checks_the_current_owner() {
        let mut registry = CardRegistry::new();
        let mut listings = ListingBook::new();
        let id = registry.mint(inventory(), draft("a"), Utc::now()).unwrap();

        let result = registry.transfer_ownership(
            id,
            &AccountId::new("mallory"),
            &AccountId::new("bob"),
            &mut listings,
        );
        assert!(matches!(result, Err(MarketError::NotOwner { .. })));
        assert_eq!(registry.owner_of(id).unwrap(), &inventory());
    }

    #[test]
    fn transfer_retires_the_previous_owners_listing() {
        let mut registry = CardRegistry::new();
        let mut listings = ListingBook::new();
        let now = Utc::now();
        let id = registry.mint(inventory(), draft("a"), now).unwrap();
        listings.insert(Listing::new(id, inventory(), Price::from_wei(90), now));

        registry
            .transfer_ownership(id, &inventory(), &AccountId::new("bob"), &mut listings)
            .unwrap();

        assert_eq!(registry.owner_of(id).unwrap(), &AccountId::new("bob"));
        assert!(!registry.get(id).unwrap().for_sale);
        assert!(listings.get_active_listing(id).is_none());
        assert_eq!(listings.history(id).len(), 1);
    }

    #[test]
    fn owned_by_filters_in_id_order() {
        let mut registry = CardRegistry::new();
        let mut listings = ListingBook::new();
        let now = Utc::now();
        for name in ["a", "b", "c"] {
            registry.mint(inventory(), draft(name), now).unwrap();
        }
        let bob = AccountId::new("bob");
        registry
            .transfer_ownership(TokenId::new(3), &inventory(), &bob, &mut listings)
            .unwrap();
        registry
            .transfer_ownership(TokenId::new(1), &inventory(), &bob, &mut listings)
            .unwrap();

        let owned: Vec<_> = registry.owned_by(&bob).map(|card| card.id.value()).collect();
        assert_eq!(owned, vec![1, 3]);
    }
}
