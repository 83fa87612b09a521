//! Sale channels.
//!
//! Both ways of buying a card share one post-condition: ownership moves to
//! the buyer, any listing on the card is retired, and a sale record is
//! appended. They differ only in what has to be true beforehand, so the
//! channel is a tag on a single operation rather than two separate paths.
//!
//! A sale runs in two halves. [`SaleChannel::prepare`] checks the
//! channel-specific preconditions against shared references and produces the
//! record that would be written. [`settle`] applies a prepared record. The
//! facade journals the record between the two halves.

use crate::ledger::TransactionLedger;
use crate::listings::ListingBook;
use crate::registry::CardRegistry;
use card_market_core::{
    AccountId, DateTime, MarketError, Price, Result, SaleKind, SaleRecord, TokenId, Utc,
};

/// Which channel a purchase goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SaleChannel {
    /// One-shot primary sale at the card's base price
    Initial,
    /// Peer sale against the card's active listing
    Secondary,
}

/// A buyer's request to purchase a card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleRequest {
    /// Card to buy
    pub token_id: TokenId,
    /// Buying account
    pub buyer: AccountId,
    /// Amount offered, which must equal the asking price exactly
    pub paid: Price,
    /// When the sale happens
    pub at: DateTime<Utc>,
}

impl SaleChannel {
    /// Record discriminator written by this channel
    #[must_use]
    pub const fn kind(self) -> SaleKind {
        match self {
            Self::Initial => SaleKind::Initial,
            Self::Secondary => SaleKind::Secondary,
        }
    }

    /// Checks the channel's preconditions and builds the sale record.
    ///
    /// The returned record has sequence `0`; the caller stamps the real
    /// sequence number once it commits to the sale.
    ///
    /// # Errors
    ///
    /// Both channels fail with [`MarketError::NotFound`] for an unminted
    /// token and [`MarketError::InvalidAccount`] for a blank buyer.
    ///
    /// The initial channel fails with [`MarketError::NotForSale`] once the
    /// card has left the inventory, and [`MarketError::PriceMismatch`] unless
    /// the base price is paid.
    ///
    /// The secondary channel fails with [`MarketError::NoActiveListing`],
    /// [`MarketError::SelfPurchase`], [`MarketError::PriceMismatch`] unless
    /// the listing price is paid, and [`MarketError::NotOwner`] if the
    /// listing's seller no longer owns the card.
    pub fn prepare(
        self,
        registry: &CardRegistry,
        listings: &ListingBook,
        request: &SaleRequest,
    ) -> Result<SaleRecord> {
        let token_id = request.token_id;
        let card = registry.get(token_id)?;
        if request.buyer.is_empty() {
            return Err(MarketError::InvalidAccount);
        }

        let (seller, price) = match self {
            Self::Initial => {
                if !card.for_sale {
                    return Err(MarketError::NotForSale(token_id));
                }
                (card.owner.clone(), card.base_price)
            }
            Self::Secondary => {
                let listing = listings
                    .get_active_listing(token_id)
                    .ok_or(MarketError::NoActiveListing(token_id))?;
                if listing.seller == request.buyer {
                    return Err(MarketError::SelfPurchase {
                        token_id,
                        account: request.buyer.clone(),
                    });
                }
                (listing.seller.clone(), listing.price)
            }
        };

        if request.paid != price {
            return Err(MarketError::PriceMismatch {
                token_id,
                expected: price,
                paid: request.paid,
            });
        }
        if card.owner != seller {
            return Err(MarketError::NotOwner {
                token_id,
                account: seller,
            });
        }

        Ok(SaleRecord {
            sequence: 0,
            token_id,
            seller,
            buyer: request.buyer.clone(),
            price,
            sold_at: request.at,
            kind: self.kind(),
            display_name: card.display_name.clone(),
        })
    }

    /// Prepares and settles in one step, for callers that own the tables.
    ///
    /// # Errors
    ///
    /// See [`prepare`](Self::prepare) and [`settle`].
    pub fn execute(
        self,
        registry: &mut CardRegistry,
        listings: &mut ListingBook,
        ledger: &mut TransactionLedger,
        request: &SaleRequest,
    ) -> Result<SaleRecord> {
        let mut record = self.prepare(registry, listings, request)?;
        record.sequence = ledger.last_sequence().map_or(1, |last| last + 1);
        settle(record, registry, listings, ledger)
    }
}

/// Applies a prepared sale: transfer, listing retirement, record append.
///
/// Every check runs before the first write, so a rejected record leaves all
/// three tables untouched.
///
/// # Errors
///
/// - [`MarketError::InvalidRecord`] if the record is malformed
/// - [`MarketError::NotFound`] or [`MarketError::NotOwner`] if the seller no
///   longer holds the card
pub fn settle(
    record: SaleRecord,
    registry: &mut CardRegistry,
    listings: &mut ListingBook,
    ledger: &mut TransactionLedger,
) -> Result<SaleRecord> {
    TransactionLedger::validate(&record)?;
    registry.transfer_ownership(record.token_id, &record.seller, &record.buyer, listings)?;
    ledger.record(record.clone())?;
    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use card_market_core::CardDraft;

    struct Tables {
        registry: CardRegistry,
        listings: ListingBook,
        ledger: TransactionLedger,
    }

    fn inventory() -> AccountId {
        AccountId::new("inventory")
    }

    fn tables() -> (Tables, TokenId) {
        let mut registry = CardRegistry::new();
        let id = registry
            .mint(
                inventory(),
                CardDraft::new(Price::from_wei(60), "ipfs://1", "Striker"),
                Utc::now(),
            )
            .unwrap();
        let tables = Tables {
            registry,
            listings: ListingBook::new(),
            ledger: TransactionLedger::new(),
        };
        (tables, id)
    }

    fn request(token_id: TokenId, buyer: &str, wei: u128) -> SaleRequest {
        SaleRequest {
            token_id,
            buyer: AccountId::new(buyer),
            paid: Price::from_wei(wei),
            at: Utc::now(),
        }
    }

    fn buy(t: &mut Tables, channel: SaleChannel, req: &SaleRequest) -> Result<SaleRecord> {
        channel.execute(&mut t.registry, &mut t.listings, &mut t.ledger, req)
    }

    #[test]
    fn initial_sale_happens_once() {
        let (mut t, id) = tables();

        let record = buy(&mut t, SaleChannel::Initial, &request(id, "alice", 60)).unwrap();
        assert_eq!(record.kind, SaleKind::Initial);
        assert_eq!(record.seller, inventory());
        assert_eq!(record.display_name, "Striker");
        assert_eq!(t.registry.owner_of(id).unwrap(), &AccountId::new("alice"));

        assert_eq!(
            buy(&mut t, SaleChannel::Initial, &request(id, "bob", 60)),
            Err(MarketError::NotForSale(id))
        );
        assert_eq!(t.ledger.len(), 1);
    }

    #[test]
    fn initial_sale_requires_the_exact_base_price() {
        let (mut t, id) = tables();
        assert!(matches!(
            buy(&mut t, SaleChannel::Initial, &request(id, "alice", 61)),
            Err(MarketError::PriceMismatch { .. })
        ));
        assert_eq!(
            buy(&mut t, SaleChannel::Initial, &request(TokenId::new(5), "alice", 60)),
            Err(MarketError::NotFound(TokenId::new(5)))
        );
        assert!(t.ledger.is_empty());
    }

    #[test]
    fn secondary_sale_moves_the_card_and_retires_the_listing() {
        let (mut t, id) = tables();
        buy(&mut t, SaleChannel::Initial, &request(id, "alice", 60)).unwrap();
        t.listings
            .create_listing(&t.registry, id, AccountId::new("alice"), Price::from_wei(100), Utc::now())
            .unwrap();

        let record = buy(&mut t, SaleChannel::Secondary, &request(id, "bob", 100)).unwrap();
        assert_eq!(record.kind, SaleKind::Secondary);
        assert_eq!(record.sequence, 2);
        assert_eq!(t.registry.owner_of(id).unwrap(), &AccountId::new("bob"));
        assert!(t.listings.get_active_listing(id).is_none());

        assert_eq!(
            buy(&mut t, SaleChannel::Secondary, &request(id, "carol", 100)),
            Err(MarketError::NoActiveListing(id))
        );
    }

    #[test]
    fn secondary_sale_rejects_the_seller_and_wrong_amounts() {
        let (mut t, id) = tables();
        t.listings
            .create_listing(&t.registry, id, inventory(), Price::from_wei(80), Utc::now())
            .unwrap();

        assert!(matches!(
            buy(&mut t, SaleChannel::Secondary, &request(id, "inventory", 80)),
            Err(MarketError::SelfPurchase { .. })
        ));
        assert!(matches!(
            buy(&mut t, SaleChannel::Secondary, &request(id, "bob", 79)),
            Err(MarketError::PriceMismatch { .. })
        ));
        assert!(t.listings.get_active_listing(id).is_some());
    }

    #[test]
    fn initial_sale_also_retires_the_inventory_listing() {
        let (mut t, id) = tables();
        t.listings
            .create_listing(&t.registry, id, inventory(), Price::from_wei(80), Utc::now())
            .unwrap();

        buy(&mut t, SaleChannel::Initial, &request(id, "alice", 60)).unwrap();
        assert!(t.listings.get_active_listing(id).is_none());
    }

    #[test]
    fn settle_leaves_tables_untouched_on_a_stale_seller() {
        let (mut t, id) = tables();
        let mut record = SaleChannel::Initial
            .prepare(&t.registry, &t.listings, &request(id, "alice", 60))
            .unwrap();
        record.seller = AccountId::new("mallory");

        let result = settle(record, &mut t.registry, &mut t.listings, &mut t.ledger);
        assert!(matches!(result, Err(MarketError::NotOwner { .. })));
        assert_eq!(t.registry.owner_of(id).unwrap(), &inventory());
        assert!(t.registry.get(id).unwrap().for_sale);
        assert!(t.ledger.is_empty());
    }
}
