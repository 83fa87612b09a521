//! Transaction ledger: the append-only trade history.
//!
//! Records are never modified or removed once written. Seller and buyer
//! views are secondary indexes over the same records, so a purchase record
//! is just a sale record reached through its buyer.

use card_market_core::{
    AccountId, MarketError, Price, Result, SaleKind, SaleRecord, SaleStats, TokenId,
};
use std::collections::HashMap;

/// Append-only sale history with per-account indexes.
#[derive(Clone, Debug, Default)]
pub struct TransactionLedger {
    records: Vec<SaleRecord>,
    by_seller: HashMap<AccountId, Vec<usize>>,
    by_buyer: HashMap<AccountId, Vec<usize>>,
}

impl TransactionLedger {
    /// Creates an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks a record before it is written.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidRecord`] if the price is zero, or if a
    /// secondary sale names the same account as buyer and seller.
    pub fn validate(record: &SaleRecord) -> Result<()> {
        if record.price.is_zero() {
            return Err(MarketError::InvalidRecord {
                token_id: record.token_id,
                reason: "sale price must be positive".to_string(),
            });
        }
        if record.kind == SaleKind::Secondary && record.buyer == record.seller {
            return Err(MarketError::InvalidRecord {
                token_id: record.token_id,
                reason: format!("{} is both buyer and seller", record.buyer),
            });
        }
        if record.buyer.is_empty() || record.seller.is_empty() {
            return Err(MarketError::InvalidRecord {
                token_id: record.token_id,
                reason: "buyer and seller must be named".to_string(),
            });
        }
        Ok(())
    }

    /// Appends a sale record and returns its sequence number.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn record(&mut self, record: SaleRecord) -> Result<u64> {
        Self::validate(&record)?;
        let index = self.records.len();
        let sequence = record.sequence;
        self.by_seller
            .entry(record.seller.clone())
            .or_default()
            .push(index);
        self.by_buyer
            .entry(record.buyer.clone())
            .or_default()
            .push(index);
        self.records.push(record);
        Ok(sequence)
    }

    fn collect(&self, indexes: impl Iterator<Item = usize>) -> Vec<SaleRecord> {
        let mut indexes: Vec<usize> = indexes.collect();
        indexes.sort_unstable();
        indexes.dedup();
        let mut records: Vec<SaleRecord> = indexes
            .into_iter()
            .filter_map(|index| self.records.get(index).cloned())
            .collect();
        records.sort_by(|a, b| (a.sold_at, a.sequence).cmp(&(b.sold_at, b.sequence)));
        records
    }

    fn indexes<'a>(
        index: &'a HashMap<AccountId, Vec<usize>>,
        account: &AccountId,
    ) -> impl Iterator<Item = usize> + 'a {
        index.get(account).into_iter().flatten().copied()
    }

    /// Sales where `account` was buyer or seller, oldest first.
    ///
    /// Ties on timestamp fall back to the sequence number, so the order is
    /// stable across calls and across restarts.
    #[must_use]
    pub fn history_for(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.collect(
            Self::indexes(&self.by_seller, account).chain(Self::indexes(&self.by_buyer, account)),
        )
    }

    /// Sales where `account` was the buyer, oldest first
    #[must_use]
    pub fn purchases_by(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.collect(Self::indexes(&self.by_buyer, account))
    }

    /// Sales where `account` was the seller, oldest first
    #[must_use]
    pub fn sales_by(&self, account: &AccountId) -> Vec<SaleRecord> {
        self.collect(Self::indexes(&self.by_seller, account))
    }

    /// Every sale of one token, in the order they happened
    #[must_use]
    pub fn for_token(&self, token_id: TokenId) -> Vec<SaleRecord> {
        self.records
            .iter()
            .filter(|record| record.token_id == token_id)
            .cloned()
            .collect()
    }

    /// Totals over the sales `account` made as seller.
    #[must_use]
    pub fn stats_for(&self, account: &AccountId) -> SaleStats {
        let (total_sales, total_revenue) = self
            .sales_by(account)
            .iter()
            .fold((0_u64, Price::ZERO), |(count, revenue), record| {
                (count + 1, revenue.saturating_add(record.price))
            });
        let average_sale_price = if total_sales == 0 {
            Price::ZERO
        } else {
            Price::from_wei(total_revenue.wei() / u128::from(total_sales))
        };
        SaleStats {
            total_sales,
            total_revenue,
            average_sale_price,
        }
    }

    /// Highest sequence number written so far
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.records.iter().map(|record| record.sequence).max()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks if no sale has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
