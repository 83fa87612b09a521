//! Fixture helpers for building test data.

#![allow(clippy::panic)] // Fixtures reject malformed literals loudly

use card_market_core::types::{AccountId, CardDraft, Price};

/// Build an account identifier
#[must_use]
pub fn account(name: &str) -> AccountId {
    AccountId::new(name)
}

/// Parse an ether literal such as `"0.06"`
///
/// # Panics
///
/// Panics if `amount` is not a valid ether amount.
#[must_use]
pub fn ether(amount: &str) -> Price {
    match Price::parse_ether(amount) {
        Ok(price) => price,
        Err(error) => panic!("bad ether literal {amount:?}: {error}"),
    }
}

/// Build a card draft with a derived metadata URI
///
/// # Panics
///
/// Panics if `base_price` is not a valid ether amount.
#[must_use]
pub fn card_draft(name: &str, base_price: &str) -> CardDraft {
    let slug = name.to_lowercase().replace(' ', "-");
    CardDraft::new(ether(base_price), format!("ipfs://cards/{slug}.json"), name)
}
