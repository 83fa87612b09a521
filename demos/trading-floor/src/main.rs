//! Command-line walkthrough of the card marketplace ledger.
//!
//! Mints a starter set of cards, runs the primary sale, listing, repricing,
//! cancellation and racing-buyer flows, then prints each trader's stats.
//!
//! Configuration comes from the environment (and a `.env` file if present);
//! set `MARKET_JOURNAL_PATH` to persist the ledger between runs.

use anyhow::Context;
use card_market::{FileJournal, Market, MarketConfig};
use card_market_core::{AccountId, Card, CardDraft, EventJournal, Price, SystemClock};
use card_market_testing::InMemoryJournal;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

/// Starter inventory: display name and base price in ether.
const STARTER_SET: [(&str, &str); 6] = [
    ("Goalkeeper", "0.06"),
    ("Centre Back", "0.04"),
    ("Full Back", "0.01"),
    ("Playmaker", "0.2"),
    ("Winger", "0.03"),
    ("Striker", "0.05"),
];

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn nth(cards: &[Card], index: usize) -> anyhow::Result<&Card> {
    cards
        .get(index)
        .context("starter set is smaller than expected")
}

fn ether(amount: &str) -> anyhow::Result<Price> {
    Price::parse_ether(amount).with_context(|| format!("invalid ether amount {amount:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = MarketConfig::from_env();
    init_tracing(&config.log_level);
    card_market::describe_metrics();

    let journal: Arc<dyn EventJournal> = match &config.journal_path {
        Some(path) => Arc::new(
            FileJournal::open(path)
                .await
                .with_context(|| format!("opening journal at {}", path.display()))?,
        ),
        None => Arc::new(InMemoryJournal::new()),
    };
    let market = Arc::new(Market::recover(config.clone(), Arc::new(SystemClock), journal).await?);
    info!(cards = market.total_supply().await, "market ready");

    println!("=== Trading Floor ===\n");

    let inventory = AccountId::new(config.inventory_account.as_str());
    let alice = AccountId::new("0xa11ce");
    let bob = AccountId::new("0xb0b");
    let carol = AccountId::new("0xca201");

    // Mint
    let drafts = STARTER_SET
        .iter()
        .map(|(name, price)| {
            let slug = name.to_lowercase().replace(' ', "-");
            Ok(CardDraft::new(ether(price)?, format!("ipfs://cards/{slug}.json"), *name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let cards = market.mint_batch(inventory.clone(), drafts).await?;
    println!("Minted {} cards into {inventory}:", cards.len());
    for card in &cards {
        println!("  {} {:<12} {}", card.id, card.display_name, card.base_price);
    }
    let token = |index: usize| nth(&cards, index).map(|card| card.id);

    // Initial sale is one-shot
    println!("\nAlice buys {} from the inventory...", token(0)?);
    market
        .purchase_initial(token(0)?, alice.clone(), nth(&cards, 0)?.base_price)
        .await?;
    if let Err(error) = market
        .purchase_initial(token(0)?, bob.clone(), nth(&cards, 0)?.base_price)
        .await
    {
        println!("  Bob tries the same card: {error}");
    }

    // Listing, reprice, cancel
    println!("\nAlice lists {} at 0.1 ETH, then reprices to 0.08 ETH", token(0)?);
    market.list(token(0)?, alice.clone(), ether("0.1")?).await?;
    let listing = market
        .reprice(token(0)?, alice.clone(), ether("0.08")?)
        .await?;
    println!("  active listing: {} at {}", listing.token_id, listing.price);
    if let Err(error) = market.reprice(token(0)?, bob.clone(), ether("0.01")?).await {
        println!("  Bob tries to reprice it: {error}");
    }

    market
        .purchase_initial(token(2)?, alice.clone(), nth(&cards, 2)?.base_price)
        .await?;
    market.list(token(2)?, alice.clone(), ether("0.02")?).await?;
    market.cancel(token(2)?, alice.clone()).await?;
    if let Err(error) = market
        .purchase_secondary(token(2)?, carol.clone(), ether("0.02")?)
        .await
    {
        println!("  Carol tries a cancelled listing: {error}");
    }

    // Two buyers race for one listing
    println!("\nBob and Carol race for {}...", token(0)?);
    let racers = [bob.clone(), carol.clone()].map(|buyer| {
        let market = Arc::clone(&market);
        let price = listing.price;
        let id = listing.token_id;
        tokio::spawn(async move { (buyer.clone(), market.purchase_secondary(id, buyer, price).await) })
    });
    for joined in join_all(racers).await {
        let (buyer, result) = joined.context("purchase task panicked")?;
        match result {
            Ok(record) => println!("  {buyer} wins (sale #{})", record.sequence),
            Err(error) => println!("  {buyer} loses: {error}"),
        }
    }
    println!("  {} now belongs to {}", token(0)?, market.owner_of(token(0)?).await?);

    // Summary
    println!("\nFor sale: {} of {} cards", market.for_sale_cards().await.len(), market.total_supply().await);
    for trader in [&inventory, &alice, &bob, &carol] {
        let stats = market.trading_stats(trader).await;
        println!(
            "  {trader} sold {} for {} (avg {}), {} open listings, {} purchases",
            stats.total_sales,
            stats.total_revenue,
            stats.average_sale_price,
            stats.active_listings,
            market.purchases_by(trader).await.len(),
        );
    }

    Ok(())
}
