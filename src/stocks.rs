// src/stocks.rs
use chrono::Utc;
use log::{debug, info};
use std::collections::BTreeMap;

use crate::bookmarks::{group_by_color, StockFilter};
use crate::db::Store;
use crate::error::ApiError;
use crate::models::{normalize_ticker, NewStock, Stock, StockPatch};

/// The caller's watchlist, oldest entry first.
pub async fn list(
    store: &dyn Store,
    username: &str,
    filter: &StockFilter,
) -> Result<Vec<Stock>, ApiError> {
    let mut stocks = filter.apply(store.list_stocks(username).await?);
    stocks.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.ticker_symbol.cmp(&b.ticker_symbol))
    });
    Ok(stocks)
}

pub async fn groups(
    store: &dyn Store,
    username: &str,
) -> Result<BTreeMap<String, Vec<Stock>>, ApiError> {
    let stocks = list(store, username, &StockFilter::default()).await?;
    Ok(group_by_color(stocks))
}

pub async fn create(store: &dyn Store, username: &str, body: NewStock) -> Result<Stock, ApiError> {
    let stock = body.into_stock(username, Utc::now())?;
    if !store.insert_stock(&stock).await? {
        return Err(ApiError::Conflict(format!(
            "{} is already in the watchlist",
            stock.ticker_symbol
        )));
    }
    info!("Stock {} added for {}.", stock.ticker_symbol, username);
    Ok(stock)
}

/// Merges `patch` into the caller's stock. Returns whether anything matched.
pub async fn update(
    store: &dyn Store,
    username: &str,
    id: &str,
    patch: &StockPatch,
) -> Result<bool, ApiError> {
    let ticker = normalize_ticker(id);
    let matched = store.update_stock(username, &ticker, patch).await?;
    if !matched {
        debug!("Update of {} by {} matched nothing.", ticker, username);
    }
    Ok(matched)
}

/// Removes the caller's stock and every note filed under it.
pub async fn delete(store: &dyn Store, username: &str, id: &str) -> Result<usize, ApiError> {
    let ticker = normalize_ticker(id);
    store.delete_stock(username, &ticker).await?;
    let removed = store.delete_notes_for_stock(username, &ticker).await?;
    info!(
        "Stock {} deleted for {} ({} notes removed).",
        ticker, username, removed
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewNote, NoteContent};

    #[tokio::test]
    async fn duplicate_ticker_conflicts_per_owner() {
        let store = MemoryStore::new();
        create(&store, "alice", NewStock::new("aapl", "Apple")).await.unwrap();
        let dup = create(&store, "alice", NewStock::new("AAPL ", "Apple")).await;
        assert!(matches!(dup, Err(ApiError::Conflict(_))));
        create(&store, "bob", NewStock::new("AAPL", "Apple")).await.unwrap();
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let store = MemoryStore::new();
        let mut late = NewStock::new("AAA", "late");
        late.created_at = Some("2024-02-01T00:00:00Z".into());
        let mut early = NewStock::new("ZZZ", "early");
        early.created_at = Some("2024-01-01T00:00:00Z".into());
        create(&store, "alice", late).await.unwrap();
        create(&store, "alice", early).await.unwrap();

        let stocks = list(&store, "alice", &StockFilter::default()).await.unwrap();
        let tickers: Vec<_> = stocks.iter().map(|s| s.ticker_symbol.as_str()).collect();
        assert_eq!(tickers, vec!["ZZZ", "AAA"]);
    }

    #[tokio::test]
    async fn delete_cascades_and_is_idempotent() {
        let store = MemoryStore::new();
        create(&store, "alice", NewStock::new("AAPL", "Apple")).await.unwrap();
        for text in ["one", "two"] {
            let note = NewNote::new("AAPL", NoteContent::freeform(text))
                .into_note("alice", Utc::now())
                .unwrap();
            store.insert_note(&note).await.unwrap();
        }

        assert_eq!(delete(&store, "alice", "aapl").await.unwrap(), 2);
        assert_eq!(delete(&store, "alice", "aapl").await.unwrap(), 0);
        assert!(store.list_notes("alice", "AAPL").await.unwrap().is_empty());
        assert!(store.find_stock("alice", "AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_foreign_stock_is_a_no_op() {
        let store = MemoryStore::new();
        create(&store, "alice", NewStock::new("AAPL", "Apple")).await.unwrap();
        let patch = StockPatch {
            display_name: Some("Hijacked".into()),
            ..Default::default()
        };
        assert!(!update(&store, "bob", "AAPL", &patch).await.unwrap());
        let stock = store.find_stock("alice", "AAPL").await.unwrap().unwrap();
        assert_eq!(stock.display_name, "Apple");
    }
}
