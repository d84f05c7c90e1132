// src/bookmarks.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Stock;

/// Key used for stocks without a bookmark color.
pub const UNBOOKMARKED: &str = "none";

/// Query parameters accepted by `GET /stocks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockFilter {
    pub bookmark_color: Option<String>,
    pub bookmarked: Option<bool>,
}

impl StockFilter {
    pub fn matches(&self, stock: &Stock) -> bool {
        if let Some(color) = &self.bookmark_color {
            if &stock.bookmark_color != color {
                return false;
            }
        }
        match self.bookmarked {
            Some(wanted) => stock.is_bookmarked() == wanted,
            None => true,
        }
    }

    pub fn apply(&self, stocks: Vec<Stock>) -> Vec<Stock> {
        stocks.into_iter().filter(|s| self.matches(s)).collect()
    }
}

pub fn group_by_color(stocks: Vec<Stock>) -> BTreeMap<String, Vec<Stock>> {
    let mut groups: BTreeMap<String, Vec<Stock>> = BTreeMap::new();
    for stock in stocks {
        let color = if stock.is_bookmarked() {
            stock.bookmark_color.clone()
        } else {
            UNBOOKMARKED.to_string()
        };
        groups.entry(color).or_default().push(stock);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewStock;
    use chrono::Utc;

    fn stock(ticker: &str, color: &str) -> Stock {
        let mut body = NewStock::new(ticker, ticker);
        body.bookmark_color = Some(color.to_string());
        body.into_stock("alice", Utc::now()).unwrap()
    }

    fn watchlist() -> Vec<Stock> {
        vec![
            stock("AAPL", "text-green-500"),
            stock("MSFT", ""),
            stock("TSLA", "text-red-500"),
            stock("NVDA", "text-green-500"),
        ]
    }

    fn tickers(stocks: &[Stock]) -> Vec<&str> {
        stocks.iter().map(|s| s.ticker_symbol.as_str()).collect()
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert_eq!(StockFilter::default().apply(watchlist()).len(), 4);
    }

    #[test]
    fn filters_by_color_and_bookmark_state() {
        let by_color = StockFilter {
            bookmark_color: Some("text-green-500".into()),
            ..Default::default()
        };
        assert_eq!(tickers(&by_color.apply(watchlist())), vec!["AAPL", "NVDA"]);

        let bookmarked = StockFilter {
            bookmarked: Some(true),
            ..Default::default()
        };
        assert_eq!(
            tickers(&bookmarked.apply(watchlist())),
            vec!["AAPL", "TSLA", "NVDA"]
        );

        let unbookmarked = StockFilter {
            bookmarked: Some(false),
            ..Default::default()
        };
        assert_eq!(tickers(&unbookmarked.apply(watchlist())), vec!["MSFT"]);
    }

    #[test]
    fn groups_fall_back_to_none() {
        let groups = group_by_color(watchlist());
        assert_eq!(
            groups.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["none", "text-green-500", "text-red-500"]
        );
        assert_eq!(tickers(&groups["text-green-500"]), vec!["AAPL", "NVDA"]);
        assert_eq!(tickers(&groups[UNBOOKMARKED]), vec!["MSFT"]);
    }
}
