//! Best bid/ask cache fed by WebSocket book events.

use dashmap::DashMap;

use crate::domain::TokenId;

/// Latest top-of-book quote per token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quote {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub last_price: Option<f64>,
}

impl Quote {
    /// Midpoint when both sides are present.
    #[must_use]
    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid? + self.best_ask?) / 2.0)
    }
}

/// Concurrent per-token quote cache.
#[derive(Default)]
pub struct QuoteCache {
    quotes: DashMap<TokenId, Quote>,
}

impl QuoteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the top of book from a feed book event.
    pub fn update_book(&self, token: &TokenId, best_bid: Option<f64>, best_ask: Option<f64>) {
        let mut entry = self.quotes.entry(token.clone()).or_default();
        if best_bid.is_some() {
            entry.best_bid = best_bid;
        }
        if best_ask.is_some() {
            entry.best_ask = best_ask;
        }
    }

    /// Record the latest traded or quoted price.
    pub fn update_price(&self, token: &TokenId, price: f64) {
        self.quotes.entry(token.clone()).or_default().last_price = Some(price);
    }

    #[must_use]
    pub fn get(&self, token: &TokenId) -> Option<Quote> {
        self.quotes.get(token).map(|q| *q)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_book_updates_merge() {
        let cache = QuoteCache::new();
        let token = TokenId::from("t");
        cache.update_book(&token, Some(0.45), None);
        cache.update_book(&token, None, Some(0.47));
        let quote = cache.get(&token).unwrap();
        assert_eq!(quote.best_bid, Some(0.45));
        assert_eq!(quote.best_ask, Some(0.47));
        assert_eq!(quote.mid(), Some(0.46));
    }

    #[test]
    fn unknown_token_is_none() {
        let cache = QuoteCache::new();
        assert!(cache.get(&TokenId::from("missing")).is_none());
    }
}
