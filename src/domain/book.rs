//! Order book types for market depth representation.
//!
//! An order book has two sides:
//! - **Bids**: buy orders, sorted by price descending (best bid first)
//! - **Asks**: sell orders, sorted by price ascending (best ask first)
//!
//! Ladders carry venue floats; execution math converts to `Decimal` at the
//! boundary where money changes hands.

use super::id::TokenId;

/// A single price level: aggregated size resting at one price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// Order book for a single outcome token.
#[derive(Debug, Clone)]
pub struct Book {
    token_id: TokenId,
    /// Sorted by price descending.
    bids: Vec<PriceLevel>,
    /// Sorted by price ascending.
    asks: Vec<PriceLevel>,
}

impl Book {
    /// Create a book from raw ladders, sorting each side into canonical order.
    #[must_use]
    pub fn new(token_id: TokenId, mut bids: Vec<PriceLevel>, mut asks: Vec<PriceLevel>) -> Self {
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        Self {
            token_id,
            bids,
            asks,
        }
    }

    #[must_use]
    pub const fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Best bid (highest buy price), if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    /// Best ask (lowest sell price), if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Midpoint of best bid/ask; `None` unless both sides are populated.
    #[must_use]
    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid()?.price + self.best_ask()?.price) / 2.0)
    }

    /// Best-ask minus best-bid, floored at zero (crossed books report 0).
    #[must_use]
    pub fn spread(&self) -> Option<f64> {
        Some((self.best_ask()?.price - self.best_bid()?.price).max(0.0))
    }

    /// Total bid size across the top `levels` price levels.
    #[must_use]
    pub fn bid_depth(&self, levels: usize) -> f64 {
        self.bids.iter().take(levels).map(|l| l.size).sum()
    }

    /// Total ask size across the top `levels` price levels.
    #[must_use]
    pub fn ask_depth(&self, levels: usize) -> f64 {
        self.asks.iter().take(levels).map(|l| l.size).sum()
    }

    /// Largest single resting order on the bid side ("wall").
    #[must_use]
    pub fn bid_wall(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .copied()
            .max_by(|a, b| a.size.total_cmp(&b.size))
    }

    /// Largest single resting order on the ask side ("wall").
    #[must_use]
    pub fn ask_wall(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .copied()
            .max_by(|a, b| a.size.total_cmp(&b.size))
    }

    /// Depth imbalance `(bid - ask) / (bid + ask)` over the full book.
    ///
    /// Zero when both sides are empty.
    #[must_use]
    pub fn imbalance(&self) -> f64 {
        let bid = self.bid_depth(usize::MAX);
        let ask = self.ask_depth(usize::MAX);
        let total = bid + ask;
        if total == 0.0 {
            0.0
        } else {
            (bid - ask) / total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Book {
        Book::new(
            TokenId::from("yes"),
            vec![
                PriceLevel::new(0.44, 200.0),
                PriceLevel::new(0.45, 100.0),
                PriceLevel::new(0.43, 900.0),
            ],
            vec![
                PriceLevel::new(0.47, 300.0),
                PriceLevel::new(0.46, 150.0),
            ],
        )
    }

    #[test]
    fn sides_are_sorted_on_construction() {
        let book = sample_book();
        assert_eq!(book.best_bid().unwrap().price, 0.45);
        assert_eq!(book.best_ask().unwrap().price, 0.46);
        assert_eq!(book.bids()[2].price, 0.43);
    }

    #[test]
    fn spread_and_mid() {
        let book = sample_book();
        assert!((book.spread().unwrap() - 0.01).abs() < 1e-9);
        assert!((book.mid().unwrap() - 0.455).abs() < 1e-9);
    }

    #[test]
    fn crossed_book_spread_floors_at_zero() {
        let book = Book::new(
            TokenId::from("yes"),
            vec![PriceLevel::new(0.50, 10.0)],
            vec![PriceLevel::new(0.48, 10.0)],
        );
        assert_eq!(book.spread(), Some(0.0));
    }

    #[test]
    fn depth_truncates_at_level_count() {
        let book = sample_book();
        assert!((book.bid_depth(2) - 300.0).abs() < 1e-9);
        assert!((book.bid_depth(50) - 1200.0).abs() < 1e-9);
        assert!((book.ask_depth(1) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn walls_pick_largest_size_not_best_price() {
        let book = sample_book();
        assert_eq!(book.bid_wall().unwrap().price, 0.43);
        assert_eq!(book.ask_wall().unwrap().price, 0.47);
    }

    #[test]
    fn imbalance_zero_for_empty_book() {
        let book = Book::new(TokenId::from("yes"), vec![], vec![]);
        assert_eq!(book.imbalance(), 0.0);
        assert_eq!(book.mid(), None);
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn imbalance_sign_follows_heavier_side() {
        let book = sample_book();
        // bids 1200 vs asks 450
        assert!(book.imbalance() > 0.0);
    }
}
