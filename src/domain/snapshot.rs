//! Feature snapshots: one ~65-field observation of a market at an instant.
//!
//! Snapshots are immutable and append-only. Fields that were unavailable at
//! assembly time are `None`, never zero; the distinction matters downstream
//! because a zero depth and an uncollected depth mean different things.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::book::Book;
use super::id::MarketId;
use super::market::Tier;
use super::trade::{FlowMetrics, WhaleMetrics};

/// Orderbook-derived feature group. Only present for tiers that collect the
/// orderbook (T2+), and only when the orderbook fetch succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BookFeatures {
    pub bid_depth_5: f64,
    pub bid_depth_10: f64,
    pub bid_depth_20: f64,
    pub bid_depth_50: f64,
    pub ask_depth_5: f64,
    pub ask_depth_10: f64,
    pub ask_depth_20: f64,
    pub ask_depth_50: f64,
    pub bid_levels: u32,
    pub ask_levels: u32,
    /// `(bid_depth - ask_depth) / (bid_depth + ask_depth)`, 0 when empty.
    pub book_imbalance: f64,
    pub bid_wall_price: Option<f64>,
    pub bid_wall_size: Option<f64>,
    pub ask_wall_price: Option<f64>,
    pub ask_wall_size: Option<f64>,
}

impl BookFeatures {
    /// Derive the feature group from a fetched orderbook.
    #[must_use]
    pub fn from_book(book: &Book) -> Self {
        let bid_wall = book.bid_wall();
        let ask_wall = book.ask_wall();
        Self {
            bid_depth_5: book.bid_depth(5),
            bid_depth_10: book.bid_depth(10),
            bid_depth_20: book.bid_depth(20),
            bid_depth_50: book.bid_depth(50),
            ask_depth_5: book.ask_depth(5),
            ask_depth_10: book.ask_depth(10),
            ask_depth_20: book.ask_depth(20),
            ask_depth_50: book.ask_depth(50),
            bid_levels: book.bids().len() as u32,
            ask_levels: book.asks().len() as u32,
            book_imbalance: book.imbalance(),
            bid_wall_price: bid_wall.map(|l| l.price),
            bid_wall_size: bid_wall.map(|l| l.size),
            ask_wall_price: ask_wall.map(|l| l.price),
            ask_wall_size: ask_wall.map(|l| l.size),
        }
    }
}

/// One observation of a market, assembled against a single wall-clock `now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub market_id: MarketId,
    pub at: DateTime<Utc>,
    pub tier: Tier,

    // Price group. `price` is mandatory: assembly drops the snapshot when it
    // cannot be obtained.
    pub price: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    /// `max(0, best_ask - best_bid)` when both sides were present.
    pub spread: Option<f64>,
    pub last_trade_price: Option<f64>,

    // Momentum group.
    pub price_change_1d: Option<f64>,
    pub price_change_1w: Option<f64>,
    pub price_change_1m: Option<f64>,

    // Volume group.
    pub volume_total: Option<f64>,
    pub volume_24h: Option<f64>,
    pub volume_1w: Option<f64>,
    pub liquidity: Option<f64>,

    // Orderbook group (T2+ only).
    pub book: Option<BookFeatures>,

    // Trailing-hour trade flow (subscribed markets only).
    pub flow_1h: Option<FlowMetrics>,

    // Trailing-hour whale flow (subscribed markets only).
    pub whale_1h: Option<WhaleMetrics>,

    // Context group.
    pub hours_to_close: f64,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u8,
    pub hour_of_day: u8,
}

impl Snapshot {
    /// Context fields derived from the assembly clock.
    #[must_use]
    pub fn context(now: DateTime<Utc>) -> (u8, u8) {
        (
            now.weekday().num_days_from_monday() as u8,
            now.hour() as u8,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::PriceLevel;
    use crate::domain::id::TokenId;
    use chrono::TimeZone;

    #[test]
    fn context_fields_from_clock() {
        // 2025-06-01 is a Sunday.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap();
        let (dow, hod) = Snapshot::context(now);
        assert_eq!(dow, 6);
        assert_eq!(hod, 15);
    }

    #[test]
    fn book_features_capture_depth_and_walls() {
        let book = Book::new(
            TokenId::from("yes"),
            vec![PriceLevel::new(0.45, 100.0), PriceLevel::new(0.44, 700.0)],
            vec![PriceLevel::new(0.46, 50.0)],
        );
        let features = BookFeatures::from_book(&book);
        assert!((features.bid_depth_5 - 800.0).abs() < 1e-9);
        assert_eq!(features.bid_levels, 2);
        assert_eq!(features.ask_levels, 1);
        assert_eq!(features.bid_wall_price, Some(0.44));
        assert_eq!(features.bid_wall_size, Some(700.0));
        assert!(features.book_imbalance > 0.0);
    }
}
