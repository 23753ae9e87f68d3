//! Fixture builders shared across tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::domain::{Market, MarketId, Side, Snapshot, Tier, TokenId, Trade};
use crate::venue::traits::{MarketDescriptor, StreamEvent};

/// Fixed test clock: 2025-06-01 12:00:00 UTC (a Sunday).
#[must_use]
pub fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Discovery descriptor for a tradeable binary market closing `hours` from
/// the fixed clock with the given 24h volume.
#[must_use]
pub fn descriptor(condition_id: &str, hours: f64, volume_24h: f64) -> MarketDescriptor {
    MarketDescriptor {
        condition_id: condition_id.to_owned(),
        slug: format!("slug-{condition_id}"),
        question: format!("Question for {condition_id}?"),
        yes_token_id: Some(format!("{condition_id}-yes")),
        no_token_id: Some(format!("{condition_id}-no")),
        end_date: Some(clock() + chrono::Duration::milliseconds((hours * 3_600_000.0) as i64)),
        category: Some("politics".into()),
        price: Some(0.50),
        best_bid: Some(0.49),
        best_ask: Some(0.51),
        last_trade_price: Some(0.50),
        price_change_1d: Some(0.01),
        price_change_1w: None,
        price_change_1m: None,
        volume_total: Some(volume_24h * 10.0),
        volume_24h: Some(volume_24h),
        volume_1w: Some(volume_24h * 4.0),
        liquidity: Some(5_000.0),
        active: true,
        closed: false,
        enable_order_book: true,
        outcome_prices: None,
        resolution_status: None,
    }
}

/// A tracked market `hours` from close at the fixed clock.
#[must_use]
pub fn market(condition_id: &str, hours: f64) -> Market {
    Market {
        condition_id: MarketId::from(condition_id),
        slug: format!("slug-{condition_id}"),
        question: format!("Question for {condition_id}?"),
        yes_token_id: Some(TokenId::from(format!("{condition_id}-yes"))),
        no_token_id: Some(TokenId::from(format!("{condition_id}-no"))),
        end_date: clock() + chrono::Duration::milliseconds((hours * 3_600_000.0) as i64),
        category: Some("politics".into()),
        initial_price: Some(0.50),
        initial_volume: Some(10_000.0),
        initial_liquidity: Some(5_000.0),
        active: true,
        closed: false,
        resolved: false,
        outcome: None,
        tier: Tier::from_hours_to_close(hours),
        tracked_since: clock(),
        snapshot_count: 0,
        last_snapshot_at: None,
        last_trade_at: None,
    }
}

/// A buffered trade on `market_id`, `mins_ago` minutes before the fixed
/// clock.
#[must_use]
pub fn trade(market_id: &str, mins_ago: i64, size: f64, side: Side, whale_tier: u8) -> Trade {
    Trade {
        market_id: MarketId::from(market_id),
        at: clock() - chrono::Duration::minutes(mins_ago),
        price: 0.50,
        size,
        side,
        whale_tier,
        best_bid: Some(0.49),
        best_ask: Some(0.51),
        mid: Some(0.50),
    }
}

/// A feed trade event on `token`.
#[must_use]
pub fn trade_event(token: &str) -> StreamEvent {
    StreamEvent::Trade {
        token_id: TokenId::from(token),
        price: 0.50,
        size: 100.0,
        side: Side::Buy,
        at: clock(),
    }
}

/// A minimal priced snapshot for `market_id` at the fixed clock.
#[must_use]
pub fn snapshot(market_id: &str, price: f64, tier: Tier) -> Snapshot {
    Snapshot {
        market_id: MarketId::from(market_id),
        at: clock(),
        tier,
        price,
        best_bid: Some(price - 0.01),
        best_ask: Some(price + 0.01),
        spread: Some(0.02),
        last_trade_price: Some(price),
        price_change_1d: None,
        price_change_1w: None,
        price_change_1m: None,
        volume_total: Some(100_000.0),
        volume_24h: Some(10_000.0),
        volume_1w: None,
        liquidity: Some(5_000.0),
        book: None,
        flow_1h: None,
        whale_1h: None,
        hours_to_close: 5.0,
        day_of_week: 6,
        hour_of_day: 12,
    }
}
