//! Trade events and the flow/whale aggregates derived from them.
//!
//! A [`Trade`] is a single execution observed on the venue's real-time feed.
//! [`FlowMetrics`] and [`WhaleMetrics`] are computed on demand from a window
//! of trades; they are never stored incrementally, so the ring buffer stays
//! the single source of truth for these fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::MarketId;
use super::market::Side;

/// Whale classification thresholds by trade size, in base units.
///
/// A trade's whale tier is the highest tier whose threshold it meets.
/// Tier 0 means "not a whale"; snapshot whale fields consider tier >= 2.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WhaleThresholds {
    #[serde(default = "default_tier1")]
    pub tier1: f64,
    #[serde(default = "default_tier2")]
    pub tier2: f64,
    #[serde(default = "default_tier3")]
    pub tier3: f64,
}

fn default_tier1() -> f64 {
    500.0
}

fn default_tier2() -> f64 {
    2_000.0
}

fn default_tier3() -> f64 {
    10_000.0
}

impl Default for WhaleThresholds {
    fn default() -> Self {
        Self {
            tier1: default_tier1(),
            tier2: default_tier2(),
            tier3: default_tier3(),
        }
    }
}

impl WhaleThresholds {
    /// Classify a trade size into a whale tier 0..=3.
    #[must_use]
    pub fn classify(&self, size: f64) -> u8 {
        if size >= self.tier3 {
            3
        } else if size >= self.tier2 {
            2
        } else if size >= self.tier1 {
            1
        } else {
            0
        }
    }
}

/// A single execution event on one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub market_id: MarketId,
    pub at: DateTime<Utc>,
    /// Execution price as a probability in [0, 1].
    pub price: f64,
    /// Size in base units.
    pub size: f64,
    pub side: Side,
    /// Whale tier 0..=3 assigned at ingest time.
    pub whale_tier: u8,
    /// Best bid at event time if the feed supplied it.
    pub best_bid: Option<f64>,
    /// Best ask at event time if the feed supplied it.
    pub best_ask: Option<f64>,
    /// Midpoint at event time if both sides were present.
    pub mid: Option<f64>,
}

impl Trade {
    /// True when this trade counts toward whale aggregates.
    #[must_use]
    pub const fn is_whale(&self) -> bool {
        self.whale_tier >= 2
    }
}

/// Trade-flow aggregates over a trailing window.
///
/// Laws (enforced by construction, verified in tests):
/// `buy_count + sell_count == trade_count` and
/// `buy_volume + sell_volume == volume`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub trade_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub avg_size: f64,
    pub max_size: f64,
    /// Volume-weighted average price; 0 for an empty window.
    pub vwap: f64,
}

impl FlowMetrics {
    /// Compute flow aggregates from a window of trades.
    #[must_use]
    pub fn from_trades(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let mut out = Self::default();
        let mut notional = 0.0;
        for t in trades {
            out.trade_count += 1;
            out.volume += t.size;
            notional += t.price * t.size;
            out.max_size = out.max_size.max(t.size);
            match t.side {
                Side::Buy => {
                    out.buy_count += 1;
                    out.buy_volume += t.size;
                }
                Side::Sell => {
                    out.sell_count += 1;
                    out.sell_volume += t.size;
                }
            }
        }
        out.avg_size = out.volume / out.trade_count as f64;
        if out.volume > 0.0 {
            out.vwap = notional / out.volume;
        }
        out
    }
}

/// Whale-flow aggregates over a trailing window (trades with tier >= 2).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WhaleMetrics {
    pub whale_count: u64,
    pub whale_volume: f64,
    pub whale_buy_volume: f64,
    pub whale_sell_volume: f64,
    /// Signed flow: buy volume minus sell volume.
    pub whale_net_flow: f64,
    /// Buy share of whale volume; 0 when there are no whales.
    pub whale_buy_ratio: f64,
    /// Seconds since the most recent whale trade; `None` when none in window.
    pub time_since_whale_secs: Option<i64>,
    /// Whale share of total window volume.
    pub pct_volume_from_whales: f64,
    /// Side of the most recent whale trade in the window.
    pub last_whale_side: Option<Side>,
}

impl WhaleMetrics {
    /// Compute whale aggregates from a window of trades.
    ///
    /// `now` is the assembly clock so `time_since_whale_secs` is measured
    /// against the same instant as every other snapshot field.
    #[must_use]
    pub fn from_trades(trades: &[Trade], now: DateTime<Utc>) -> Self {
        let mut out = Self::default();
        let total_volume: f64 = trades.iter().map(|t| t.size).sum();
        let mut last_whale: Option<&Trade> = None;

        for t in trades.iter().filter(|t| t.is_whale()) {
            out.whale_count += 1;
            out.whale_volume += t.size;
            match t.side {
                Side::Buy => out.whale_buy_volume += t.size,
                Side::Sell => out.whale_sell_volume += t.size,
            }
            if last_whale.map_or(true, |w| t.at >= w.at) {
                last_whale = Some(t);
            }
        }

        out.whale_net_flow = out.whale_buy_volume - out.whale_sell_volume;
        if out.whale_volume > 0.0 {
            out.whale_buy_ratio = out.whale_buy_volume / out.whale_volume;
        }
        if total_volume > 0.0 {
            out.pct_volume_from_whales = out.whale_volume / total_volume;
        }
        if let Some(w) = last_whale {
            out.time_since_whale_secs = Some((now - w.at).num_seconds());
            out.last_whale_side = Some(w.side);
        }
        out
    }
}
