//! Per-market trade ring buffer.
//!
//! Each subscribed market gets a bounded FIFO of recent trades with both a
//! capacity cap and a wall-clock TTL. The buffer is the sole source for the
//! trade-flow and whale fields on a snapshot: a market that is not
//! subscribed simply has no entry, and those snapshot fields stay null.
//!
//! Concurrency: one writer per market (that market's WebSocket connection),
//! any number of readers. `DashMap` shards the per-market windows so reads
//! across markets never contend.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::collector::BufferConfig;
use crate::domain::{FlowMetrics, MarketId, Trade, WhaleMetrics};

struct MarketWindow {
    trades: VecDeque<Trade>,
    last_event_at: DateTime<Utc>,
}

/// Bounded in-memory window of recent trades for every subscribed market.
pub struct TradeRingBuffer {
    windows: DashMap<MarketId, MarketWindow>,
    capacity: usize,
    ttl: Duration,
}

impl TradeRingBuffer {
    #[must_use]
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: config.capacity.max(1),
            ttl: Duration::seconds(config.ttl_secs as i64),
        }
    }

    /// Append a trade, evicting the oldest entries past capacity and any
    /// entries older than the TTL. O(1) amortized.
    pub fn push(&self, trade: Trade) {
        let now = trade.at;
        let mut window = self
            .windows
            .entry(trade.market_id.clone())
            .or_insert_with(|| MarketWindow {
                trades: VecDeque::with_capacity(64),
                last_event_at: now,
            });
        window.last_event_at = now;
        window.trades.push_back(trade);
        while window.trades.len() > self.capacity {
            window.trades.pop_front();
        }
        // TTL pruning piggybacks on pushes; FIFO order means expired trades
        // are always at the front.
        let cutoff = now - self.ttl;
        while window.trades.front().map_or(false, |t| t.at < cutoff) {
            window.trades.pop_front();
        }
    }

    /// All trades for `market` within `now - window`, oldest first.
    ///
    /// Empty (not an error) for unsubscribed markets.
    #[must_use]
    pub fn recent(&self, market: &MarketId, window: Duration, now: DateTime<Utc>) -> Vec<Trade> {
        let Some(entry) = self.windows.get(market) else {
            return Vec::new();
        };
        let cutoff = now - window;
        entry
            .trades
            .iter()
            .filter(|t| t.at >= cutoff && t.at <= now)
            .cloned()
            .collect()
    }

    /// Heartbeat: when the buffer last saw any event for `market`.
    #[must_use]
    pub fn last_event_at(&self, market: &MarketId) -> Option<DateTime<Utc>> {
        self.windows.get(market).map(|w| w.last_event_at)
    }

    /// True when the buffer holds a window for `market` (i.e. it has been
    /// subscribed at some point within the TTL).
    #[must_use]
    pub fn is_tracked(&self, market: &MarketId) -> bool {
        self.windows.contains_key(market)
    }

    /// Flow aggregates over the trailing hour. `None` when the market is not
    /// tracked; `Some` with zeroed metrics when tracked but quiet.
    #[must_use]
    pub fn flow_1h(&self, market: &MarketId, now: DateTime<Utc>) -> Option<FlowMetrics> {
        if !self.is_tracked(market) {
            return None;
        }
        Some(FlowMetrics::from_trades(&self.recent(
            market,
            Duration::hours(1),
            now,
        )))
    }

    /// Whale aggregates over the trailing hour. Same tracking semantics as
    /// [`Self::flow_1h`].
    #[must_use]
    pub fn whale_1h(&self, market: &MarketId, now: DateTime<Utc>) -> Option<WhaleMetrics> {
        if !self.is_tracked(market) {
            return None;
        }
        Some(WhaleMetrics::from_trades(
            &self.recent(market, Duration::hours(1), now),
            now,
        ))
    }

    /// Drop windows whose last event predates the TTL. Called by the stale
    /// sweeper so unsubscribed markets do not pin memory.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let before = self.windows.len();
        self.windows.retain(|_, w| w.last_event_at >= cutoff);
        before - self.windows.len()
    }

    /// Number of markets currently tracked.
    #[must_use]
    pub fn tracked_markets(&self) -> usize {
        self.windows.len()
    }
}
