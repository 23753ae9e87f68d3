//! Market lifecycle types: urgency tiers, outcomes, and tier transitions.
//!
//! A [`Market`] is a binary prediction contract with YES and NO sides. Every
//! tracked market carries an urgency [`Tier`] derived from its time to
//! resolution; the tier controls snapshot cadence, orderbook collection, and
//! WebSocket subscription eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MarketId, TokenId};

/// Terminal outcome assigned to a resolved market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
    Invalid,
}

impl Outcome {
    /// Stable string form used in persistence and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Invalid => "INVALID",
        }
    }

    /// Parse a venue outcome label (case-insensitive). Returns `None` for
    /// anything other than an unambiguous YES/NO/INVALID.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            "INVALID" => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Side of a binary market or of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parse a venue side label (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Collection urgency tier. Higher means closer to resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    T0,
    T1,
    T2,
    T3,
    T4,
}

impl Tier {
    /// All tiers, lowest urgency first.
    pub const ALL: [Tier; 5] = [Tier::T0, Tier::T1, Tier::T2, Tier::T3, Tier::T4];

    /// Classify a market by hours to close.
    ///
    /// Callers must handle expiry (`hours_to_close <= 0`) before calling;
    /// non-positive values land in T4 here since they are the most urgent.
    #[must_use]
    pub fn from_hours_to_close(hours: f64) -> Self {
        if hours < 1.0 {
            Self::T4
        } else if hours < 4.0 {
            Self::T3
        } else if hours < 12.0 {
            Self::T2
        } else if hours < 48.0 {
            Self::T1
        } else {
            Self::T0
        }
    }

    /// Numeric form for persistence and transition records.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::T0 => 0,
            Self::T1 => 1,
            Self::T2 => 2,
            Self::T3 => 3,
            Self::T4 => 4,
        }
    }

    /// Inverse of [`Tier::as_i32`].
    #[must_use]
    pub const fn from_i32(n: i32) -> Option<Self> {
        match n {
            0 => Some(Self::T0),
            1 => Some(Self::T1),
            2 => Some(Self::T2),
            3 => Some(Self::T3),
            4 => Some(Self::T4),
            _ => None,
        }
    }

    /// Snapshot interval for this tier.
    #[must_use]
    pub const fn snapshot_interval(self) -> std::time::Duration {
        let secs = match self {
            Self::T0 => 3600,
            Self::T1 => 300,
            Self::T2 => 60,
            Self::T3 => 30,
            Self::T4 => 15,
        };
        std::time::Duration::from_secs(secs)
    }

    /// Whether snapshots at this tier include the orderbook section.
    #[must_use]
    pub const fn collects_orderbook(self) -> bool {
        matches!(self, Self::T2 | Self::T3 | Self::T4)
    }

    /// How long a market at this tier may go without a trade before the
    /// stale sweeper deactivates it.
    #[must_use]
    pub fn stale_after(self) -> chrono::Duration {
        match self {
            Self::T4 => chrono::Duration::hours(1),
            Self::T3 => chrono::Duration::hours(6),
            Self::T2 => chrono::Duration::days(1),
            Self::T1 => chrono::Duration::days(3),
            Self::T0 => chrono::Duration::days(7),
        }
    }
}

/// Why a market changed tier or left the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Promotion,
    Demotion,
    Resolved,
    Expired,
    NoTrades,
    Delisted,
}

impl TransitionReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Promotion => "promotion",
            Self::Demotion => "demotion",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
            Self::NoTrades => "no_trades",
            Self::Delisted => "delisted",
        }
    }

    /// True when the transition removed the market from active tracking.
    #[must_use]
    pub const fn is_deactivation(self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::Expired | Self::NoTrades | Self::Delisted
        )
    }
}

/// Record of one tier change. Deactivations use `to_tier = -1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTransition {
    pub market_id: MarketId,
    pub from_tier: i32,
    pub to_tier: i32,
    pub at: DateTime<Utc>,
    pub hours_to_close: f64,
    pub reason: TransitionReason,
}

/// A tracked binary prediction market.
///
/// Invariants:
/// - `condition_id` and the token ids never change after first sight.
/// - Once `resolved` is set with an outcome, both are immutable.
/// - `tier` only moves through [`TierTransition`] records.
#[derive(Debug, Clone)]
pub struct Market {
    pub condition_id: MarketId,
    pub slug: String,
    pub question: String,
    pub yes_token_id: Option<TokenId>,
    pub no_token_id: Option<TokenId>,
    pub end_date: DateTime<Utc>,
    pub category: Option<String>,
    /// Price/volume/liquidity captured the first time the market was seen.
    pub initial_price: Option<f64>,
    pub initial_volume: Option<f64>,
    pub initial_liquidity: Option<f64>,
    pub active: bool,
    pub closed: bool,
    pub resolved: bool,
    pub outcome: Option<Outcome>,
    pub tier: Tier,
    pub tracked_since: DateTime<Utc>,
    pub snapshot_count: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl Market {
    /// Hours remaining until the market's end date. Negative once expired.
    #[must_use]
    pub fn hours_to_close(&self, now: DateTime<Utc>) -> f64 {
        (self.end_date - now).num_milliseconds() as f64 / 3_600_000.0
    }

    /// True when the market should still be snapshotted.
    #[must_use]
    pub const fn is_collectable(&self) -> bool {
        self.active && !self.resolved
    }

    /// Assign the terminal outcome. No-op if already resolved; outcomes are
    /// immutable once set.
    pub fn resolve(&mut self, outcome: Outcome) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        self.closed = true;
        self.outcome = Some(outcome);
    }
}
