//! Strategy signals, risk decisions, and fills.
//!
//! A [`Signal`] is immutable once emitted. Every signal is paired with a
//! [`TradeDecision`] from the risk gate, and approved signals that execute
//! gain a [`Fill`]. All three flow into the append-only decision ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{MarketId, OrderId, TokenId};
use super::market::Side;

/// Output of one strategy scan: a proposed trade with its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Stable identifier (UUID v4).
    pub id: String,
    pub strategy: String,
    /// Change-fingerprint of the emitting strategy's configuration.
    pub strategy_version: String,
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub side: Side,
    pub reason: String,
    /// Estimated expected return per unit of price, in [0, 1].
    pub edge: f64,
    /// Self-reported probability estimate for the thesis, in [0, 1].
    pub confidence: f64,
    /// Strategy's suggested notional, if it has an opinion.
    pub suggested_size: Option<Decimal>,
    /// Reference price observed when the signal was formed.
    pub signal_price: Decimal,
    pub at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl Signal {
    /// Construct a signal with a fresh id and empty metadata.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        strategy: impl Into<String>,
        strategy_version: impl Into<String>,
        market_id: MarketId,
        token_id: TokenId,
        side: Side,
        reason: impl Into<String>,
        edge: f64,
        confidence: f64,
        signal_price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy: strategy.into(),
            strategy_version: strategy_version.into(),
            market_id,
            token_id,
            side,
            reason: reason.into(),
            edge,
            confidence,
            suggested_size: None,
            signal_price,
            at,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry (builder style).
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// How an approved signal should be worked by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Cross the spread immediately.
    #[default]
    Market,
    /// Post at mid +/- an offset and wait for a fill.
    Limit,
    /// Post passively to capture the spread, escalating to marketable on
    /// timeout.
    Spread,
}

impl OrderType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Spread => "spread",
        }
    }
}

/// Why the risk gate rejected a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DrawdownExceeded,
    InsufficientStrategyBalance,
    MaxPositions,
    MaxTotalExposure,
    MaxPositionSize,
    DuplicatePosition,
    /// Sizing produced a zero or negative notional; nothing to trade.
    NonPositiveSize,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DrawdownExceeded => "drawdown_exceeded",
            Self::InsufficientStrategyBalance => "insufficient_strategy_balance",
            Self::MaxPositions => "max_positions",
            Self::MaxTotalExposure => "max_total_exposure",
            Self::MaxPositionSize => "max_position_usd",
            Self::DuplicatePosition => "duplicate_position",
            Self::NonPositiveSize => "non_positive_size",
        }
    }
}

/// Risk-gate verdict paired with a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    /// Approved with the size the gate settled on.
    Approved { size_usd: Decimal },
    Rejected { reason: RejectReason },
}

impl DecisionOutcome {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// One ledger entry: the signal and what the gate decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub id: String,
    pub signal: Signal,
    pub outcome: DecisionOutcome,
    pub at: DateTime<Utc>,
}

impl TradeDecision {
    #[must_use]
    pub fn new(signal: Signal, outcome: DecisionOutcome, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signal,
            outcome,
            at,
        }
    }
}

/// Result of an order reaching the venue (or the paper simulator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub price: Decimal,
    pub shares: Decimal,
    /// `price * shares`, what the wallet is debited.
    pub cost: Decimal,
    pub fees: Decimal,
    /// Execution price minus the signal's reference price, signed.
    pub slippage: Decimal,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn signals_get_unique_ids() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let make = || {
            Signal::new(
                "longshot-a",
                "v1",
                MarketId::from("m"),
                TokenId::from("t"),
                Side::Buy,
                "favored side above threshold",
                0.05,
                0.9,
                dec!(0.93),
                at,
            )
        };
        assert_ne!(make().id, make().id);
    }

    #[test]
    fn reject_reasons_have_stable_labels() {
        assert_eq!(RejectReason::DrawdownExceeded.as_str(), "drawdown_exceeded");
        assert_eq!(RejectReason::MaxPositions.as_str(), "max_positions");
        assert_eq!(
            RejectReason::DuplicatePosition.as_str(),
            "duplicate_position"
        );
    }

    #[test]
    fn metadata_builder_appends() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let s = Signal::new(
            "whale-fade",
            "v1",
            MarketId::from("m"),
            TokenId::from("t"),
            Side::Sell,
            "fading last whale",
            0.02,
            0.6,
            dec!(0.55),
            at,
        )
        .with_meta("whale_side", "BUY");
        assert_eq!(s.metadata.get("whale_side").map(String::as_str), Some("BUY"));
    }
}
