//! Position lifecycle and arithmetic.
//!
//! Positions use `Decimal` throughout: entry averaging, cost basis, and
//! realized P&L must be exact so that settlement figures reconcile against
//! wallet balances to the cent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{MarketId, TokenId};
use super::market::Side;

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    /// Partially reduced but not flat.
    Partial,
    Closed,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Closed => "closed",
        }
    }
}

/// An open or closed exposure owned by one strategy on one outcome token.
///
/// Invariants:
/// - `cost_basis == avg_entry_price * size_shares` while open;
/// - once `Closed`, `realized_pnl` is final and the position never reopens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Stable identifier (UUID v4).
    pub id: String,
    pub strategy: String,
    pub market_id: MarketId,
    pub token_id: TokenId,
    /// Which side of the market the token represents (YES = Buy exposure on
    /// the YES token).
    pub side: Side,
    pub avg_entry_price: Decimal,
    pub size_shares: Decimal,
    pub cost_basis: Decimal,
    /// Most recent mark price, if any snapshot has priced the token.
    pub current_mark: Option<Decimal>,
    pub status: PositionStatus,
    pub realized_pnl: Option<Decimal>,
    pub fees_paid: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub paper: bool,
}

impl Position {
    /// Open a new position from its first fill.
    #[must_use]
    pub fn open(
        strategy: impl Into<String>,
        market_id: MarketId,
        token_id: TokenId,
        side: Side,
        price: Decimal,
        shares: Decimal,
        fees: Decimal,
        at: DateTime<Utc>,
        paper: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy: strategy.into(),
            market_id,
            token_id,
            side,
            avg_entry_price: price,
            size_shares: shares,
            cost_basis: price * shares,
            current_mark: None,
            status: PositionStatus::Open,
            realized_pnl: None,
            fees_paid: fees,
            opened_at: at,
            closed_at: None,
            paper,
        }
    }

    /// Add a fill to an open position, recomputing the size-weighted average
    /// entry price.
    pub fn add_fill(&mut self, price: Decimal, shares: Decimal, fees: Decimal) {
        debug_assert!(self.status != PositionStatus::Closed);
        self.cost_basis += price * shares;
        self.size_shares += shares;
        if !self.size_shares.is_zero() {
            self.avg_entry_price = self.cost_basis / self.size_shares;
        }
        self.fees_paid += fees;
    }

    /// Update the mark price from the latest snapshot.
    pub fn mark(&mut self, price: Decimal) {
        self.current_mark = Some(price);
    }

    /// Unrealized P&L at the current mark; zero when unmarked.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        match self.current_mark {
            Some(mark) => mark * self.size_shares - self.cost_basis,
            None => Decimal::ZERO,
        }
    }

    /// Close the full position at `exit_price`, realizing P&L net of the
    /// closing `fees`. Returns the realized P&L.
    pub fn close(&mut self, exit_price: Decimal, fees: Decimal, at: DateTime<Utc>) -> Decimal {
        let pnl = exit_price * self.size_shares - self.cost_basis - fees;
        self.fees_paid += fees;
        self.realized_pnl = Some(pnl);
        self.status = PositionStatus::Closed;
        self.closed_at = Some(at);
        self.current_mark = Some(exit_price);
        pnl
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn yes_position(price: Decimal, shares: Decimal) -> Position {
        Position::open(
            "longshot-a",
            MarketId::from("m1"),
            TokenId::from("yes"),
            Side::Buy,
            price,
            shares,
            Decimal::ZERO,
            at(),
            true,
        )
    }

    #[test]
    fn open_sets_cost_basis() {
        let p = yes_position(dec!(0.40), dec!(100));
        assert_eq!(p.cost_basis, dec!(40.00));
        assert_eq!(p.avg_entry_price, dec!(0.40));
        assert!(p.is_open());
    }

    #[test]
    fn add_fill_recomputes_weighted_average() {
        let mut p = yes_position(dec!(0.40), dec!(100));
        p.add_fill(dec!(0.50), dec!(100), Decimal::ZERO);
        // cost = 40 + 50 = 90 over 200 shares
        assert_eq!(p.size_shares, dec!(200));
        assert_eq!(p.cost_basis, dec!(90.00));
        assert_eq!(p.avg_entry_price, dec!(0.45));
    }

    #[test]
    fn fills_accumulate_exactly() {
        let mut p = yes_position(dec!(0.30), dec!(10));
        p.add_fill(dec!(0.35), dec!(20), Decimal::ZERO);
        p.add_fill(dec!(0.25), dec!(30), Decimal::ZERO);
        let expected_cost = dec!(0.30) * dec!(10) + dec!(0.35) * dec!(20) + dec!(0.25) * dec!(30);
        assert_eq!(p.cost_basis, expected_cost);
        assert_eq!(p.size_shares, dec!(60));
        assert_eq!(p.avg_entry_price, expected_cost / dec!(60));
    }

    #[test]
    fn close_at_terminal_payoff_realizes_pnl() {
        // 100 shares YES at 0.40, market resolves YES -> +60
        let mut p = yes_position(dec!(0.40), dec!(100));
        let pnl = p.close(dec!(1.0), Decimal::ZERO, at());
        assert_eq!(pnl, dec!(60.00));
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.realized_pnl, Some(dec!(60.00)));
    }

    #[test]
    fn close_at_zero_loses_cost_basis() {
        let mut p = yes_position(dec!(0.40), dec!(100));
        let pnl = p.close(Decimal::ZERO, dec!(0.50), at());
        assert_eq!(pnl, dec!(-40.50));
    }

    #[test]
    fn unrealized_pnl_tracks_mark() {
        let mut p = yes_position(dec!(0.40), dec!(100));
        assert_eq!(p.unrealized_pnl(), Decimal::ZERO);
        p.mark(dec!(0.55));
        assert_eq!(p.unrealized_pnl(), dec!(15.00));
    }
}
