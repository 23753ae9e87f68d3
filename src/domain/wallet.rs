//! Per-strategy wallet accounting and the global paper balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Capital accounting for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyWallet {
    pub strategy: String,
    /// Capital allocated to this strategy at startup.
    pub allocated: Decimal,
    /// Capital currently free to deploy.
    pub available: Decimal,
    pub realized_pnl: Decimal,
    pub trade_count: u32,
    pub wins: u32,
    pub losses: u32,
    /// Largest observed decline of `equity()` from its running peak.
    pub max_drawdown: Decimal,
    peak_equity: Decimal,
}

impl StrategyWallet {
    #[must_use]
    pub fn new(strategy: impl Into<String>, allocated: Decimal) -> Self {
        Self {
            strategy: strategy.into(),
            allocated,
            available: allocated,
            realized_pnl: Decimal::ZERO,
            trade_count: 0,
            wins: 0,
            losses: 0,
            max_drawdown: Decimal::ZERO,
            peak_equity: allocated,
        }
    }

    /// Available capital plus capital deployed in open positions.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        self.allocated + self.realized_pnl
    }

    /// Reserve `cost` for a new fill. Returns false (without mutating) when
    /// the wallet cannot cover it.
    pub fn debit(&mut self, cost: Decimal) -> bool {
        if cost > self.available {
            return false;
        }
        self.available -= cost;
        self.trade_count += 1;
        true
    }

    /// Return capital after a settlement or exit: the original cost basis
    /// comes back plus the realized `pnl`.
    pub fn settle(&mut self, cost_basis: Decimal, pnl: Decimal) {
        self.available += cost_basis + pnl;
        self.realized_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
        }
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        } else {
            let dd = self.peak_equity - equity;
            if dd > self.max_drawdown {
                self.max_drawdown = dd;
            }
        }
    }
}

/// Global paper balance aggregated over all strategy wallets.
///
/// Tracks the high-water mark that feeds the portfolio drawdown check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperBalance {
    pub balance: Decimal,
    pub high_water_mark: Decimal,
    pub fees_paid: Decimal,
}

impl PaperBalance {
    #[must_use]
    pub fn new(starting: Decimal) -> Self {
        Self {
            balance: starting,
            high_water_mark: starting,
            fees_paid: Decimal::ZERO,
        }
    }

    /// Apply a realized P&L delta, ratcheting the high-water mark.
    pub fn apply_pnl(&mut self, pnl: Decimal) {
        self.balance += pnl;
        if self.balance > self.high_water_mark {
            self.high_water_mark = self.balance;
        }
    }

    /// Record fees separately from P&L.
    pub fn apply_fees(&mut self, fees: Decimal) {
        self.fees_paid += fees;
        self.balance -= fees;
    }

    /// Fractional decline from the high-water mark, in [0, 1].
    #[must_use]
    pub fn drawdown(&self) -> Decimal {
        if self.high_water_mark.is_zero() {
            return Decimal::ZERO;
        }
        let dd = (self.high_water_mark - self.balance) / self.high_water_mark;
        dd.max(Decimal::ZERO)
    }
}
