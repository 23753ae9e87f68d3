//! Shared trading-engine state: wallets, positions, and the paper balance.
//!
//! One container owned by the application and passed by reference to the
//! risk gate, executor, engine loop, and reaper. Wallet and position
//! mutations are serialized behind the container's locks; risk decisions
//! for a single strategy are additionally serialized by the engine loop
//! scanning strategies sequentially.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{Fill, MarketId, PaperBalance, Position, Signal, StrategyWallet, TokenId};
use crate::error::{Error, Result};
use crate::store::Store;

/// Wallets, open/closed positions, and the aggregate paper balance.
pub struct EngineState {
    wallets: Mutex<HashMap<String, StrategyWallet>>,
    positions: Mutex<HashMap<String, Position>>,
    paper: Mutex<PaperBalance>,
}

impl EngineState {
    #[must_use]
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            wallets: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            paper: Mutex::new(PaperBalance::new(starting_balance)),
        }
    }

    /// Restore wallets, open positions, and the paper balance from the
    /// store. Called once at startup.
    pub async fn hydrate(&self, store: &Arc<dyn Store>) -> Result<()> {
        for wallet in store.load_strategy_balances().await? {
            self.wallets.lock().insert(wallet.strategy.clone(), wallet);
        }
        for position in store.load_open_positions().await? {
            self.positions.lock().insert(position.id.clone(), position);
        }
        if let Some(paper) = store.load_paper_balance().await? {
            *self.paper.lock() = paper;
        }
        info!(
            wallets = self.wallets.lock().len(),
            open_positions = self.open_position_count(),
            "Engine state hydrated"
        );
        Ok(())
    }

    /// Create a wallet for `strategy` if none exists yet.
    pub fn ensure_wallet(&self, strategy: &str, allocation: Decimal) {
        self.wallets
            .lock()
            .entry(strategy.to_owned())
            .or_insert_with(|| StrategyWallet::new(strategy, allocation));
    }

    #[must_use]
    pub fn wallet(&self, strategy: &str) -> Option<StrategyWallet> {
        self.wallets.lock().get(strategy).cloned()
    }

    #[must_use]
    pub fn wallets(&self) -> Vec<StrategyWallet> {
        self.wallets.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn paper_balance(&self) -> PaperBalance {
        *self.paper.lock()
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn open_position_count(&self) -> usize {
        self.positions.lock().values().filter(|p| p.is_open()).count()
    }

    /// Combined cost basis of all open positions.
    #[must_use]
    pub fn total_exposure(&self) -> Decimal {
        self.positions
            .lock()
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.cost_basis)
            .sum()
    }

    /// True when `strategy` already holds an open position on this
    /// (market, token) pair. Deduplication is per strategy, not global.
    #[must_use]
    pub fn has_open(&self, strategy: &str, market: &MarketId, token: &TokenId) -> bool {
        self.positions.lock().values().any(|p| {
            p.is_open() && p.strategy == strategy && &p.market_id == market && &p.token_id == token
        })
    }

    /// Update a position's mark price.
    pub fn mark_position(&self, position_id: &str, price: Decimal) {
        if let Some(position) = self.positions.lock().get_mut(position_id) {
            position.mark(price);
        }
    }

    /// Settle a fill into a position: create a new one, or augment the
    /// strategy's existing open position on the same (market, token).
    /// Debits the strategy wallet by the fill cost and books fees against
    /// the paper balance.
    pub fn apply_fill(
        &self,
        signal: &Signal,
        fill: &Fill,
        paper: bool,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        {
            let mut wallets = self.wallets.lock();
            let wallet = wallets.get_mut(&signal.strategy).ok_or_else(|| {
                Error::Execution(format!("no wallet for strategy {}", signal.strategy))
            })?;
            if !wallet.debit(fill.cost) {
                return Err(Error::Execution(format!(
                    "wallet {} cannot cover fill cost {}",
                    signal.strategy, fill.cost
                )));
            }
        }
        if !fill.fees.is_zero() {
            self.paper.lock().apply_fees(fill.fees);
        }

        let mut positions = self.positions.lock();
        let existing = positions.values_mut().find(|p| {
            p.is_open()
                && p.strategy == signal.strategy
                && p.market_id == signal.market_id
                && p.token_id == signal.token_id
        });
        let position = match existing {
            Some(position) => {
                position.add_fill(fill.price, fill.shares, fill.fees);
                position.clone()
            }
            None => {
                let position = Position::open(
                    signal.strategy.clone(),
                    signal.market_id.clone(),
                    signal.token_id.clone(),
                    signal.side,
                    fill.price,
                    fill.shares,
                    fill.fees,
                    now,
                    paper,
                );
                positions.insert(position.id.clone(), position.clone());
                position
            }
        };
        Ok(position)
    }

    /// Close a position at `exit_price`, realizing P&L into the strategy
    /// wallet and the paper balance. Returns the closed position and the
    /// realized P&L.
    pub fn settle_position(
        &self,
        position_id: &str,
        exit_price: Decimal,
        fees: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Position, Decimal)> {
        let (position, pnl, cost_basis, strategy) = {
            let mut positions = self.positions.lock();
            let position = positions
                .get_mut(position_id)
                .ok_or_else(|| Error::Execution(format!("unknown position {position_id}")))?;
            if !position.is_open() {
                return Err(Error::Execution(format!(
                    "position {position_id} already closed"
                )));
            }
            let cost_basis = position.cost_basis;
            let pnl = position.close(exit_price, fees, now);
            (position.clone(), pnl, cost_basis, position.strategy.clone())
        };

        {
            let mut wallets = self.wallets.lock();
            if let Some(wallet) = wallets.get_mut(&strategy) {
                wallet.settle(cost_basis, pnl);
            }
        }
        {
            let mut paper = self.paper.lock();
            paper.apply_pnl(pnl);
            if !fees.is_zero() {
                paper.apply_fees(fees);
            }
        }
        Ok((position, pnl))
    }

    /// Mirror current wallet and balance rows to the store.
    pub async fn persist_balances(&self, store: &Arc<dyn Store>) -> Result<()> {
        for wallet in self.wallets() {
            store.upsert_strategy_balance(&wallet).await?;
        }
        store.upsert_paper_balance(&self.paper_balance()).await?;
        Ok(())
    }
}

/// Exit price for a settled binary position.
///
/// YES tokens pay 1 on YES and 0 on NO; NO tokens are symmetric; INVALID
/// settles both sides at the configured recovery price.
#[must_use]
pub fn terminal_price(
    token_is_yes: bool,
    outcome: crate::domain::Outcome,
    invalid_recovery: Decimal,
) -> Decimal {
    use crate::domain::Outcome;
    match (outcome, token_is_yes) {
        (Outcome::Yes, true) | (Outcome::No, false) => Decimal::ONE,
        (Outcome::Yes, false) | (Outcome::No, true) => Decimal::ZERO,
        (Outcome::Invalid, _) => invalid_recovery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, Outcome, Side};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn signal(strategy: &str, market: &str, token: &str) -> Signal {
        Signal::new(
            strategy,
            "v1",
            MarketId::from(market),
            TokenId::from(token),
            Side::Buy,
            "test",
            0.05,
            0.8,
            dec!(0.40),
            now(),
        )
    }

    fn fill(price: Decimal, shares: Decimal) -> Fill {
        Fill {
            order_id: OrderId::generate(),
            price,
            shares,
            cost: price * shares,
            fees: Decimal::ZERO,
            slippage: Decimal::ZERO,
            at: now(),
        }
    }

    fn state_with_wallet(strategy: &str, allocation: Decimal) -> EngineState {
        let state = EngineState::new(dec!(5000));
        state.ensure_wallet(strategy, allocation);
        state
    }

    #[test]
    fn apply_fill_creates_then_augments() {
        let state = state_with_wallet("s1", dec!(500));
        let sig = signal("s1", "m", "t");

        let p1 = state
            .apply_fill(&sig, &fill(dec!(0.40), dec!(100)), true, now())
            .unwrap();
        assert_eq!(p1.cost_basis, dec!(40.00));

        let p2 = state
            .apply_fill(&sig, &fill(dec!(0.50), dec!(100)), true, now())
            .unwrap();
        assert_eq!(p2.id, p1.id);
        assert_eq!(p2.size_shares, dec!(200));
        assert_eq!(p2.avg_entry_price, dec!(0.45));
        assert_eq!(state.open_position_count(), 1);
        assert_eq!(state.wallet("s1").unwrap().available, dec!(410.00));
    }

    #[test]
    fn apply_fill_fails_without_wallet_cover() {
        let state = state_with_wallet("s1", dec!(10));
        let sig = signal("s1", "m", "t");
        let result = state.apply_fill(&sig, &fill(dec!(0.40), dec!(100)), true, now());
        assert!(result.is_err());
        // Wallet untouched on failure.
        assert_eq!(state.wallet("s1").unwrap().available, dec!(10));
        assert_eq!(state.open_position_count(), 0);
    }

    #[test]
    fn settlement_scenario_yes_resolution() {
        // 100 shares YES at 0.40; market resolves YES.
        let state = state_with_wallet("s1", dec!(500));
        let sig = signal("s1", "m", "m-yes");
        let position = state
            .apply_fill(&sig, &fill(dec!(0.40), dec!(100)), true, now())
            .unwrap();

        let exit = terminal_price(true, Outcome::Yes, dec!(0.5));
        let (closed, pnl) = state
            .settle_position(&position.id, exit, Decimal::ZERO, now())
            .unwrap();

        assert_eq!(pnl, dec!(60.00));
        assert_eq!(closed.status, crate::domain::PositionStatus::Closed);
        let wallet = state.wallet("s1").unwrap();
        assert_eq!(wallet.realized_pnl, dec!(60.00));
        assert_eq!(wallet.wins, 1);
        assert_eq!(state.paper_balance().balance, dec!(5060));
        assert_eq!(state.open_position_count(), 0);
    }

    #[test]
    fn terminal_prices_cover_all_outcomes() {
        let recovery = dec!(0.5);
        assert_eq!(terminal_price(true, Outcome::Yes, recovery), Decimal::ONE);
        assert_eq!(terminal_price(true, Outcome::No, recovery), Decimal::ZERO);
        assert_eq!(terminal_price(false, Outcome::Yes, recovery), Decimal::ZERO);
        assert_eq!(terminal_price(false, Outcome::No, recovery), Decimal::ONE);
        assert_eq!(terminal_price(true, Outcome::Invalid, recovery), recovery);
        assert_eq!(terminal_price(false, Outcome::Invalid, recovery), recovery);
    }

    #[test]
    fn dedup_is_per_strategy() {
        let state = state_with_wallet("s1", dec!(500));
        state.ensure_wallet("s2", dec!(500));
        let sig = signal("s1", "m", "t");
        state
            .apply_fill(&sig, &fill(dec!(0.40), dec!(10)), true, now())
            .unwrap();

        assert!(state.has_open("s1", &MarketId::from("m"), &TokenId::from("t")));
        assert!(!state.has_open("s2", &MarketId::from("m"), &TokenId::from("t")));
        assert!(!state.has_open("s1", &MarketId::from("m"), &TokenId::from("other")));
    }

    #[test]
    fn double_settlement_is_rejected() {
        let state = state_with_wallet("s1", dec!(500));
        let sig = signal("s1", "m", "t");
        let position = state
            .apply_fill(&sig, &fill(dec!(0.40), dec!(100)), true, now())
            .unwrap();
        state
            .settle_position(&position.id, Decimal::ONE, Decimal::ZERO, now())
            .unwrap();
        assert!(state
            .settle_position(&position.id, Decimal::ONE, Decimal::ZERO, now())
            .is_err());
    }
}
