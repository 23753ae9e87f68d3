//! In-memory store for tests and read-only tooling.
//!
//! Mirrors the SQLite store's semantics (upsert keys, ordering, open-set
//! filtering) without touching disk.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{
    Book, Fill, Market, MarketId, PaperBalance, Position, Signal, Snapshot, StrategyWallet,
    Trade, TradeDecision, TierTransition,
};
use crate::error::Result;

use super::{Store, TaskRun};

/// Recorded fill row (signal id, fill, paper flag).
pub type ExecutorTradeRecord = (String, Fill, bool);

#[derive(Default)]
struct Inner {
    markets: HashMap<MarketId, Market>,
    snapshots: HashMap<MarketId, Vec<Snapshot>>,
    trades: Vec<Trade>,
    whale_events: Vec<Trade>,
    orderbook_snapshots: Vec<(MarketId, DateTime<Utc>)>,
    tier_transitions: Vec<TierTransition>,
    task_runs: Vec<TaskRun>,
    positions: HashMap<String, Position>,
    signals: Vec<Signal>,
    decisions: Vec<TradeDecision>,
    executor_trades: Vec<ExecutorTradeRecord>,
    strategy_balances: HashMap<String, StrategyWallet>,
    paper_balance: Option<PaperBalance>,
}

/// Thread-safe in-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Inspection helpers for assertions.

    #[must_use]
    pub fn snapshot_count(&self, market: &MarketId) -> usize {
        self.inner
            .lock()
            .snapshots
            .get(market)
            .map_or(0, Vec::len)
    }

    #[must_use]
    pub fn tier_transitions(&self) -> Vec<TierTransition> {
        self.inner.lock().tier_transitions.clone()
    }

    #[must_use]
    pub fn decisions(&self) -> Vec<TradeDecision> {
        self.inner.lock().decisions.clone()
    }

    #[must_use]
    pub fn signals(&self) -> Vec<Signal> {
        self.inner.lock().signals.clone()
    }

    #[must_use]
    pub fn executor_trades(&self) -> Vec<ExecutorTradeRecord> {
        self.inner.lock().executor_trades.clone()
    }

    #[must_use]
    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().trades.clone()
    }

    #[must_use]
    pub fn whale_events(&self) -> Vec<Trade> {
        self.inner.lock().whale_events.clone()
    }

    #[must_use]
    pub fn task_runs(&self) -> Vec<TaskRun> {
        self.inner.lock().task_runs.clone()
    }

    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.inner.lock().positions.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_market(&self, market: &Market) -> Result<()> {
        self.inner
            .lock()
            .markets
            .insert(market.condition_id.clone(), market.clone());
        Ok(())
    }

    async fn load_markets(&self) -> Result<Vec<Market>> {
        Ok(self.inner.lock().markets.values().cloned().collect())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner
            .lock()
            .snapshots
            .entry(snapshot.market_id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self, market: &MarketId) -> Result<Option<Snapshot>> {
        Ok(self
            .inner
            .lock()
            .snapshots
            .get(market)
            .and_then(|v| v.iter().max_by_key(|s| s.at).cloned()))
    }

    async fn snapshot_prices(&self, market: &MarketId, limit: usize) -> Result<Vec<f64>> {
        let inner = self.inner.lock();
        let Some(all) = inner.snapshots.get(market) else {
            return Ok(Vec::new());
        };
        let mut sorted: Vec<&Snapshot> = all.iter().collect();
        sorted.sort_by_key(|s| s.at);
        let start = sorted.len().saturating_sub(limit);
        Ok(sorted[start..].iter().map(|s| s.price).collect())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.inner.lock().trades.push(trade.clone());
        Ok(())
    }

    async fn insert_whale_event(&self, trade: &Trade) -> Result<()> {
        self.inner.lock().whale_events.push(trade.clone());
        Ok(())
    }

    async fn insert_orderbook_snapshot(
        &self,
        market: &MarketId,
        _book: &Book,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .lock()
            .orderbook_snapshots
            .push((market.clone(), at));
        Ok(())
    }

    async fn insert_tier_transition(&self, transition: &TierTransition) -> Result<()> {
        self.inner.lock().tier_transitions.push(transition.clone());
        Ok(())
    }

    async fn record_task_run(&self, run: &TaskRun) -> Result<()> {
        self.inner.lock().task_runs.push(run.clone());
        Ok(())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        self.inner
            .lock()
            .positions
            .insert(position.id.clone(), position.clone());
        Ok(())
    }

    async fn load_open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .inner
            .lock()
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        self.inner.lock().signals.push(signal.clone());
        Ok(())
    }

    async fn insert_decision(&self, decision: &TradeDecision) -> Result<()> {
        self.inner.lock().decisions.push(decision.clone());
        Ok(())
    }

    async fn insert_executor_trade(&self, signal_id: &str, fill: &Fill, paper: bool) -> Result<()> {
        self.inner
            .lock()
            .executor_trades
            .push((signal_id.to_owned(), fill.clone(), paper));
        Ok(())
    }

    async fn upsert_strategy_balance(&self, wallet: &StrategyWallet) -> Result<()> {
        self.inner
            .lock()
            .strategy_balances
            .insert(wallet.strategy.clone(), wallet.clone());
        Ok(())
    }

    async fn load_strategy_balances(&self) -> Result<Vec<StrategyWallet>> {
        Ok(self
            .inner
            .lock()
            .strategy_balances
            .values()
            .cloned()
            .collect())
    }

    async fn upsert_paper_balance(&self, balance: &PaperBalance) -> Result<()> {
        self.inner.lock().paper_balance = Some(*balance);
        Ok(())
    }

    async fn load_paper_balance(&self) -> Result<Option<PaperBalance>> {
        Ok(self.inner.lock().paper_balance)
    }
}
