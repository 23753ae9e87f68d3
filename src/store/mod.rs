//! Durable persistence ports and implementations.
//!
//! The [`Store`] trait is the single persistence boundary for both the
//! collection pipeline and the trading engine. [`sqlite::SqliteStore`] is
//! the production implementation; [`memory::MemoryStore`] backs tests and
//! the read-only status command.

pub mod memory;
pub mod model;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Fill, Market, MarketId, PaperBalance, Position, Signal, Snapshot, StrategyWallet, Trade,
    TradeDecision, TierTransition,
};
use crate::error::Result;

/// Bookkeeping row for one scheduler loop invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `ok`, `error`, or `skipped`.
    pub outcome: String,
    pub detail: Option<String>,
}

impl TaskRun {
    #[must_use]
    pub fn ok(task: impl Into<String>, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            task: task.into(),
            started_at,
            finished_at,
            outcome: "ok".into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn error(
        task: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            started_at,
            finished_at,
            outcome: "error".into(),
            detail: Some(detail.into()),
        }
    }
}

/// Persistence boundary shared by every service.
///
/// Implementations must be safe for concurrent use; callers never assume
/// cross-call transactions.
#[async_trait]
pub trait Store: Send + Sync {
    // -- markets ---------------------------------------------------------

    /// Insert or update a market keyed by condition id.
    async fn upsert_market(&self, market: &Market) -> Result<()>;

    /// Load every known market (active or not).
    async fn load_markets(&self) -> Result<Vec<Market>>;

    // -- snapshots -------------------------------------------------------

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Most recent snapshot for a market, if any.
    async fn latest_snapshot(&self, market: &MarketId) -> Result<Option<Snapshot>>;

    /// Up to `limit` most recent snapshot prices, oldest first.
    async fn snapshot_prices(&self, market: &MarketId, limit: usize) -> Result<Vec<f64>>;

    // -- trades and whale events ----------------------------------------

    async fn insert_trade(&self, trade: &Trade) -> Result<()>;

    /// Record a whale-tier trade in the dedicated event table.
    async fn insert_whale_event(&self, trade: &Trade) -> Result<()>;

    // -- orderbook snapshots --------------------------------------------

    /// Persist a sparse orderbook observation (ladders as JSON plus derived
    /// totals).
    async fn insert_orderbook_snapshot(
        &self,
        market: &MarketId,
        book: &crate::domain::Book,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // -- tiering ---------------------------------------------------------

    async fn insert_tier_transition(&self, transition: &TierTransition) -> Result<()>;

    // -- scheduler bookkeeping ------------------------------------------

    async fn record_task_run(&self, run: &TaskRun) -> Result<()>;

    // -- engine ----------------------------------------------------------

    async fn upsert_position(&self, position: &Position) -> Result<()>;

    async fn load_open_positions(&self) -> Result<Vec<Position>>;

    async fn insert_signal(&self, signal: &Signal) -> Result<()>;

    async fn insert_decision(&self, decision: &TradeDecision) -> Result<()>;

    /// Record a fill produced by the executor.
    async fn insert_executor_trade(&self, signal_id: &str, fill: &Fill, paper: bool) -> Result<()>;

    async fn upsert_strategy_balance(&self, wallet: &StrategyWallet) -> Result<()>;

    async fn load_strategy_balances(&self) -> Result<Vec<StrategyWallet>>;

    async fn upsert_paper_balance(&self, balance: &PaperBalance) -> Result<()>;

    async fn load_paper_balance(&self) -> Result<Option<PaperBalance>>;
}
