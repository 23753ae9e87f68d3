//! SQLite store implementation (Diesel + r2d2).
//!
//! One connection pool, embedded migrations, text timestamps/decimals.
//! Methods are synchronous Diesel queries behind the async trait; SQLite
//! operations are short enough that the pipeline treats them as cheap
//! suspension points.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::domain::{
    Book, Fill, Market, MarketId, PaperBalance, Position, Signal, Snapshot, StrategyWallet,
    Trade, TradeDecision, TierTransition,
};
use crate::error::{Error, Result};

use super::model::{
    fmt_ts, parse_dec, MarketRow, NewExecutorTradeRow, NewOrderbookSnapshotRow, NewSignalRow,
    NewTaskRunRow, NewTierTransitionRow, NewTradeDecisionRow, NewTradeRow, NewWhaleEventRow,
    PaperBalanceRow, PositionRow, SnapshotRow, StrategyBalanceRow,
};
use super::schema;
use super::{Store, TaskRun};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Durable store backed by SQLite.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &str) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| Error::Connection(e.to_string()))?;

        let mut conn = pool.get().map_err(|e| Error::Connection(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| Error::Database(e.to_string()))?;
        info!(path, "SQLite store ready");

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }
}

fn db_err(e: diesel::result::Error) -> Error {
    Error::Database(e.to_string())
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_market(&self, market: &Market) -> Result<()> {
        let row = MarketRow::from(market);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::markets::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_markets(&self) -> Result<Vec<Market>> {
        let mut conn = self.conn()?;
        let rows: Vec<MarketRow> = schema::markets::table.load(&mut conn).map_err(db_err)?;
        rows.into_iter().map(Market::try_from).collect()
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let row = SnapshotRow::from(snapshot);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::snapshots::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn latest_snapshot(&self, market: &MarketId) -> Result<Option<Snapshot>> {
        use schema::snapshots::dsl;
        let mut conn = self.conn()?;
        let row: Option<SnapshotRow> = dsl::snapshots
            .filter(dsl::market_id.eq(market.as_str()))
            .order(dsl::timestamp.desc())
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(Snapshot::try_from).transpose()
    }

    async fn snapshot_prices(&self, market: &MarketId, limit: usize) -> Result<Vec<f64>> {
        use schema::snapshots::dsl;
        let mut conn = self.conn()?;
        let mut prices: Vec<f64> = dsl::snapshots
            .filter(dsl::market_id.eq(market.as_str()))
            .order(dsl::timestamp.desc())
            .limit(limit as i64)
            .select(dsl::price)
            .load(&mut conn)
            .map_err(db_err)?;
        prices.reverse();
        Ok(prices)
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let row = NewTradeRow::from(trade);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::trades::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_whale_event(&self, trade: &Trade) -> Result<()> {
        let row = NewWhaleEventRow::from(trade);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::whale_events::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_orderbook_snapshot(
        &self,
        market: &MarketId,
        book: &Book,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let levels = |side: &[crate::domain::PriceLevel]| {
            serde_json::to_string(
                &side
                    .iter()
                    .map(|l| (l.price, l.size))
                    .collect::<Vec<(f64, f64)>>(),
            )
            .unwrap_or_else(|_| "[]".into())
        };
        let row = NewOrderbookSnapshotRow {
            market_id: market.as_str().to_owned(),
            token_id: book.token_id().as_str().to_owned(),
            at: fmt_ts(at),
            bids: levels(book.bids()),
            asks: levels(book.asks()),
            bid_depth: book.bid_depth(usize::MAX),
            ask_depth: book.ask_depth(usize::MAX),
            bid_levels: book.bids().len() as i32,
            ask_levels: book.asks().len() as i32,
        };
        let mut conn = self.conn()?;
        diesel::insert_into(schema::orderbook_snapshots::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_tier_transition(&self, transition: &TierTransition) -> Result<()> {
        let row = NewTierTransitionRow::from(transition);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::tier_transitions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn record_task_run(&self, run: &TaskRun) -> Result<()> {
        let row = NewTaskRunRow {
            task: run.task.clone(),
            started_at: fmt_ts(run.started_at),
            finished_at: fmt_ts(run.finished_at),
            outcome: run.outcome.clone(),
            detail: run.detail.clone(),
        };
        let mut conn = self.conn()?;
        diesel::insert_into(schema::task_runs::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_position(&self, position: &Position) -> Result<()> {
        let row = PositionRow::from(position);
        let mut conn = self.conn()?;
        diesel::replace_into(schema::positions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_open_positions(&self) -> Result<Vec<Position>> {
        use schema::positions::dsl;
        let mut conn = self.conn()?;
        let rows: Vec<PositionRow> = dsl::positions
            .filter(dsl::status.ne("closed"))
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter().map(Position::try_from).collect()
    }

    async fn insert_signal(&self, signal: &Signal) -> Result<()> {
        let row = NewSignalRow::from(signal);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::signals::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_decision(&self, decision: &TradeDecision) -> Result<()> {
        let row = NewTradeDecisionRow::from(decision);
        let mut conn = self.conn()?;
        diesel::insert_into(schema::trade_decisions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_executor_trade(&self, signal_id: &str, fill: &Fill, paper: bool) -> Result<()> {
        let row = NewExecutorTradeRow {
            signal_id: signal_id.to_owned(),
            order_id: fill.order_id.as_str().to_owned(),
            price: fill.price.to_string(),
            shares: fill.shares.to_string(),
            cost: fill.cost.to_string(),
            fees: fill.fees.to_string(),
            slippage: fill.slippage.to_string(),
            at: fmt_ts(fill.at),
            paper,
        };
        let mut conn = self.conn()?;
        diesel::insert_into(schema::executor_trades::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_strategy_balance(&self, wallet: &StrategyWallet) -> Result<()> {
        let row = StrategyBalanceRow::from_wallet(wallet, Utc::now());
        let mut conn = self.conn()?;
        diesel::replace_into(schema::strategy_balances::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_strategy_balances(&self) -> Result<Vec<StrategyWallet>> {
        let mut conn = self.conn()?;
        let rows: Vec<StrategyBalanceRow> = schema::strategy_balances::table
            .load(&mut conn)
            .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let mut wallet =
                    StrategyWallet::new(row.strategy.clone(), parse_dec(&row.allocated)?);
                wallet.available = parse_dec(&row.available)?;
                wallet.realized_pnl = parse_dec(&row.realized_pnl)?;
                wallet.trade_count = row.trade_count.max(0) as u32;
                wallet.wins = row.wins.max(0) as u32;
                wallet.losses = row.losses.max(0) as u32;
                wallet.max_drawdown = parse_dec(&row.max_drawdown)?;
                Ok(wallet)
            })
            .collect()
    }

    async fn upsert_paper_balance(&self, balance: &PaperBalance) -> Result<()> {
        let row = PaperBalanceRow {
            id: 1,
            balance: balance.balance.to_string(),
            high_water_mark: balance.high_water_mark.to_string(),
            fees_paid: balance.fees_paid.to_string(),
            updated_at: fmt_ts(Utc::now()),
        };
        let mut conn = self.conn()?;
        diesel::replace_into(schema::paper_balances::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_paper_balance(&self) -> Result<Option<PaperBalance>> {
        use schema::paper_balances::dsl;
        let mut conn = self.conn()?;
        let row: Option<PaperBalanceRow> = dsl::paper_balances
            .find(1)
            .first(&mut conn)
            .optional()
            .map_err(db_err)?;
        row.map(|row| {
            Ok(PaperBalance {
                balance: parse_dec(&row.balance)?,
                high_water_mark: parse_dec(&row.high_water_mark)?,
                fees_paid: parse_dec(&row.fees_paid)?,
            })
        })
        .transpose()
    }
}
