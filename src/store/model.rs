//! Row types mapping domain values onto the SQLite schema.
//!
//! Timestamps are stored as RFC 3339 text; decimals as text to preserve
//! exact money arithmetic across round trips.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::domain::market::{Outcome, Tier};
use crate::domain::position::PositionStatus;
use crate::domain::signal::DecisionOutcome;
use crate::domain::snapshot::BookFeatures;
use crate::domain::trade::{FlowMetrics, WhaleMetrics};
use crate::domain::{
    Market, MarketId, Position, Side, Signal, Snapshot, StrategyWallet, TierTransition, TokenId,
    Trade, TradeDecision,
};
use crate::error::{Error, Result};

use super::schema::{
    executor_trades, markets, orderbook_snapshots, paper_balances, positions, signals, snapshots,
    strategy_balances, task_runs, tier_transitions, trade_decisions, trades, whale_events,
};

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("timestamp {s:?}: {e}")))
}

pub(crate) fn parse_dec(s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| Error::Parse(format!("decimal {s:?}: {e}")))
}

fn parse_side(s: &str) -> Result<Side> {
    Side::parse(s).ok_or_else(|| Error::Parse(format!("side {s:?}")))
}

// ---------------------------------------------------------------------------
// markets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = markets)]
pub struct MarketRow {
    pub condition_id: String,
    pub slug: String,
    pub question: String,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub end_date: String,
    pub category: Option<String>,
    pub initial_price: Option<f64>,
    pub initial_volume: Option<f64>,
    pub initial_liquidity: Option<f64>,
    pub active: bool,
    pub closed: bool,
    pub resolved: bool,
    pub outcome: Option<String>,
    pub tier: i32,
    pub tracked_since: String,
    pub snapshot_count: i64,
    pub last_snapshot_at: Option<String>,
    pub last_trade_at: Option<String>,
}

impl From<&Market> for MarketRow {
    fn from(m: &Market) -> Self {
        Self {
            condition_id: m.condition_id.as_str().to_owned(),
            slug: m.slug.clone(),
            question: m.question.clone(),
            yes_token_id: m.yes_token_id.as_ref().map(|t| t.as_str().to_owned()),
            no_token_id: m.no_token_id.as_ref().map(|t| t.as_str().to_owned()),
            end_date: fmt_ts(m.end_date),
            category: m.category.clone(),
            initial_price: m.initial_price,
            initial_volume: m.initial_volume,
            initial_liquidity: m.initial_liquidity,
            active: m.active,
            closed: m.closed,
            resolved: m.resolved,
            outcome: m.outcome.map(|o| o.as_str().to_owned()),
            tier: m.tier.as_i32(),
            tracked_since: fmt_ts(m.tracked_since),
            snapshot_count: m.snapshot_count as i64,
            last_snapshot_at: m.last_snapshot_at.map(fmt_ts),
            last_trade_at: m.last_trade_at.map(fmt_ts),
        }
    }
}

impl TryFrom<MarketRow> for Market {
    type Error = Error;

    fn try_from(row: MarketRow) -> Result<Self> {
        Ok(Self {
            condition_id: MarketId::from(row.condition_id),
            slug: row.slug,
            question: row.question,
            yes_token_id: row.yes_token_id.map(TokenId::from),
            no_token_id: row.no_token_id.map(TokenId::from),
            end_date: parse_ts(&row.end_date)?,
            category: row.category,
            initial_price: row.initial_price,
            initial_volume: row.initial_volume,
            initial_liquidity: row.initial_liquidity,
            active: row.active,
            closed: row.closed,
            resolved: row.resolved,
            outcome: row.outcome.as_deref().and_then(Outcome::parse),
            tier: Tier::from_i32(row.tier)
                .ok_or_else(|| Error::Parse(format!("tier {}", row.tier)))?,
            tracked_since: parse_ts(&row.tracked_since)?,
            snapshot_count: row.snapshot_count.max(0) as u64,
            last_snapshot_at: row.last_snapshot_at.as_deref().map(parse_ts).transpose()?,
            last_trade_at: row.last_trade_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = snapshots)]
pub struct SnapshotRow {
    pub market_id: String,
    pub timestamp: String,
    pub tier: i32,
    pub price: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub price_change_1d: Option<f64>,
    pub price_change_1w: Option<f64>,
    pub price_change_1m: Option<f64>,
    pub volume_total: Option<f64>,
    pub volume_24h: Option<f64>,
    pub volume_1w: Option<f64>,
    pub liquidity: Option<f64>,
    pub bid_depth_5: Option<f64>,
    pub bid_depth_10: Option<f64>,
    pub bid_depth_20: Option<f64>,
    pub bid_depth_50: Option<f64>,
    pub ask_depth_5: Option<f64>,
    pub ask_depth_10: Option<f64>,
    pub ask_depth_20: Option<f64>,
    pub ask_depth_50: Option<f64>,
    pub bid_levels: Option<i32>,
    pub ask_levels: Option<i32>,
    pub book_imbalance: Option<f64>,
    pub bid_wall_price: Option<f64>,
    pub bid_wall_size: Option<f64>,
    pub ask_wall_price: Option<f64>,
    pub ask_wall_size: Option<f64>,
    pub trade_count_1h: Option<i64>,
    pub buy_count_1h: Option<i64>,
    pub sell_count_1h: Option<i64>,
    pub volume_1h: Option<f64>,
    pub buy_volume_1h: Option<f64>,
    pub sell_volume_1h: Option<f64>,
    pub avg_size_1h: Option<f64>,
    pub max_size_1h: Option<f64>,
    pub vwap_1h: Option<f64>,
    pub whale_count_1h: Option<i64>,
    pub whale_volume_1h: Option<f64>,
    pub whale_buy_volume_1h: Option<f64>,
    pub whale_sell_volume_1h: Option<f64>,
    pub whale_net_flow_1h: Option<f64>,
    pub whale_buy_ratio_1h: Option<f64>,
    pub time_since_whale_secs: Option<i64>,
    pub pct_volume_from_whales: Option<f64>,
    pub last_whale_side: Option<String>,
    pub hours_to_close: f64,
    pub day_of_week: i32,
    pub hour_of_day: i32,
}

impl From<&Snapshot> for SnapshotRow {
    fn from(s: &Snapshot) -> Self {
        let book = s.book.as_ref();
        let flow = s.flow_1h.as_ref();
        let whale = s.whale_1h.as_ref();
        Self {
            market_id: s.market_id.as_str().to_owned(),
            timestamp: fmt_ts(s.at),
            tier: s.tier.as_i32(),
            price: s.price,
            best_bid: s.best_bid,
            best_ask: s.best_ask,
            spread: s.spread,
            last_trade_price: s.last_trade_price,
            price_change_1d: s.price_change_1d,
            price_change_1w: s.price_change_1w,
            price_change_1m: s.price_change_1m,
            volume_total: s.volume_total,
            volume_24h: s.volume_24h,
            volume_1w: s.volume_1w,
            liquidity: s.liquidity,
            bid_depth_5: book.map(|b| b.bid_depth_5),
            bid_depth_10: book.map(|b| b.bid_depth_10),
            bid_depth_20: book.map(|b| b.bid_depth_20),
            bid_depth_50: book.map(|b| b.bid_depth_50),
            ask_depth_5: book.map(|b| b.ask_depth_5),
            ask_depth_10: book.map(|b| b.ask_depth_10),
            ask_depth_20: book.map(|b| b.ask_depth_20),
            ask_depth_50: book.map(|b| b.ask_depth_50),
            bid_levels: book.map(|b| b.bid_levels as i32),
            ask_levels: book.map(|b| b.ask_levels as i32),
            book_imbalance: book.map(|b| b.book_imbalance),
            bid_wall_price: book.and_then(|b| b.bid_wall_price),
            bid_wall_size: book.and_then(|b| b.bid_wall_size),
            ask_wall_price: book.and_then(|b| b.ask_wall_price),
            ask_wall_size: book.and_then(|b| b.ask_wall_size),
            trade_count_1h: flow.map(|f| f.trade_count as i64),
            buy_count_1h: flow.map(|f| f.buy_count as i64),
            sell_count_1h: flow.map(|f| f.sell_count as i64),
            volume_1h: flow.map(|f| f.volume),
            buy_volume_1h: flow.map(|f| f.buy_volume),
            sell_volume_1h: flow.map(|f| f.sell_volume),
            avg_size_1h: flow.map(|f| f.avg_size),
            max_size_1h: flow.map(|f| f.max_size),
            vwap_1h: flow.map(|f| f.vwap),
            whale_count_1h: whale.map(|w| w.whale_count as i64),
            whale_volume_1h: whale.map(|w| w.whale_volume),
            whale_buy_volume_1h: whale.map(|w| w.whale_buy_volume),
            whale_sell_volume_1h: whale.map(|w| w.whale_sell_volume),
            whale_net_flow_1h: whale.map(|w| w.whale_net_flow),
            whale_buy_ratio_1h: whale.map(|w| w.whale_buy_ratio),
            time_since_whale_secs: whale.and_then(|w| w.time_since_whale_secs),
            pct_volume_from_whales: whale.map(|w| w.pct_volume_from_whales),
            last_whale_side: whale
                .and_then(|w| w.last_whale_side)
                .map(|s| s.as_str().to_owned()),
            hours_to_close: s.hours_to_close,
            day_of_week: i32::from(s.day_of_week),
            hour_of_day: i32::from(s.hour_of_day),
        }
    }
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = Error;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let book = row.bid_levels.map(|_| BookFeatures {
            bid_depth_5: row.bid_depth_5.unwrap_or(0.0),
            bid_depth_10: row.bid_depth_10.unwrap_or(0.0),
            bid_depth_20: row.bid_depth_20.unwrap_or(0.0),
            bid_depth_50: row.bid_depth_50.unwrap_or(0.0),
            ask_depth_5: row.ask_depth_5.unwrap_or(0.0),
            ask_depth_10: row.ask_depth_10.unwrap_or(0.0),
            ask_depth_20: row.ask_depth_20.unwrap_or(0.0),
            ask_depth_50: row.ask_depth_50.unwrap_or(0.0),
            bid_levels: row.bid_levels.unwrap_or(0).max(0) as u32,
            ask_levels: row.ask_levels.unwrap_or(0).max(0) as u32,
            book_imbalance: row.book_imbalance.unwrap_or(0.0),
            bid_wall_price: row.bid_wall_price,
            bid_wall_size: row.bid_wall_size,
            ask_wall_price: row.ask_wall_price,
            ask_wall_size: row.ask_wall_size,
        });
        let flow = row.trade_count_1h.map(|count| FlowMetrics {
            trade_count: count.max(0) as u64,
            buy_count: row.buy_count_1h.unwrap_or(0).max(0) as u64,
            sell_count: row.sell_count_1h.unwrap_or(0).max(0) as u64,
            volume: row.volume_1h.unwrap_or(0.0),
            buy_volume: row.buy_volume_1h.unwrap_or(0.0),
            sell_volume: row.sell_volume_1h.unwrap_or(0.0),
            avg_size: row.avg_size_1h.unwrap_or(0.0),
            max_size: row.max_size_1h.unwrap_or(0.0),
            vwap: row.vwap_1h.unwrap_or(0.0),
        });
        let whale = row.whale_count_1h.map(|count| WhaleMetrics {
            whale_count: count.max(0) as u64,
            whale_volume: row.whale_volume_1h.unwrap_or(0.0),
            whale_buy_volume: row.whale_buy_volume_1h.unwrap_or(0.0),
            whale_sell_volume: row.whale_sell_volume_1h.unwrap_or(0.0),
            whale_net_flow: row.whale_net_flow_1h.unwrap_or(0.0),
            whale_buy_ratio: row.whale_buy_ratio_1h.unwrap_or(0.0),
            time_since_whale_secs: row.time_since_whale_secs,
            pct_volume_from_whales: row.pct_volume_from_whales.unwrap_or(0.0),
            last_whale_side: row.last_whale_side.as_deref().and_then(Side::parse),
        });

        Ok(Self {
            market_id: MarketId::from(row.market_id),
            at: parse_ts(&row.timestamp)?,
            tier: Tier::from_i32(row.tier)
                .ok_or_else(|| Error::Parse(format!("tier {}", row.tier)))?,
            price: row.price,
            best_bid: row.best_bid,
            best_ask: row.best_ask,
            spread: row.spread,
            last_trade_price: row.last_trade_price,
            price_change_1d: row.price_change_1d,
            price_change_1w: row.price_change_1w,
            price_change_1m: row.price_change_1m,
            volume_total: row.volume_total,
            volume_24h: row.volume_24h,
            volume_1w: row.volume_1w,
            liquidity: row.liquidity,
            book,
            flow_1h: flow,
            whale_1h: whale,
            hours_to_close: row.hours_to_close,
            day_of_week: row.day_of_week.max(0) as u8,
            hour_of_day: row.hour_of_day.max(0) as u8,
        })
    }
}

// ---------------------------------------------------------------------------
// trades and whale events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = trades)]
pub struct NewTradeRow {
    pub market_id: String,
    pub at: String,
    pub price: f64,
    pub size: f64,
    pub side: String,
    pub whale_tier: i32,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid: Option<f64>,
}

impl From<&Trade> for NewTradeRow {
    fn from(t: &Trade) -> Self {
        Self {
            market_id: t.market_id.as_str().to_owned(),
            at: fmt_ts(t.at),
            price: t.price,
            size: t.size,
            side: t.side.as_str().to_owned(),
            whale_tier: i32::from(t.whale_tier),
            best_bid: t.best_bid,
            best_ask: t.best_ask,
            mid: t.mid,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = whale_events)]
pub struct NewWhaleEventRow {
    pub market_id: String,
    pub at: String,
    pub price: f64,
    pub size: f64,
    pub side: String,
    pub whale_tier: i32,
}

impl From<&Trade> for NewWhaleEventRow {
    fn from(t: &Trade) -> Self {
        Self {
            market_id: t.market_id.as_str().to_owned(),
            at: fmt_ts(t.at),
            price: t.price,
            size: t.size,
            side: t.side.as_str().to_owned(),
            whale_tier: i32::from(t.whale_tier),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orderbook_snapshots)]
pub struct NewOrderbookSnapshotRow {
    pub market_id: String,
    pub token_id: String,
    pub at: String,
    pub bids: String,
    pub asks: String,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub bid_levels: i32,
    pub ask_levels: i32,
}

// ---------------------------------------------------------------------------
// tier transitions and task runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tier_transitions)]
pub struct NewTierTransitionRow {
    pub market_id: String,
    pub from_tier: i32,
    pub to_tier: i32,
    pub at: String,
    pub hours_to_close: f64,
    pub reason: String,
}

impl From<&TierTransition> for NewTierTransitionRow {
    fn from(t: &TierTransition) -> Self {
        Self {
            market_id: t.market_id.as_str().to_owned(),
            from_tier: t.from_tier,
            to_tier: t.to_tier,
            at: fmt_ts(t.at),
            hours_to_close: t.hours_to_close,
            reason: t.reason.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_runs)]
pub struct NewTaskRunRow {
    pub task: String,
    pub started_at: String,
    pub finished_at: String,
    pub outcome: String,
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = positions)]
pub struct PositionRow {
    pub id: String,
    pub strategy: String,
    pub market_id: String,
    pub token_id: String,
    pub side: String,
    pub avg_entry_price: String,
    pub size_shares: String,
    pub cost_basis: String,
    pub current_mark: Option<String>,
    pub status: String,
    pub realized_pnl: Option<String>,
    pub fees_paid: String,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub paper: bool,
}

impl From<&Position> for PositionRow {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id.clone(),
            strategy: p.strategy.clone(),
            market_id: p.market_id.as_str().to_owned(),
            token_id: p.token_id.as_str().to_owned(),
            side: p.side.as_str().to_owned(),
            avg_entry_price: p.avg_entry_price.to_string(),
            size_shares: p.size_shares.to_string(),
            cost_basis: p.cost_basis.to_string(),
            current_mark: p.current_mark.map(|d| d.to_string()),
            status: p.status.as_str().to_owned(),
            realized_pnl: p.realized_pnl.map(|d| d.to_string()),
            fees_paid: p.fees_paid.to_string(),
            opened_at: fmt_ts(p.opened_at),
            closed_at: p.closed_at.map(fmt_ts),
            paper: p.paper,
        }
    }
}

impl TryFrom<PositionRow> for Position {
    type Error = Error;

    fn try_from(row: PositionRow) -> Result<Self> {
        let status = match row.status.as_str() {
            "open" => PositionStatus::Open,
            "partial" => PositionStatus::Partial,
            "closed" => PositionStatus::Closed,
            other => return Err(Error::Parse(format!("position status {other:?}"))),
        };
        Ok(Self {
            id: row.id,
            strategy: row.strategy,
            market_id: MarketId::from(row.market_id),
            token_id: TokenId::from(row.token_id),
            side: parse_side(&row.side)?,
            avg_entry_price: parse_dec(&row.avg_entry_price)?,
            size_shares: parse_dec(&row.size_shares)?,
            cost_basis: parse_dec(&row.cost_basis)?,
            current_mark: row.current_mark.as_deref().map(parse_dec).transpose()?,
            status,
            realized_pnl: row.realized_pnl.as_deref().map(parse_dec).transpose()?,
            fees_paid: parse_dec(&row.fees_paid)?,
            opened_at: parse_ts(&row.opened_at)?,
            closed_at: row.closed_at.as_deref().map(parse_ts).transpose()?,
            paper: row.paper,
        })
    }
}

// ---------------------------------------------------------------------------
// signals, decisions, executor trades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = signals)]
pub struct NewSignalRow {
    pub id: String,
    pub strategy: String,
    pub strategy_version: String,
    pub market_id: String,
    pub token_id: String,
    pub side: String,
    pub reason: String,
    pub edge: f64,
    pub confidence: f64,
    pub suggested_size: Option<String>,
    pub signal_price: String,
    pub at: String,
    pub metadata: String,
}

impl From<&Signal> for NewSignalRow {
    fn from(s: &Signal) -> Self {
        Self {
            id: s.id.clone(),
            strategy: s.strategy.clone(),
            strategy_version: s.strategy_version.clone(),
            market_id: s.market_id.as_str().to_owned(),
            token_id: s.token_id.as_str().to_owned(),
            side: s.side.as_str().to_owned(),
            reason: s.reason.clone(),
            edge: s.edge,
            confidence: s.confidence,
            suggested_size: s.suggested_size.map(|d| d.to_string()),
            signal_price: s.signal_price.to_string(),
            at: fmt_ts(s.at),
            metadata: serde_json::to_string(&s.metadata).unwrap_or_else(|_| "{}".into()),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = trade_decisions)]
pub struct NewTradeDecisionRow {
    pub id: String,
    pub signal_id: String,
    pub approved: bool,
    pub reject_reason: Option<String>,
    pub size_usd: Option<String>,
    pub at: String,
}

impl From<&TradeDecision> for NewTradeDecisionRow {
    fn from(d: &TradeDecision) -> Self {
        let (approved, reject_reason, size_usd) = match &d.outcome {
            DecisionOutcome::Approved { size_usd } => (true, None, Some(size_usd.to_string())),
            DecisionOutcome::Rejected { reason } => {
                (false, Some(reason.as_str().to_owned()), None)
            }
        };
        Self {
            id: d.id.clone(),
            signal_id: d.signal.id.clone(),
            approved,
            reject_reason,
            size_usd,
            at: fmt_ts(d.at),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = executor_trades)]
pub struct NewExecutorTradeRow {
    pub signal_id: String,
    pub order_id: String,
    pub price: String,
    pub shares: String,
    pub cost: String,
    pub fees: String,
    pub slippage: String,
    pub at: String,
    pub paper: bool,
}

// ---------------------------------------------------------------------------
// balances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = paper_balances)]
pub struct PaperBalanceRow {
    pub id: i32,
    pub balance: String,
    pub high_water_mark: String,
    pub fees_paid: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = strategy_balances)]
pub struct StrategyBalanceRow {
    pub strategy: String,
    pub allocated: String,
    pub available: String,
    pub realized_pnl: String,
    pub trade_count: i32,
    pub wins: i32,
    pub losses: i32,
    pub max_drawdown: String,
    pub updated_at: String,
}

impl StrategyBalanceRow {
    pub fn from_wallet(w: &StrategyWallet, now: DateTime<Utc>) -> Self {
        Self {
            strategy: w.strategy.clone(),
            allocated: w.allocated.to_string(),
            available: w.available.to_string(),
            realized_pnl: w.realized_pnl.to_string(),
            trade_count: w.trade_count as i32,
            wins: w.wins as i32,
            losses: w.losses as i32,
            max_drawdown: w.max_drawdown.to_string(),
            updated_at: fmt_ts(now),
        }
    }
}
