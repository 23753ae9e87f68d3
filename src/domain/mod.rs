//! Pure domain types: markets, trades, books, snapshots, positions, signals.
//!
//! Nothing in this module performs I/O or holds locks; services compose
//! these types behind the adapters.

pub mod book;
pub mod id;
pub mod market;
pub mod position;
pub mod signal;
pub mod snapshot;
pub mod trade;
pub mod wallet;

pub use book::{Book, PriceLevel};
pub use id::{MarketId, OrderId, TokenId};
pub use market::{Market, Outcome, Side, Tier, TierTransition, TransitionReason};
pub use position::{Position, PositionStatus};
pub use signal::{DecisionOutcome, Fill, OrderType, RejectReason, Signal, TradeDecision};
pub use snapshot::{BookFeatures, Snapshot};
pub use trade::{FlowMetrics, Trade, WhaleMetrics, WhaleThresholds};
pub use wallet::{PaperBalance, StrategyWallet};
