//! Venue integration ports.
//!
//! The collection pipeline only ever talks to the venue through these
//! traits, so every service can run against mocks:
//!
//! - [`MarketDiscovery`]: paginated market listings from the discovery REST API
//! - [`OrderbookSource`]: order book / midpoint / spread queries
//! - [`TradeStream`]: real-time trade feed over WebSocket

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Book, MarketId, Outcome, Side, TokenId};
use crate::error::Result;

/// Venue-agnostic market descriptor returned by discovery.
///
/// Numeric fields the venue could not supply (or supplied unparseably) are
/// `None`, never zero.
#[derive(Debug, Clone, Default)]
pub struct MarketDescriptor {
    pub condition_id: String,
    pub slug: String,
    pub question: String,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    /// Current YES price.
    pub price: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub price_change_1d: Option<f64>,
    pub price_change_1w: Option<f64>,
    pub price_change_1m: Option<f64>,
    pub volume_total: Option<f64>,
    pub volume_24h: Option<f64>,
    pub volume_1w: Option<f64>,
    pub liquidity: Option<f64>,
    pub active: bool,
    pub closed: bool,
    pub enable_order_book: bool,
    /// Terminal YES/NO outcome prices once the venue reports them.
    pub outcome_prices: Option<(f64, f64)>,
    /// Venue resolution status label, when present (e.g. "resolved",
    /// "invalid").
    pub resolution_status: Option<String>,
}

impl MarketDescriptor {
    /// Derive the terminal outcome for a closed market.
    ///
    /// Returns `None` when the venue's state is ambiguous; the caller must
    /// not settle positions in that case.
    #[must_use]
    pub fn resolved_outcome(&self) -> Option<Outcome> {
        if !self.closed {
            return None;
        }
        if let Some(status) = &self.resolution_status {
            if status.eq_ignore_ascii_case("invalid") {
                return Some(Outcome::Invalid);
            }
        }
        let (yes, no) = self.outcome_prices?;
        const TOLERANCE: f64 = 0.01;
        if (yes - 1.0).abs() <= TOLERANCE && no.abs() <= TOLERANCE {
            Some(Outcome::Yes)
        } else if (no - 1.0).abs() <= TOLERANCE && yes.abs() <= TOLERANCE {
            Some(Outcome::No)
        } else {
            None
        }
    }
}

/// Market discovery via the venue's REST listing API.
#[async_trait]
pub trait MarketDiscovery: Send + Sync {
    /// Fetch all currently active markets, following pagination until a
    /// short page terminates the stream.
    async fn list_active_markets(&self) -> Result<Vec<MarketDescriptor>>;

    /// Fetch one market by condition id. `Ok(None)` when the venue does not
    /// know it.
    async fn fetch_market(&self, condition_id: &MarketId) -> Result<Option<MarketDescriptor>>;

    /// Venue name for logging.
    fn name(&self) -> &'static str;
}

/// Order book queries via the venue's REST API.
#[async_trait]
pub trait OrderbookSource: Send + Sync {
    async fn get_orderbook(&self, token_id: &TokenId) -> Result<Book>;

    async fn get_midpoint(&self, token_id: &TokenId) -> Result<Option<f64>>;

    async fn get_spread(&self, token_id: &TokenId) -> Result<Option<f64>>;

    /// Venue name for logging.
    fn name(&self) -> &'static str;
}

/// Event received from the real-time trade feed.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An execution on a subscribed token.
    Trade {
        token_id: TokenId,
        price: f64,
        size: f64,
        side: Side,
        at: DateTime<Utc>,
    },
    /// Best bid/ask refresh from a book event.
    BookUpdate {
        token_id: TokenId,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        at: DateTime<Utc>,
    },
    /// Quoted price moved without a trade.
    PriceChange {
        token_id: TokenId,
        price: Option<f64>,
        at: DateTime<Utc>,
    },
    /// Connection established.
    Connected,
    /// Connection lost; the wrapper may reconnect.
    Disconnected { reason: String },
}

/// Real-time trade stream over one WebSocket connection.
///
/// # Lifecycle
///
/// 1. [`connect`](Self::connect)
/// 2. [`subscribe`](Self::subscribe) with the connection's token set
/// 3. [`next_event`](Self::next_event) in a loop; `None` means the stream is
///    permanently closed
#[async_trait]
pub trait TradeStream: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Replace the connection's subscription set.
    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()>;

    async fn next_event(&mut self) -> Option<StreamEvent>;

    /// Venue name for logging.
    fn name(&self) -> &'static str;

    /// Count of malformed feed messages dropped so far.
    fn malformed_count(&self) -> u64 {
        0
    }
}

/// Blanket implementation so pooled connections can hold boxed streams.
#[async_trait]
impl TradeStream for Box<dyn TradeStream> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        (**self).subscribe(token_ids).await
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        (**self).next_event().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn malformed_count(&self) -> u64 {
        (**self).malformed_count()
    }
}
