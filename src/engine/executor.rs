//! Order execution: one contract, two back-ends.
//!
//! The paper back-end is the reference implementation; it models slippage
//! and fill probability against the live orderbook but never leaves the
//! process. The live back-end is a thin boundary adapter over the venue's
//! order API, idempotent on client order id. Both feed the same position
//! lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::collector::quotes::QuoteCache;
use crate::config::risk::ExecutionConfig;
use crate::domain::signal::OrderType;
use crate::domain::{Fill, OrderId, Side, Signal};
use crate::error::Result;
use crate::venue::traits::OrderbookSource;

/// Result of working an order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled(Fill),
    /// The order did not execute (limit timeout, empty book). No position
    /// is created and no wallet is touched.
    Unfilled { reason: String },
}

impl OrderOutcome {
    #[must_use]
    pub const fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }
}

/// Order placement contract shared by paper and live back-ends.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Work an approved signal for `size_usd` notional.
    async fn place_order(
        &self,
        signal: &Signal,
        size_usd: Decimal,
        order_type: OrderType,
    ) -> Result<OrderOutcome>;

    /// Back-end name for logging.
    fn name(&self) -> &'static str;
}

fn dec_or_zero(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or_default()
}

/// Top-of-book reference for one side: price and resting notional depth.
struct BookRef {
    price: Decimal,
    depth_notional: Decimal,
    mid: Option<Decimal>,
}

/// Paper executor: simulated fills with depth-aware slippage.
pub struct PaperExecutor {
    books: Arc<dyn OrderbookSource>,
    quotes: Arc<QuoteCache>,
    config: ExecutionConfig,
}

impl PaperExecutor {
    #[must_use]
    pub fn new(
        books: Arc<dyn OrderbookSource>,
        quotes: Arc<QuoteCache>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            books,
            quotes,
            config,
        }
    }

    /// Reference price and depth for the side we cross. Falls back to the
    /// quote cache and finally the signal price when the book is dark.
    async fn book_ref(&self, signal: &Signal) -> BookRef {
        match self.books.get_orderbook(&signal.token_id).await {
            Ok(book) => {
                let level = match signal.side {
                    Side::Buy => book.best_ask(),
                    Side::Sell => book.best_bid(),
                };
                if let Some(level) = level {
                    return BookRef {
                        price: dec_or_zero(level.price),
                        depth_notional: dec_or_zero(level.price * level.size),
                        mid: book.mid().map(dec_or_zero),
                    };
                }
            }
            Err(e) => {
                debug!(token_id = %signal.token_id, error = %e, "Paper book fetch failed");
            }
        }
        let quote = self.quotes.get(&signal.token_id).unwrap_or_default();
        let price = match signal.side {
            Side::Buy => quote.best_ask,
            Side::Sell => quote.best_bid,
        };
        BookRef {
            price: price.map(dec_or_zero).unwrap_or(signal.signal_price),
            depth_notional: Decimal::ZERO,
            mid: quote.mid().map(dec_or_zero),
        }
    }

    /// Marketable slippage: `base + coeff * (size / depth_at_best)`,
    /// clamped to the ceiling. A dark book pays the full ceiling.
    fn slippage(&self, size_usd: Decimal, depth_notional: Decimal) -> Decimal {
        let ratio = if depth_notional > Decimal::ZERO {
            size_usd / depth_notional
        } else {
            Decimal::from(10)
        };
        (self.config.base_slippage + self.config.slippage_depth_coeff * ratio)
            .min(self.config.max_slippage)
    }

    fn fees(&self, cost: Decimal) -> Decimal {
        cost * Decimal::from(self.config.fee_bps) / Decimal::from(10_000)
    }

    fn fill_at(&self, signal: &Signal, exec_price: Decimal, size_usd: Decimal) -> OrderOutcome {
        if exec_price <= Decimal::ZERO || exec_price >= Decimal::ONE {
            return OrderOutcome::Unfilled {
                reason: format!("degenerate execution price {exec_price}"),
            };
        }
        let shares = size_usd / exec_price;
        let cost = exec_price * shares;
        OrderOutcome::Filled(Fill {
            order_id: OrderId::generate(),
            price: exec_price,
            shares,
            cost,
            fees: self.fees(cost),
            slippage: exec_price - signal.signal_price,
            at: Utc::now(),
        })
    }

    fn cross(&self, signal: &Signal, book: &BookRef, size_usd: Decimal) -> OrderOutcome {
        let slip = self.slippage(size_usd, book.depth_notional);
        let exec_price = match signal.side {
            Side::Buy => book.price * (Decimal::ONE + slip),
            Side::Sell => book.price * (Decimal::ONE - slip),
        };
        self.fill_at(signal, exec_price, size_usd)
    }

    /// Passive fill simulation: deep books fill deterministically, thin
    /// books fill with probability proportional to depth cover.
    fn passive_fills(&self, size_usd: Decimal, depth_notional: Decimal) -> bool {
        if depth_notional >= size_usd * Decimal::from(2) {
            return true;
        }
        if depth_notional.is_zero() || size_usd.is_zero() {
            return false;
        }
        let ratio = (depth_notional / size_usd).min(Decimal::from(2));
        let p = 0.35 * ratio.to_f64().unwrap_or(0.0);
        rand::thread_rng().gen_bool(p.clamp(0.0, 0.95))
    }

    fn limit_price(&self, signal: &Signal, book: &BookRef) -> Decimal {
        let mid = book.mid.unwrap_or(signal.signal_price);
        let offset = mid * Decimal::from(self.config.limit_offset_bps) / Decimal::from(10_000);
        match signal.side {
            Side::Buy => mid - offset,
            Side::Sell => mid + offset,
        }
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn place_order(
        &self,
        signal: &Signal,
        size_usd: Decimal,
        order_type: OrderType,
    ) -> Result<OrderOutcome> {
        let book = self.book_ref(signal).await;
        let outcome = match order_type {
            OrderType::Market => self.cross(signal, &book, size_usd),
            OrderType::Limit => {
                let price = self.limit_price(signal, &book);
                if self.passive_fills(size_usd, book.depth_notional) {
                    self.fill_at(signal, price, size_usd)
                } else {
                    OrderOutcome::Unfilled {
                        reason: format!(
                            "limit at {price} unfilled within {}s",
                            self.config.limit_timeout_secs
                        ),
                    }
                }
            }
            OrderType::Spread => {
                // Post passively at the near touch; escalate to marketable
                // after the spread timeout.
                let passive = match signal.side {
                    Side::Buy => book
                        .mid
                        .map_or(signal.signal_price, |m| m - (m - book.price).abs()),
                    Side::Sell => book
                        .mid
                        .map_or(signal.signal_price, |m| m + (book.price - m).abs()),
                };
                if self.passive_fills(size_usd, book.depth_notional) {
                    self.fill_at(signal, passive, size_usd)
                } else {
                    debug!(
                        timeout_secs = self.config.spread_timeout_secs,
                        "Spread order escalating to marketable"
                    );
                    self.cross(signal, &book, size_usd)
                }
            }
        };

        if let OrderOutcome::Filled(fill) = &outcome {
            info!(
                strategy = %signal.strategy,
                market_id = %signal.market_id,
                side = signal.side.as_str(),
                price = %fill.price,
                shares = %fill.shares,
                slippage = %fill.slippage,
                "Paper fill"
            );
        }
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Live executor (boundary adapter)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LiveOrderResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    filled_size: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    fees: Option<String>,
}

/// Live executor: signs nothing itself, posts to the venue's order API and
/// reconciles the acknowledged fill into the shared position lifecycle.
/// Submission is idempotent on the generated client order id.
pub struct LiveExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LiveExecutor {
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    async fn place_order(
        &self,
        signal: &Signal,
        size_usd: Decimal,
        order_type: OrderType,
    ) -> Result<OrderOutcome> {
        let order_id = OrderId::generate();
        let shares = if signal.signal_price > Decimal::ZERO {
            size_usd / signal.signal_price
        } else {
            return Ok(OrderOutcome::Unfilled {
                reason: "no reference price".into(),
            });
        };
        let body = serde_json::json!({
            "client_order_id": order_id.as_str(),
            "token_id": signal.token_id.as_str(),
            "side": signal.side.as_str(),
            "type": order_type.as_str(),
            "price": signal.signal_price.to_string(),
            "size": shares.to_string(),
        });

        let response = self
            .http
            .post(format!("{}/order", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let ack: LiveOrderResponse = response.json().await?;

        if !ack.status.eq_ignore_ascii_case("matched") {
            warn!(order_id = %order_id, status = %ack.status, "Live order not matched");
            return Ok(OrderOutcome::Unfilled { reason: ack.status });
        }

        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|v| v.parse::<Decimal>().ok())
        };
        let price = parse(&ack.avg_price).unwrap_or(signal.signal_price);
        let shares = parse(&ack.filled_size).unwrap_or(shares);
        let cost = price * shares;
        Ok(OrderOutcome::Filled(Fill {
            order_id,
            price,
            shares,
            cost,
            fees: parse(&ack.fees).unwrap_or(Decimal::ZERO),
            slippage: price - signal.signal_price,
            at: Utc::now(),
        }))
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
