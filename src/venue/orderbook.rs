//! Orderbook REST client against the CLOB-style API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::collector::VenueConfig;
use crate::domain::{Book, TokenId};
use crate::error::Result;
use crate::venue::dto::{ClobBook, MidpointResponse, SpreadResponse};
use crate::venue::http::RestTransport;
use crate::venue::rate_limit::TokenBucket;
use crate::venue::traits::OrderbookSource;

/// REST client for order book, midpoint, and spread queries.
pub struct OrderbookClient {
    transport: RestTransport,
    base_url: String,
}

impl OrderbookClient {
    /// Build from venue settings and a shared rate-limit bucket.
    #[must_use]
    pub fn new(config: &VenueConfig, limiter: Arc<TokenBucket>) -> Self {
        Self {
            transport: RestTransport::new("orderbook", config, limiter),
            base_url: config.clob_url.clone(),
        }
    }
}

#[async_trait]
impl OrderbookSource for OrderbookClient {
    async fn get_orderbook(&self, token_id: &TokenId) -> Result<Book> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id.as_str());
        debug!(token_id = %token_id, "Fetching orderbook");
        let book: ClobBook = self.transport.get_json(&url).await?;
        Ok(book.to_book())
    }

    async fn get_midpoint(&self, token_id: &TokenId) -> Result<Option<f64>> {
        let url = format!("{}/midpoint?token_id={}", self.base_url, token_id.as_str());
        let response: MidpointResponse = self.transport.get_json(&url).await?;
        Ok(response.mid)
    }

    async fn get_spread(&self, token_id: &TokenId) -> Result<Option<f64>> {
        let url = format!("{}/spread?token_id={}", self.base_url, token_id.as_str());
        let response: SpreadResponse = self.transport.get_json(&url).await?;
        Ok(response.spread)
    }

    fn name(&self) -> &'static str {
        "polymarket-clob"
    }
}
