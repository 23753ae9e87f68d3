//! Market discovery REST client.
//!
//! Pages through the venue's active-market listing via `offset/limit` until
//! a short page terminates the stream. Market discovery uses the Gamma-style
//! API for richer metadata (volume, liquidity, momentum); orderbook queries
//! live in [`crate::venue::orderbook`] against the CLOB-style API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::collector::VenueConfig;
use crate::domain::MarketId;
use crate::error::Result;
use crate::venue::dto::GammaMarket;
use crate::venue::http::RestTransport;
use crate::venue::rate_limit::TokenBucket;
use crate::venue::traits::{MarketDescriptor, MarketDiscovery};

/// REST client for the discovery API.
pub struct DiscoveryClient {
    transport: RestTransport,
    base_url: String,
    page_size: usize,
}

impl DiscoveryClient {
    /// Build from venue settings and a shared rate-limit bucket.
    #[must_use]
    pub fn new(config: &VenueConfig, limiter: Arc<TokenBucket>, page_size: usize) -> Self {
        Self {
            transport: RestTransport::new("discovery", config, limiter),
            base_url: config.gamma_url.clone(),
            page_size: page_size.max(1),
        }
    }

    async fn fetch_page(&self, offset: usize) -> Result<Vec<GammaMarket>> {
        let url = format!(
            "{}/markets?active=true&closed=false&limit={}&offset={}",
            self.base_url, self.page_size, offset
        );
        debug!(url = %url, "Fetching market page");
        self.transport.get_json(&url).await
    }
}

#[async_trait]
impl MarketDiscovery for DiscoveryClient {
    async fn list_active_markets(&self) -> Result<Vec<MarketDescriptor>> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(offset).await?;
            let count = page.len();
            all.extend(page.into_iter().map(MarketDescriptor::from));
            if count < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        info!(markets = all.len(), "Active market listing complete");
        Ok(all)
    }

    async fn fetch_market(&self, condition_id: &MarketId) -> Result<Option<MarketDescriptor>> {
        let url = format!(
            "{}/markets?condition_ids={}",
            self.base_url,
            condition_id.as_str()
        );
        let rows: Vec<GammaMarket> = self.transport.get_json(&url).await?;
        Ok(rows.into_iter().next().map(MarketDescriptor::from))
    }

    fn name(&self) -> &'static str {
        "polymarket-gamma"
    }
}
