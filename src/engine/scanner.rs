//! Scanner: materializes strategy-facing market views.
//!
//! A view joins the registry's market row with its most recent snapshot.
//! Price history is loaded only when requested — most strategies do not
//! need it and the extra store round-trip per market is not free.
//! Strategies are pure over the views they receive; they never read the
//! store directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{FlowMetrics, MarketId, Snapshot, Tier, TokenId, WhaleMetrics};
use crate::error::Result;
use crate::registry::MarketRegistry;
use crate::store::Store;

/// Scannable view of one market: identity, latest prices, aggregates, and
/// the full snapshot for audit.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub market_id: MarketId,
    pub question: String,
    pub category: Option<String>,
    pub yes_token: Option<TokenId>,
    pub no_token: Option<TokenId>,
    pub tier: Tier,
    /// Current YES price.
    pub price: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub hours_to_close: f64,
    pub end_date: DateTime<Utc>,
    pub tracked_since: DateTime<Utc>,
    pub flow_1h: Option<FlowMetrics>,
    pub whale_1h: Option<WhaleMetrics>,
    /// Oldest-first snapshot prices; populated only on request.
    pub price_history: Option<Vec<f64>>,
    /// The snapshot the view was materialized from.
    pub snapshot: Snapshot,
}

/// Builds [`MarketView`]s on demand for the trading engine.
pub struct Scanner {
    registry: Arc<MarketRegistry>,
    store: Arc<dyn Store>,
}

impl Scanner {
    #[must_use]
    pub fn new(registry: Arc<MarketRegistry>, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Materialize views for every collectable market with at least one
    /// snapshot. `with_history` opts in to loading `history_len` prices.
    pub async fn views(
        &self,
        now: DateTime<Utc>,
        with_history: bool,
        history_len: usize,
    ) -> Result<Vec<MarketView>> {
        let markets = self.registry.active_markets();
        let mut views = Vec::with_capacity(markets.len());

        for market in markets {
            let Some(snapshot) = self.store.latest_snapshot(&market.condition_id).await? else {
                continue;
            };
            let price_history = if with_history {
                Some(
                    self.store
                        .snapshot_prices(&market.condition_id, history_len)
                        .await?,
                )
            } else {
                None
            };
            views.push(MarketView {
                market_id: market.condition_id.clone(),
                question: market.question.clone(),
                category: market.category.clone(),
                yes_token: market.yes_token_id.clone(),
                no_token: market.no_token_id.clone(),
                tier: market.tier,
                price: snapshot.price,
                best_bid: snapshot.best_bid,
                best_ask: snapshot.best_ask,
                spread: snapshot.spread,
                volume_24h: snapshot.volume_24h,
                liquidity: snapshot.liquidity,
                hours_to_close: market.hours_to_close(now),
                end_date: market.end_date,
                tracked_since: market.tracked_since,
                flow_1h: snapshot.flow_1h,
                whale_1h: snapshot.whale_1h,
                price_history,
                snapshot,
            });
        }

        debug!(views = views.len(), with_history, "Scan views materialized");
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::collector::CollectorConfig;
    use crate::store::memory::MemoryStore;
    use crate::testkit::discovery::StaticDiscovery;
    use crate::testkit::domain as fixtures;

    async fn scanner_with(
        descriptors: Vec<crate::venue::traits::MarketDescriptor>,
    ) -> (Scanner, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let discovery = Arc::new(StaticDiscovery::new(descriptors));
        let registry = Arc::new(MarketRegistry::new(
            discovery,
            store.clone(),
            &CollectorConfig::default(),
        ));
        registry.discover_once(fixtures::clock()).await.unwrap();
        (Scanner::new(registry, store.clone()), store)
    }

    #[tokio::test]
    async fn markets_without_snapshots_are_skipped() {
        let (scanner, store) = scanner_with(vec![
            fixtures::descriptor("0xa", 5.0, 20_000.0),
            fixtures::descriptor("0xb", 5.0, 20_000.0),
        ])
        .await;
        store
            .insert_snapshot(&fixtures::snapshot("0xa", 0.42, Tier::T2))
            .await
            .unwrap();

        let views = scanner.views(fixtures::clock(), false, 48).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].market_id, MarketId::from("0xa"));
        assert!((views[0].price - 0.42).abs() < 1e-9);
        assert!(views[0].price_history.is_none());
    }

    #[tokio::test]
    async fn history_is_loaded_only_on_request() {
        let (scanner, store) = scanner_with(vec![fixtures::descriptor("0xa", 5.0, 20_000.0)]).await;
        for (i, price) in [0.40, 0.42, 0.44].iter().enumerate() {
            let mut snapshot = fixtures::snapshot("0xa", *price, Tier::T2);
            snapshot.at = fixtures::clock() + chrono::Duration::minutes(i as i64);
            store.insert_snapshot(&snapshot).await.unwrap();
        }

        let views = scanner.views(fixtures::clock(), true, 2).await.unwrap();
        assert_eq!(views[0].price_history, Some(vec![0.42, 0.44]));
    }
}
