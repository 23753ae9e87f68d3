//! Snapshot assembler: one ~65-field record per market per tick.
//!
//! Assembly fuses three sources with different freshness and availability:
//! the discovery REST API (prices, momentum, volumes), the orderbook REST
//! API (depth, walls, imbalance; T2+ only), and the trade ring buffer
//! (flow and whale aggregates; subscribed markets only).
//!
//! Partial-failure policy: a section that fails is logged and nulled, and
//! the snapshot still persists. The one exception is the price field: a
//! snapshot without a price is dropped. Every field is read against one
//! wall-clock `now` per assembly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::buffer::TradeRingBuffer;
use crate::config::collector::CollectorConfig;
use crate::domain::snapshot::BookFeatures;
use crate::domain::{Market, MarketId, Snapshot};
use crate::error::Result;
use crate::registry::MarketRegistry;
use crate::store::Store;
use crate::venue::traits::{MarketDescriptor, MarketDiscovery, OrderbookSource};

/// Per-market snapshot builder.
pub struct SnapshotAssembler {
    discovery: Arc<dyn MarketDiscovery>,
    books: Arc<dyn OrderbookSource>,
    buffer: Arc<TradeRingBuffer>,
    registry: Arc<MarketRegistry>,
    store: Arc<dyn Store>,
    soft_deadline: Duration,
}

impl SnapshotAssembler {
    #[must_use]
    pub fn new(
        discovery: Arc<dyn MarketDiscovery>,
        books: Arc<dyn OrderbookSource>,
        buffer: Arc<TradeRingBuffer>,
        registry: Arc<MarketRegistry>,
        store: Arc<dyn Store>,
        config: &CollectorConfig,
    ) -> Self {
        Self {
            discovery,
            books,
            buffer,
            registry,
            store,
            soft_deadline: Duration::from_millis(config.snapshot_soft_deadline_ms),
        }
    }

    /// Assemble and persist one snapshot for `market_id` at `now`.
    ///
    /// Returns `Ok(None)` when the snapshot was dropped (unknown market or
    /// missing price). Section failures never propagate; store failures do.
    pub async fn assemble(
        &self,
        market_id: &MarketId,
        now: DateTime<Utc>,
    ) -> Result<Option<Snapshot>> {
        let Some(market) = self.registry.get(market_id) else {
            debug!(market_id = %market_id, "Skipping snapshot for unknown market");
            return Ok(None);
        };

        let rest = self.rest_section(&market).await;
        let Some(price) = rest.as_ref().and_then(|d| d.price) else {
            warn!(market_id = %market_id, "Price unavailable, dropping snapshot");
            return Ok(None);
        };
        let rest = rest.unwrap_or_default();

        let book = if market.tier.collects_orderbook() {
            self.book_section(&market, now).await
        } else {
            None
        };

        // Flow/whale come only from the ring buffer; null when unsubscribed.
        let flow_1h = self.buffer.flow_1h(market_id, now);
        let whale_1h = self.buffer.whale_1h(market_id, now);

        let best_bid = rest.best_bid;
        let best_ask = rest.best_ask;
        let spread = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some((ask - bid).max(0.0)),
            _ => None,
        };
        let (day_of_week, hour_of_day) = Snapshot::context(now);

        let snapshot = Snapshot {
            market_id: market_id.clone(),
            at: now,
            tier: market.tier,
            price,
            best_bid,
            best_ask,
            spread,
            last_trade_price: rest.last_trade_price,
            price_change_1d: rest.price_change_1d,
            price_change_1w: rest.price_change_1w,
            price_change_1m: rest.price_change_1m,
            volume_total: rest.volume_total,
            volume_24h: rest.volume_24h,
            volume_1w: rest.volume_1w,
            liquidity: rest.liquidity,
            book,
            flow_1h,
            whale_1h,
            hours_to_close: market.hours_to_close(now),
            day_of_week,
            hour_of_day,
        };

        self.store.insert_snapshot(&snapshot).await?;
        self.registry.record_snapshot(market_id, now).await?;
        Ok(Some(snapshot))
    }

    /// Discovery REST section. `None` on failure or deadline.
    async fn rest_section(&self, market: &Market) -> Option<MarketDescriptor> {
        match timeout(
            self.soft_deadline,
            self.discovery.fetch_market(&market.condition_id),
        )
        .await
        {
            Ok(Ok(descriptor)) => descriptor,
            Ok(Err(e)) => {
                warn!(market_id = %market.condition_id, error = %e, "REST section failed");
                None
            }
            Err(_) => {
                warn!(market_id = %market.condition_id, "REST section deadline exceeded");
                None
            }
        }
    }

    /// Orderbook section for the YES token. `None` on failure, deadline, or
    /// a market without a YES token. Successful fetches also persist a
    /// sparse orderbook snapshot.
    async fn book_section(&self, market: &Market, now: DateTime<Utc>) -> Option<BookFeatures> {
        let token = market.yes_token_id.as_ref()?;
        match timeout(self.soft_deadline, self.books.get_orderbook(token)).await {
            Ok(Ok(book)) => {
                if let Err(e) = self
                    .store
                    .insert_orderbook_snapshot(&market.condition_id, &book, now)
                    .await
                {
                    warn!(market_id = %market.condition_id, error = %e, "Orderbook persist failed");
                }
                Some(BookFeatures::from_book(&book))
            }
            Ok(Err(e)) => {
                warn!(market_id = %market.condition_id, error = %e, "Orderbook section failed");
                None
            }
            Err(_) => {
                warn!(market_id = %market.condition_id, "Orderbook section deadline exceeded");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::collector::BufferConfig;
    use crate::domain::{Book, PriceLevel, Side, Tier, TokenId};
    use crate::store::memory::MemoryStore;
    use crate::testkit::discovery::{StaticDiscovery, StaticOrderbooks};
    use crate::testkit::domain as fixtures;

    struct Rig {
        assembler: SnapshotAssembler,
        discovery: Arc<StaticDiscovery>,
        books: Arc<StaticOrderbooks>,
        buffer: Arc<TradeRingBuffer>,
        registry: Arc<MarketRegistry>,
        store: Arc<MemoryStore>,
    }

    async fn rig(hours_to_close: f64) -> Rig {
        let config = CollectorConfig::default();
        let store = Arc::new(MemoryStore::new());
        let discovery = Arc::new(StaticDiscovery::new(vec![fixtures::descriptor(
            "0xa",
            hours_to_close,
            20_000.0,
        )]));
        let books = Arc::new(StaticOrderbooks::new());
        let buffer = Arc::new(TradeRingBuffer::new(&BufferConfig::default()));
        let registry = Arc::new(MarketRegistry::new(
            discovery.clone(),
            store.clone(),
            &config,
        ));
        registry.discover_once(fixtures::clock()).await.unwrap();
        let assembler = SnapshotAssembler::new(
            discovery.clone(),
            books.clone(),
            buffer.clone(),
            registry.clone(),
            store.clone(),
            &config,
        );
        Rig {
            assembler,
            discovery,
            books,
            buffer,
            registry,
            store,
        }
    }

    fn yes_book() -> Book {
        Book::new(
            TokenId::from("0xa-yes"),
            vec![PriceLevel::new(0.49, 300.0), PriceLevel::new(0.48, 900.0)],
            vec![PriceLevel::new(0.51, 250.0)],
        )
    }

    #[tokio::test]
    async fn t3_snapshot_includes_book_features() {
        let rig = rig(2.0).await; // tier 3
        rig.books.insert(yes_book());

        let snapshot = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap()
            .unwrap();

        let book = snapshot.book.expect("book section present");
        assert!((book.bid_depth_5 - 1_200.0).abs() < 1e-9);
        assert_eq!(book.bid_levels, 2);
        assert_eq!(snapshot.tier, Tier::T3);
        assert!((snapshot.spread.unwrap() - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn t1_snapshot_skips_orderbook_entirely() {
        let rig = rig(24.0).await; // tier 1
        rig.books.insert(yes_book());
        let snapshot = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.book.is_none());
    }

    /// Orderbook failure on a T3 market nulls the book section and keeps
    /// everything a T1 snapshot would have had.
    #[tokio::test]
    async fn orderbook_failure_nulls_section_but_persists() {
        let rig = rig(2.0).await;
        rig.books.fail_all(true);

        let snapshot = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap()
            .unwrap();

        assert!(snapshot.book.is_none());
        assert!(snapshot.price > 0.0);
        assert!(snapshot.best_bid.is_some());
        assert!(snapshot.best_ask.is_some());
        assert!(snapshot.volume_24h.is_some());
        assert!(snapshot.hours_to_close > 0.0);

        // Persisted exactly once and counted on the market.
        assert_eq!(rig.store.snapshot_count(&MarketId::from("0xa")), 1);
        let market = rig.registry.get(&MarketId::from("0xa")).unwrap();
        assert_eq!(market.snapshot_count, 1);
        assert_eq!(market.last_snapshot_at, Some(fixtures::clock()));
    }

    #[tokio::test]
    async fn missing_price_drops_snapshot() {
        let rig = rig(2.0).await;
        rig.discovery.update_market("0xa", |d| {
            d.price = None;
        });
        let result = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(rig.store.snapshot_count(&MarketId::from("0xa")), 0);
        assert_eq!(
            rig.registry.get(&MarketId::from("0xa")).unwrap().snapshot_count,
            0
        );
    }

    #[tokio::test]
    async fn rest_failure_with_no_price_drops_snapshot() {
        let rig = rig(2.0).await;
        rig.discovery.fail_listings(false);
        rig.discovery.set_markets(vec![]); // fetch_market now returns None
        let result = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn flow_fields_reflect_buffer_contents() {
        let rig = rig(2.0).await;
        rig.books.insert(yes_book());
        rig.buffer
            .push(fixtures::trade("0xa", 30, 2_500.0, Side::Buy, 2));
        rig.buffer
            .push(fixtures::trade("0xa", 10, 400.0, Side::Sell, 0));

        let snapshot = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap()
            .unwrap();

        let flow = snapshot.flow_1h.unwrap();
        assert_eq!(flow.trade_count, 2);
        assert_eq!(flow.buy_count, 1);
        let whale = snapshot.whale_1h.unwrap();
        assert_eq!(whale.whale_count, 1);
        assert!((whale.whale_volume - 2_500.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unsubscribed_market_has_null_flow() {
        let rig = rig(2.0).await;
        rig.books.insert(yes_book());
        let snapshot = rig
            .assembler
            .assemble(&MarketId::from("0xa"), fixtures::clock())
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.flow_1h.is_none());
        assert!(snapshot.whale_1h.is_none());
    }
}
