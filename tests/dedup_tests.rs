//! Deduplication under repeated and same-cycle signals.
//!
//! Risk decisions for a single strategy are serialized: the engine scans
//! strategies sequentially and settles each fill before evaluating the next
//! signal. Two signals on the same (strategy, market, token) must therefore
//! yield at most one approved decision, even within one cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use polyflow::collector::quotes::QuoteCache;
use polyflow::config::collector::CollectorConfig;
use polyflow::config::risk::{EngineConfig, ExecutionConfig, RiskConfig, SizingConfig, TradeMode};
use polyflow::domain::{Book, MarketId, PriceLevel, Side, Signal, Tier, TokenId};
use polyflow::engine::{
    EngineState, MarketView, PaperExecutor, RiskGate, Scanner, TradingEngine,
};
use polyflow::registry::MarketRegistry;
use polyflow::store::memory::MemoryStore;
use polyflow::store::Store;
use polyflow::strategy::Strategy;
use polyflow::testkit::discovery::{StaticDiscovery, StaticOrderbooks};
use polyflow::testkit::domain as fixtures;
use rust_decimal_macros::dec;

/// Test strategy that emits the same signal twice per scan.
struct DoubleTapper;

impl Strategy for DoubleTapper {
    fn name(&self) -> &str {
        "double-tapper"
    }

    fn version(&self) -> &str {
        "test/1"
    }

    fn filter(&self, _view: &MarketView) -> bool {
        true
    }

    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal> {
        views
            .iter()
            .flat_map(|view| {
                let make = || {
                    let mut signal = Signal::new(
                        self.name(),
                        self.version(),
                        view.market_id.clone(),
                        view.yes_token.clone().unwrap(),
                        Side::Buy,
                        "double tap",
                        0.05,
                        0.8,
                        dec!(0.50),
                        now,
                    );
                    signal.suggested_size = Some(dec!(20));
                    signal
                };
                vec![make(), make()]
            })
            .collect()
    }
}

async fn engine_with_double_tapper() -> (TradingEngine, Arc<MemoryStore>, Arc<EngineState>) {
    let store = Arc::new(MemoryStore::new());
    let discovery = Arc::new(StaticDiscovery::new(vec![fixtures::descriptor(
        "0xa", 3.0, 20_000.0,
    )]));
    let registry = Arc::new(MarketRegistry::new(
        discovery,
        store.clone(),
        &CollectorConfig::default(),
    ));
    registry.discover_once(fixtures::clock()).await.unwrap();
    store
        .insert_snapshot(&fixtures::snapshot("0xa", 0.50, Tier::T3))
        .await
        .unwrap();

    let books = Arc::new(StaticOrderbooks::new());
    books.insert(Book::new(
        TokenId::from("0xa-yes"),
        vec![PriceLevel::new(0.49, 100_000.0)],
        vec![PriceLevel::new(0.51, 100_000.0)],
    ));

    let state = Arc::new(EngineState::new(dec!(5000)));
    state.ensure_wallet("double-tapper", dec!(500));
    let strategies: Arc<RwLock<Vec<Box<dyn Strategy>>>> =
        Arc::new(RwLock::new(vec![Box::new(DoubleTapper)]));
    let risk = Arc::new(RiskGate::new(
        state.clone(),
        RiskConfig::default(),
        SizingConfig::default(),
    ));
    let executor = Arc::new(PaperExecutor::new(
        books,
        Arc::new(QuoteCache::new()),
        ExecutionConfig::default(),
    ));

    let engine = TradingEngine::new(
        Scanner::new(registry, store.clone()),
        strategies,
        risk,
        executor,
        state.clone(),
        store.clone(),
        EngineConfig::default(),
        ExecutionConfig::default(),
        TradeMode::Paper,
    );
    (engine, store, state)
}

#[tokio::test]
async fn same_cycle_duplicate_signals_approve_at_most_once() {
    let (engine, store, state) = engine_with_double_tapper().await;
    let summary = engine.scan_cycle(fixtures::clock()).await.unwrap();

    assert_eq!(summary.signals, 2);
    assert_eq!(summary.approved, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(state.open_position_count(), 1);

    let approvals = store
        .decisions()
        .iter()
        .filter(|d| d.outcome.is_approved())
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn cross_cycle_duplicates_stay_rejected_until_position_closes() {
    let (engine, _store, state) = engine_with_double_tapper().await;
    engine.scan_cycle(fixtures::clock()).await.unwrap();
    let second = engine.scan_cycle(fixtures::clock()).await.unwrap();
    assert_eq!(second.approved, 0);
    assert_eq!(state.open_position_count(), 1);

    // Close the position; the next cycle may open a fresh one.
    let open = state.open_positions();
    state
        .settle_position(&open[0].id, dec!(0.6), rust_decimal::Decimal::ZERO, fixtures::clock())
        .unwrap();
    let third = engine.scan_cycle(fixtures::clock()).await.unwrap();
    assert_eq!(third.approved, 1);
}

#[tokio::test]
async fn dedup_is_scoped_to_the_market_token_pair() {
    let (engine, _store, state) = engine_with_double_tapper().await;
    engine.scan_cycle(fixtures::clock()).await.unwrap();
    // A different token on the same market is not a duplicate.
    assert!(!state.has_open(
        "double-tapper",
        &MarketId::from("0xa"),
        &TokenId::from("0xa-no")
    ));
}
