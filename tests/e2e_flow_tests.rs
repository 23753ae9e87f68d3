//! End-to-end flow over mocks: discover -> snapshot -> scan -> gate ->
//! fill -> resolve -> settle.

use std::sync::Arc;

use parking_lot::RwLock;
use polyflow::buffer::TradeRingBuffer;
use polyflow::collector::quotes::QuoteCache;
use polyflow::collector::SnapshotAssembler;
use polyflow::config::collector::CollectorConfig;
use polyflow::config::risk::{EngineConfig, ExecutionConfig, RiskConfig, SizingConfig, TradeMode};
use polyflow::config::strategy::StrategiesConfig;
use polyflow::domain::{Book, MarketId, Outcome, PriceLevel, TokenId};
use polyflow::engine::{
    EngineState, PaperExecutor, ResolutionReaper, RiskGate, Scanner, TradingEngine,
};
use polyflow::registry::MarketRegistry;
use polyflow::store::memory::MemoryStore;
use polyflow::store::Store;
use polyflow::strategy::build_strategies;
use polyflow::testkit::discovery::{StaticDiscovery, StaticOrderbooks};
use polyflow::testkit::domain as fixtures;
use rust_decimal_macros::dec;

const STRATEGIES: &str = r#"
[[longshot]]
name = "ls"
min_probability = 0.92
max_hours_to_close = 48.0
min_liquidity = 0.0
size_usd = 40.0
"#;

#[tokio::test]
async fn full_pipeline_from_discovery_to_settlement() {
    let now = fixtures::clock();
    let store = Arc::new(MemoryStore::new());

    // Venue: one market, YES trading at 0.95, three hours out.
    let discovery = Arc::new(StaticDiscovery::new(vec![{
        let mut d = fixtures::descriptor("0xa", 3.0, 20_000.0);
        d.price = Some(0.95);
        d.best_bid = Some(0.94);
        d.best_ask = Some(0.96);
        d
    }]));
    let books = Arc::new(StaticOrderbooks::new());
    books.insert(Book::new(
        TokenId::from("0xa-yes"),
        vec![PriceLevel::new(0.94, 50_000.0)],
        vec![PriceLevel::new(0.96, 50_000.0)],
    ));

    let collector_config = CollectorConfig::default();
    let registry = Arc::new(MarketRegistry::new(
        discovery.clone(),
        store.clone(),
        &collector_config,
    ));
    let buffer = Arc::new(TradeRingBuffer::new(&collector_config.buffer));

    // 1. Discovery tracks the market at tier 3.
    let summary = registry.discover_once(now).await.unwrap();
    assert_eq!(summary.added, 1);
    let market = registry.get(&MarketId::from("0xa")).unwrap();
    assert_eq!(market.tier.as_i32(), 3);

    // 2. The assembler produces a priced snapshot with book features.
    let assembler = SnapshotAssembler::new(
        discovery.clone(),
        books.clone(),
        buffer.clone(),
        registry.clone(),
        store.clone(),
        &collector_config,
    );
    let snapshot = assembler
        .assemble(&MarketId::from("0xa"), now)
        .await
        .unwrap()
        .expect("snapshot persisted");
    assert!((snapshot.price - 0.95).abs() < 1e-9);
    assert!(snapshot.book.is_some());

    // 3. The engine scans, gates, and fills a longshot entry.
    let state = Arc::new(EngineState::new(dec!(5000)));
    state.ensure_wallet("ls", dec!(500));
    let strategies_config = StrategiesConfig::parse_toml(STRATEGIES).unwrap();
    let engine = TradingEngine::new(
        Scanner::new(registry.clone(), store.clone()),
        Arc::new(RwLock::new(build_strategies(&strategies_config))),
        Arc::new(RiskGate::new(
            state.clone(),
            RiskConfig::default(),
            SizingConfig::default(),
        )),
        Arc::new(PaperExecutor::new(
            books.clone(),
            Arc::new(QuoteCache::new()),
            ExecutionConfig::default(),
        )),
        state.clone(),
        store.clone(),
        EngineConfig::default(),
        ExecutionConfig::default(),
        TradeMode::Paper,
    );
    let cycle = engine.scan_cycle(now).await.unwrap();
    assert_eq!(cycle.filled, 1);
    let position = &state.open_positions()[0];
    assert_eq!(position.token_id, TokenId::from("0xa-yes"));
    let entry_cost = position.cost_basis;
    assert!(entry_cost > dec!(39) && entry_cost <= dec!(41));

    // 4. The venue resolves YES; the reaper settles the position at 1.0.
    discovery.update_market("0xa", |d| {
        d.closed = true;
        d.active = false;
        d.outcome_prices = Some((1.0, 0.0));
    });
    let reaper = ResolutionReaper::new(
        discovery,
        registry.clone(),
        state.clone(),
        store.clone(),
        dec!(0.5),
    );
    let reap = reaper.run_once(now + chrono::Duration::hours(4)).await.unwrap();
    assert_eq!(reap.resolved, 1);
    assert_eq!(reap.positions_closed, 1);

    // Post-conditions: market resolved, wallet made whole plus profit,
    // full audit trail present.
    let market = registry.get(&MarketId::from("0xa")).unwrap();
    assert_eq!(market.outcome, Some(Outcome::Yes));
    assert!(!market.active);

    let wallet = state.wallet("ls").unwrap();
    assert_eq!(wallet.wins, 1);
    assert!(wallet.realized_pnl > rust_decimal::Decimal::ZERO);
    assert_eq!(state.open_position_count(), 0);

    assert_eq!(store.signals().len(), 1);
    assert_eq!(store.decisions().len(), 1);
    assert_eq!(store.executor_trades().len(), 1);
    assert!(store.load_paper_balance().await.unwrap().is_some());
}

#[tokio::test]
async fn pipeline_survives_discovery_outage() {
    let now = fixtures::clock();
    let store = Arc::new(MemoryStore::new());
    let discovery = Arc::new(StaticDiscovery::new(vec![fixtures::descriptor(
        "0xa", 3.0, 20_000.0,
    )]));
    let registry = Arc::new(MarketRegistry::new(
        discovery.clone(),
        store.clone(),
        &CollectorConfig::default(),
    ));
    registry.discover_once(now).await.unwrap();

    // The venue goes dark: discovery passes fail, but the registry keeps
    // serving the tracked set.
    discovery.fail_listings(true);
    assert!(registry.discover_once(now).await.is_err());
    assert_eq!(registry.active_markets().len(), 1);

    // Recovery is idempotent.
    discovery.fail_listings(false);
    let summary = registry.discover_once(now).await.unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.updated, 1);
}
