//! Application container: builds every component at startup and owns the
//! long-running loops.
//!
//! All process-wide state (registry, buffers, wallets, rate limiters,
//! subscription pool) lives in this container and is passed by reference
//! to each loop; there are no implicit globals. Shutdown fans out through
//! a watch channel; every loop selects on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::buffer::TradeRingBuffer;
use crate::collector::quotes::QuoteCache;
use crate::collector::subscriptions::{StreamFactory, SubscriptionManager};
use crate::collector::{SnapshotAssembler, TierScheduler};
use crate::config::{Config, StrategiesConfig, TradeMode};
use crate::engine::{
    EngineState, Executor, LiveExecutor, PaperExecutor, ResolutionReaper, RiskGate, Scanner,
    TradingEngine,
};
use crate::error::Result;
use crate::registry::MarketRegistry;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::strategy::{build_strategies, Strategy};
use crate::venue::{DiscoveryClient, OrderbookClient, TokenBucket, VenueTradeStream};

/// Fully-wired application.
pub struct App {
    config: Config,
    config_path: PathBuf,
    strategies_path: PathBuf,
    store: Arc<dyn Store>,
    registry: Arc<MarketRegistry>,
    buffer: Arc<TradeRingBuffer>,
    scheduler: Arc<TierScheduler>,
    subscriptions: Arc<SubscriptionManager>,
    engine: Arc<TradingEngine>,
    reaper: Arc<ResolutionReaper>,
    risk: Arc<RiskGate>,
    strategies: Arc<RwLock<Vec<Box<dyn Strategy>>>>,
    state: Arc<EngineState>,
}

impl App {
    /// Build the container from loaded configuration documents.
    pub async fn build(
        config: Config,
        strategies_config: StrategiesConfig,
        config_path: PathBuf,
        strategies_path: PathBuf,
    ) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database_path)?);

        // Venue adapters share per-client token buckets.
        let discovery_bucket = Arc::new(TokenBucket::new(
            config.collector.rate_limit.discovery_per_sec,
            config.collector.rate_limit.discovery_burst,
        ));
        let orderbook_bucket = Arc::new(TokenBucket::new(
            config.collector.rate_limit.orderbook_per_sec,
            config.collector.rate_limit.orderbook_burst,
        ));
        let discovery = Arc::new(DiscoveryClient::new(
            &config.venue,
            discovery_bucket,
            config.collector.page_size,
        ));
        let books = Arc::new(OrderbookClient::new(&config.venue, orderbook_bucket));

        let registry = Arc::new(MarketRegistry::new(
            discovery.clone(),
            store.clone(),
            &config.collector,
        ));
        let hydrated = registry.hydrate().await?;
        info!(markets = hydrated, "Registry hydrated");

        let buffer = Arc::new(TradeRingBuffer::new(&config.collector.buffer));
        let quotes = Arc::new(QuoteCache::new());

        let assembler = Arc::new(SnapshotAssembler::new(
            discovery.clone(),
            books.clone(),
            buffer.clone(),
            registry.clone(),
            store.clone(),
            &config.collector,
        ));
        let scheduler = Arc::new(TierScheduler::new(
            registry.clone(),
            assembler,
            buffer.clone(),
            store.clone(),
            config.collector.clone(),
        ));

        let ws_url = config.venue.ws_url.clone();
        let factory: StreamFactory =
            Arc::new(move |_id| Box::new(VenueTradeStream::new(ws_url.clone())) as _);
        let subscriptions = Arc::new(SubscriptionManager::new(
            registry.clone(),
            buffer.clone(),
            store.clone(),
            quotes.clone(),
            config.collector.clone(),
            factory,
        ));

        let state = Arc::new(EngineState::new(config.engine.starting_balance_usd));
        state.hydrate(&store).await?;
        for name in strategies_config.instance_names() {
            state.ensure_wallet(&name, config.engine.allocation_per_strategy_usd);
        }

        let strategies = Arc::new(RwLock::new(build_strategies(&strategies_config)));
        let risk = Arc::new(RiskGate::new(
            state.clone(),
            config.risk,
            config.sizing,
        ));

        let executor: Arc<dyn Executor> = match config.mode {
            TradeMode::Paper => Arc::new(PaperExecutor::new(
                books.clone(),
                quotes.clone(),
                config.execution,
            )),
            TradeMode::Live => {
                let api_key = std::env::var("POLYFLOW_API_KEY").unwrap_or_default();
                if api_key.is_empty() {
                    warn!("Live mode without POLYFLOW_API_KEY; orders will be rejected");
                }
                Arc::new(LiveExecutor::new(config.venue.clob_url.clone(), api_key))
            }
        };

        let engine = Arc::new(TradingEngine::new(
            Scanner::new(registry.clone(), store.clone()),
            strategies.clone(),
            risk.clone(),
            executor,
            state.clone(),
            store.clone(),
            config.engine,
            config.execution,
            config.mode,
        ));

        let reaper = Arc::new(ResolutionReaper::new(
            discovery,
            registry.clone(),
            state.clone(),
            store.clone(),
            config.engine.invalid_recovery_price,
        ));

        Ok(Self {
            config,
            config_path,
            strategies_path,
            store,
            registry,
            buffer,
            scheduler,
            subscriptions,
            engine,
            reaper,
            risk,
            strategies,
            state,
        })
    }

    /// Run every loop until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Seed the registry so the first tier ticks have work.
        if let Err(e) = self.registry.discover_once(Utc::now()).await {
            warn!(error = %e, "Initial discovery failed; loops will retry");
        }

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        handles.extend(self.scheduler.spawn_all(&shutdown_rx));

        let subs = self.subscriptions.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { subs.run_router(rx).await }));
        let subs = self.subscriptions.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { subs.run_refresh(rx).await }));

        let engine = self.engine.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { engine.run(rx).await }));

        handles.push(self.spawn_reaper_loop(shutdown_rx.clone()));
        handles.push(self.spawn_reload_loop(shutdown_rx.clone()));

        info!(loops = handles.len(), "polyflow running");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("Loop did not stop within grace period");
            }
        }
        self.state.persist_balances(&self.store).await?;
        info!(buffers = self.buffer.tracked_markets(), "polyflow stopped");
        Ok(())
    }

    fn spawn_reaper_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let reaper = self.reaper.clone();
        let period = Duration::from_secs(self.config.engine.reaper_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {}
                }
                if let Err(e) = reaper.run_once(Utc::now()).await {
                    warn!(error = %e, "Reap pass failed");
                }
            }
            info!("Reaper loop stopped");
        })
    }

    /// Re-read both config documents on change. A parse failure rejects the
    /// change and keeps the prior configuration.
    fn spawn_reload_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let risk = self.risk.clone();
        let strategies = self.strategies.clone();
        let state = self.state.clone();
        let config_path = self.config_path.clone();
        let strategies_path = self.strategies_path.clone();
        let allocation = self.config.engine.allocation_per_strategy_usd;
        let period = Duration::from_secs(self.config.engine.config_reload_secs.max(1));

        tokio::spawn(async move {
            let mut config_mtime = mtime(&config_path);
            let mut strategies_mtime = mtime(&strategies_path);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {}
                }

                let current = mtime(&config_path);
                if current != config_mtime {
                    config_mtime = current;
                    match Config::load(&config_path) {
                        Ok(config) => {
                            risk.update(config.risk, config.sizing);
                            info!("Risk/sizing limits reloaded");
                        }
                        Err(e) => {
                            error!(error = %e, "Config reload rejected; keeping prior limits");
                        }
                    }
                }

                let current = mtime(&strategies_path);
                if current != strategies_mtime {
                    strategies_mtime = current;
                    match StrategiesConfig::load(&strategies_path) {
                        Ok(config) => {
                            for name in config.instance_names() {
                                state.ensure_wallet(&name, allocation);
                            }
                            *strategies.write() = build_strategies(&config);
                            info!("Strategies reloaded; effective next scan cycle");
                        }
                        Err(e) => {
                            error!(error = %e, "Strategies reload rejected; keeping prior set");
                        }
                    }
                }
            }
            info!("Config reload loop stopped");
        })
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// One-shot discovery pass for the `discover` subcommand.
pub async fn discover_once(config: &Config) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.database_path)?);
    let bucket = Arc::new(TokenBucket::new(
        config.collector.rate_limit.discovery_per_sec,
        config.collector.rate_limit.discovery_burst,
    ));
    let discovery = Arc::new(DiscoveryClient::new(
        &config.venue,
        bucket,
        config.collector.page_size,
    ));
    let registry = Arc::new(MarketRegistry::new(discovery, store, &config.collector));
    registry.hydrate().await?;
    let summary = registry.discover_once(Utc::now()).await?;
    let census = registry.tier_census();
    println!(
        "discovered: fetched={} eligible={} added={} updated={}",
        summary.fetched, summary.eligible, summary.added, summary.updated
    );
    println!(
        "tier census: T0={} T1={} T2={} T3={} T4={}",
        census[0], census[1], census[2], census[3], census[4]
    );
    Ok(())
}

/// Read-only status report for the `status` subcommand.
pub async fn status(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.database_path)?;
    let markets = store.load_markets().await?;
    let open_positions = store.load_open_positions().await?;
    let balances = store.load_strategy_balances().await?;
    let paper = store.load_paper_balance().await?;

    let mut census = [0usize; 5];
    for market in markets.iter().filter(|m| m.is_collectable()) {
        census[market.tier.as_i32() as usize] += 1;
    }
    println!(
        "markets: {} tracked, {} collectable (T0={} T1={} T2={} T3={} T4={})",
        markets.len(),
        census.iter().sum::<usize>(),
        census[0],
        census[1],
        census[2],
        census[3],
        census[4]
    );
    println!("open positions: {}", open_positions.len());
    for wallet in &balances {
        println!(
            "  {}: available={} realized_pnl={} trades={} ({}W/{}L)",
            wallet.strategy,
            wallet.available,
            wallet.realized_pnl,
            wallet.trade_count,
            wallet.wins,
            wallet.losses
        );
    }
    if let Some(paper) = paper {
        println!(
            "paper balance: {} (hwm {}, drawdown {:.4})",
            paper.balance,
            paper.high_water_mark,
            paper.drawdown()
        );
    }
    Ok(())
}
