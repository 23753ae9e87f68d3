//! Tier scheduler: periodic dispatch loops for the collection pipeline.
//!
//! Five snapshot loops (one per tier, at that tier's cadence), a tier
//! recomputation loop, a discovery loop, and a stale-market sweeper. Each
//! loop is an independent tokio task hung off a shared shutdown channel.
//!
//! Overrun policy: ticks are never queued. When a pass runs longer than its
//! interval the missed ticks are skipped and the skip is logged against the
//! tier. Every pass records a row in `task_runs`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::buffer::TradeRingBuffer;
use crate::collector::assembler::SnapshotAssembler;
use crate::config::collector::CollectorConfig;
use crate::domain::Tier;
use crate::registry::MarketRegistry;
use crate::store::{Store, TaskRun};

/// Outcome counters from one tier pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierPass {
    pub snapshots: usize,
    pub dropped: usize,
    pub failed: usize,
}

/// Periodic dispatcher for the collection pipeline.
pub struct TierScheduler {
    registry: Arc<MarketRegistry>,
    assembler: Arc<SnapshotAssembler>,
    buffer: Arc<TradeRingBuffer>,
    store: Arc<dyn Store>,
    config: CollectorConfig,
}

impl TierScheduler {
    #[must_use]
    pub fn new(
        registry: Arc<MarketRegistry>,
        assembler: Arc<SnapshotAssembler>,
        buffer: Arc<TradeRingBuffer>,
        store: Arc<dyn Store>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            registry,
            assembler,
            buffer,
            store,
            config,
        }
    }

    /// Snapshot every collectable market currently in `tier`.
    ///
    /// Adapter failures are contained per market; a single bad market never
    /// halts the pass.
    pub async fn snapshot_tier(&self, tier: Tier) -> TierPass {
        let now = Utc::now();
        let markets = self.registry.markets_in_tier(tier);
        let mut pass = TierPass::default();

        for market in &markets {
            match self.assembler.assemble(&market.condition_id, now).await {
                Ok(Some(_)) => pass.snapshots += 1,
                Ok(None) => pass.dropped += 1,
                Err(e) => {
                    pass.failed += 1;
                    warn!(
                        market_id = %market.condition_id,
                        tier = tier.as_i32(),
                        error = %e,
                        "Snapshot assembly failed"
                    );
                }
            }
        }

        if !markets.is_empty() {
            debug!(
                tier = tier.as_i32(),
                snapshots = pass.snapshots,
                dropped = pass.dropped,
                failed = pass.failed,
                "Tier pass complete"
            );
        }
        pass
    }

    async fn record_run(&self, task: &str, started: chrono::DateTime<Utc>, outcome: Result<String, String>) {
        let run = match outcome {
            Ok(detail) => TaskRun {
                detail: (!detail.is_empty()).then_some(detail),
                ..TaskRun::ok(task, started, Utc::now())
            },
            Err(err) => TaskRun::error(task, started, Utc::now(), err),
        };
        if let Err(e) = self.store.record_task_run(&run).await {
            warn!(task, error = %e, "Task run bookkeeping failed");
        }
    }

    async fn tier_loop(self: Arc<Self>, tier: Tier, mut shutdown: watch::Receiver<bool>) {
        let period = tier.snapshot_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let task = format!("snapshot_tier_{}", tier.as_i32());

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let started = Utc::now();
            let t0 = Instant::now();
            let pass = self.snapshot_tier(tier).await;
            let elapsed = t0.elapsed();
            if elapsed > period {
                let skipped = (elapsed.as_secs_f64() / period.as_secs_f64()) as u64;
                warn!(
                    tier = tier.as_i32(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    skipped_ticks = skipped,
                    "Tier pass overran its interval; skipping missed ticks"
                );
            }
            self.record_run(
                &task,
                started,
                Ok(format!(
                    "snapshots={} dropped={} failed={}",
                    pass.snapshots, pass.dropped, pass.failed
                )),
            )
            .await;
        }
        info!(tier = tier.as_i32(), "Tier loop stopped");
    }

    async fn discovery_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.discovery_interval_secs.max(1),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let started = Utc::now();
            let outcome = match self.registry.discover_once(started).await {
                Ok(summary) => Ok(format!(
                    "fetched={} added={} updated={}",
                    summary.fetched, summary.added, summary.updated
                )),
                Err(e) => {
                    warn!(error = %e, "Discovery pass failed");
                    Err(e.to_string())
                }
            };
            self.record_run("discovery", started, outcome).await;
        }
        info!("Discovery loop stopped");
    }

    async fn recompute_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.recompute_interval_secs.max(1),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let started = Utc::now();
            let outcome = match self.registry.recompute_tiers(started).await {
                Ok(transitions) => Ok(format!("transitions={}", transitions.len())),
                Err(e) => {
                    warn!(error = %e, "Tier recompute failed");
                    Err(e.to_string())
                }
            };
            self.record_run("tier_recompute", started, outcome).await;
        }
        info!("Tier recompute loop stopped");
    }

    async fn stale_sweep_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.stale_sweep_interval_secs.max(1),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            let started = Utc::now();
            let pruned = self.buffer.prune(started);
            let outcome = match self.registry.sweep_stale(started).await {
                Ok(swept) => Ok(format!("deactivated={} buffers_pruned={pruned}", swept.len())),
                Err(e) => {
                    warn!(error = %e, "Stale sweep failed");
                    Err(e.to_string())
                }
            };
            self.record_run("stale_sweep", started, outcome).await;
        }
        info!("Stale sweep loop stopped");
    }

    /// Spawn every scheduler loop: five tier loops plus discovery,
    /// recompute, and stale-sweep.
    pub fn spawn_all(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for tier in Tier::ALL {
            handles.push(tokio::spawn(
                self.clone().tier_loop(tier, shutdown.clone()),
            ));
        }
        handles.push(tokio::spawn(
            self.clone().discovery_loop(shutdown.clone()),
        ));
        handles.push(tokio::spawn(
            self.clone().recompute_loop(shutdown.clone()),
        ));
        handles.push(tokio::spawn(
            self.clone().stale_sweep_loop(shutdown.clone()),
        ));
        info!(loops = handles.len(), "Tier scheduler started");
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::collector::BufferConfig;
    use crate::domain::MarketId;
    use crate::store::memory::MemoryStore;
    use crate::testkit::discovery::{StaticDiscovery, StaticOrderbooks};
    use crate::testkit::domain as fixtures;

    async fn scheduler_with(
        descriptors: Vec<crate::venue::traits::MarketDescriptor>,
    ) -> (Arc<TierScheduler>, Arc<MemoryStore>) {
        let config = CollectorConfig::default();
        let store = Arc::new(MemoryStore::new());
        let discovery = Arc::new(StaticDiscovery::new(descriptors));
        let books = Arc::new(StaticOrderbooks::new());
        let buffer = Arc::new(TradeRingBuffer::new(&BufferConfig::default()));
        let registry = Arc::new(MarketRegistry::new(
            discovery.clone(),
            store.clone(),
            &config,
        ));
        registry.discover_once(fixtures::clock()).await.unwrap();
        let assembler = Arc::new(SnapshotAssembler::new(
            discovery,
            books,
            buffer.clone(),
            registry.clone(),
            store.clone(),
            &config,
        ));
        (
            Arc::new(TierScheduler::new(
                registry,
                assembler,
                buffer,
                store.clone(),
                config,
            )),
            store,
        )
    }

    #[tokio::test]
    async fn tier_pass_only_touches_matching_tier() {
        let (scheduler, store) = scheduler_with(vec![
            fixtures::descriptor("0xt3", 2.0, 20_000.0),
            fixtures::descriptor("0xt0", 100.0, 20_000.0),
        ])
        .await;

        let pass = scheduler.snapshot_tier(Tier::T3).await;
        assert_eq!(pass.snapshots, 1);
        assert_eq!(store.snapshot_count(&MarketId::from("0xt3")), 1);
        assert_eq!(store.snapshot_count(&MarketId::from("0xt0")), 0);
    }

    #[tokio::test]
    async fn empty_tier_is_a_noop() {
        let (scheduler, _store) = scheduler_with(vec![]).await;
        let pass = scheduler.snapshot_tier(Tier::T4).await;
        assert_eq!(pass, TierPass::default());
    }

    #[tokio::test]
    async fn shutdown_stops_loops() {
        let (scheduler, _store) = scheduler_with(vec![]).await;
        let (tx, rx) = watch::channel(false);
        let handles = scheduler.spawn_all(&rx);
        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(std::time::Duration::from_secs(1), handle)
                .await
                .expect("loop should stop on shutdown")
                .unwrap();
        }
    }
}
