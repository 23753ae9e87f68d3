//! Market registry: the authoritative in-memory set of tracked markets.
//!
//! Discovery inserts and refreshes markets, tier recomputation moves them
//! through the urgency ladder, and deactivation retires them. All writes
//! flow through here so tier transitions are recorded exactly once; the
//! durable copy is mirrored to the [`Store`] as rows change.
//!
//! Locking: discovery and tier recomputation take the write lock for the
//! whole pass (writer-takes-all); scans take cheap read locks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::collector::CollectorConfig;
use crate::domain::{
    Market, MarketId, Outcome, Tier, TierTransition, TokenId, TransitionReason,
};
use crate::error::Result;
use crate::store::Store;
use crate::venue::traits::{MarketDescriptor, MarketDiscovery};

/// Counters from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Markets returned by the venue after pagination.
    pub fetched: usize,
    /// Markets passing the tracking filter.
    pub eligible: usize,
    /// Newly inserted markets.
    pub added: usize,
    /// Already-known markets refreshed in place.
    pub updated: usize,
}

/// Authoritative registry of tracked markets.
pub struct MarketRegistry {
    markets: RwLock<HashMap<MarketId, Market>>,
    discovery: Arc<dyn MarketDiscovery>,
    store: Arc<dyn Store>,
    volume_threshold_24h: f64,
    lookahead_hours: f64,
}

impl MarketRegistry {
    #[must_use]
    pub fn new(
        discovery: Arc<dyn MarketDiscovery>,
        store: Arc<dyn Store>,
        config: &CollectorConfig,
    ) -> Self {
        Self {
            markets: RwLock::new(HashMap::new()),
            discovery,
            store,
            volume_threshold_24h: config.volume_threshold_24h,
            lookahead_hours: config.lookahead_hours,
        }
    }

    /// Load persisted markets into memory. Called once at startup.
    pub async fn hydrate(&self) -> Result<usize> {
        let persisted = self.store.load_markets().await?;
        let mut markets = self.markets.write();
        for market in persisted {
            markets.insert(market.condition_id.clone(), market);
        }
        Ok(markets.len())
    }

    fn passes_filter(&self, d: &MarketDescriptor, now: DateTime<Utc>) -> bool {
        if !d.enable_order_book || !d.active || d.closed {
            return false;
        }
        if d.volume_24h.unwrap_or(0.0) < self.volume_threshold_24h {
            return false;
        }
        let Some(end_date) = d.end_date else {
            return false;
        };
        let hours = (end_date - now).num_milliseconds() as f64 / 3_600_000.0;
        hours > 0.0 && hours <= self.lookahead_hours
    }

    /// One discovery pass: pull active markets, filter, insert new ones and
    /// refresh known ones. Idempotent on condition id — repeated passes over
    /// the same venue response never duplicate markets.
    pub async fn discover_once(&self, now: DateTime<Utc>) -> Result<DiscoverySummary> {
        let descriptors = self.discovery.list_active_markets().await?;
        let mut summary = DiscoverySummary {
            fetched: descriptors.len(),
            ..DiscoverySummary::default()
        };

        let mut changed: Vec<Market> = Vec::new();
        {
            let mut markets = self.markets.write();
            for d in descriptors {
                if !self.passes_filter(&d, now) {
                    continue;
                }
                summary.eligible += 1;
                let id = MarketId::from(d.condition_id.clone());
                match markets.get_mut(&id) {
                    Some(existing) => {
                        existing.active = d.active;
                        existing.closed = d.closed;
                        if let Some(end_date) = d.end_date {
                            existing.end_date = end_date;
                        }
                        if existing.category.is_none() {
                            existing.category = d.category.clone();
                        }
                        summary.updated += 1;
                        changed.push(existing.clone());
                    }
                    None => {
                        let end_date = d.end_date.unwrap_or(now);
                        let hours = (end_date - now).num_milliseconds() as f64 / 3_600_000.0;
                        let market = Market {
                            condition_id: id.clone(),
                            slug: d.slug.clone(),
                            question: d.question.clone(),
                            yes_token_id: d.yes_token_id.clone().map(TokenId::from),
                            no_token_id: d.no_token_id.clone().map(TokenId::from),
                            end_date,
                            category: d.category.clone(),
                            initial_price: d.price,
                            initial_volume: d.volume_24h,
                            initial_liquidity: d.liquidity,
                            active: true,
                            closed: false,
                            resolved: false,
                            outcome: None,
                            tier: Tier::from_hours_to_close(hours),
                            tracked_since: now,
                            snapshot_count: 0,
                            last_snapshot_at: None,
                            last_trade_at: None,
                        };
                        debug!(
                            market_id = %id,
                            tier = market.tier.as_i32(),
                            hours_to_close = hours,
                            "Tracking new market"
                        );
                        markets.insert(id, market.clone());
                        summary.added += 1;
                        changed.push(market);
                    }
                }
            }
        }

        for market in &changed {
            self.store.upsert_market(market).await?;
        }

        info!(
            fetched = summary.fetched,
            eligible = summary.eligible,
            added = summary.added,
            updated = summary.updated,
            "Discovery pass complete"
        );
        Ok(summary)
    }

    /// Recompute every collectable market's tier from its hours-to-close.
    ///
    /// Exactly one transition is emitted per boundary crossing. Markets past
    /// their end date are deactivated with reason `expired`.
    pub async fn recompute_tiers(&self, now: DateTime<Utc>) -> Result<Vec<TierTransition>> {
        let mut transitions = Vec::new();
        let mut changed: Vec<Market> = Vec::new();
        {
            let mut markets = self.markets.write();
            for market in markets.values_mut() {
                if !market.is_collectable() {
                    continue;
                }
                let hours = market.hours_to_close(now);
                if hours <= 0.0 {
                    market.active = false;
                    transitions.push(TierTransition {
                        market_id: market.condition_id.clone(),
                        from_tier: market.tier.as_i32(),
                        to_tier: -1,
                        at: now,
                        hours_to_close: hours,
                        reason: TransitionReason::Expired,
                    });
                    changed.push(market.clone());
                    continue;
                }
                let next = Tier::from_hours_to_close(hours);
                if next != market.tier {
                    let reason = if next > market.tier {
                        TransitionReason::Promotion
                    } else {
                        TransitionReason::Demotion
                    };
                    transitions.push(TierTransition {
                        market_id: market.condition_id.clone(),
                        from_tier: market.tier.as_i32(),
                        to_tier: next.as_i32(),
                        at: now,
                        hours_to_close: hours,
                        reason,
                    });
                    market.tier = next;
                    changed.push(market.clone());
                }
            }
        }

        for market in &changed {
            self.store.upsert_market(market).await?;
        }
        for transition in &transitions {
            self.store.insert_tier_transition(transition).await?;
        }
        if !transitions.is_empty() {
            info!(transitions = transitions.len(), "Tier recompute complete");
        }
        Ok(transitions)
    }

    /// Retire a market from collection, recording a transition to tier -1.
    pub async fn deactivate(
        &self,
        market_id: &MarketId,
        reason: TransitionReason,
        now: DateTime<Utc>,
    ) -> Result<Option<TierTransition>> {
        let (transition, market) = {
            let mut markets = self.markets.write();
            let Some(market) = markets.get_mut(market_id) else {
                return Ok(None);
            };
            if !market.active {
                return Ok(None);
            }
            market.active = false;
            let transition = TierTransition {
                market_id: market_id.clone(),
                from_tier: market.tier.as_i32(),
                to_tier: -1,
                at: now,
                hours_to_close: market.hours_to_close(now),
                reason,
            };
            (transition, market.clone())
        };

        warn!(market_id = %market_id, reason = reason.as_str(), "Deactivating market");
        self.store.upsert_market(&market).await?;
        self.store.insert_tier_transition(&transition).await?;
        Ok(Some(transition))
    }

    /// Assign a terminal outcome and retire the market. The reaper is the
    /// only caller.
    pub async fn resolve(
        &self,
        market_id: &MarketId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let market = {
            let mut markets = self.markets.write();
            let Some(market) = markets.get_mut(market_id) else {
                return Ok(());
            };
            market.resolve(outcome);
            market.clone()
        };
        self.store.upsert_market(&market).await?;
        self.deactivate(market_id, TransitionReason::Resolved, now)
            .await?;
        Ok(())
    }

    /// Mark that the venue confirmed the market closed without an
    /// unambiguous outcome. Positions stay open.
    pub async fn mark_closed_unresolved(&self, market_id: &MarketId) -> Result<()> {
        let market = {
            let mut markets = self.markets.write();
            let Some(market) = markets.get_mut(market_id) else {
                return Ok(());
            };
            market.closed = true;
            market.clone()
        };
        self.store.upsert_market(&market).await
    }

    /// Deactivate markets whose last trade is older than their tier's
    /// staleness threshold. Markets that have never traded are measured from
    /// tracking start.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<Vec<MarketId>> {
        let stale: Vec<MarketId> = {
            let markets = self.markets.read();
            markets
                .values()
                .filter(|m| m.is_collectable())
                .filter(|m| {
                    let last_seen = m.last_trade_at.unwrap_or(m.tracked_since);
                    now - last_seen > m.tier.stale_after()
                })
                .map(|m| m.condition_id.clone())
                .collect()
        };
        for market_id in &stale {
            self.deactivate(market_id, TransitionReason::NoTrades, now)
                .await?;
        }
        Ok(stale)
    }

    /// Bump snapshot bookkeeping after a successful assembly.
    pub async fn record_snapshot(&self, market_id: &MarketId, at: DateTime<Utc>) -> Result<()> {
        let market = {
            let mut markets = self.markets.write();
            let Some(market) = markets.get_mut(market_id) else {
                return Ok(());
            };
            market.snapshot_count += 1;
            market.last_snapshot_at = Some(at);
            market.clone()
        };
        self.store.upsert_market(&market).await
    }

    /// Update the trade heartbeat. Memory-only; the row is mirrored on the
    /// next discovery or recompute pass.
    pub fn mark_trade(&self, market_id: &MarketId, at: DateTime<Utc>) {
        let mut markets = self.markets.write();
        if let Some(market) = markets.get_mut(market_id) {
            if market.last_trade_at.map_or(true, |prev| at > prev) {
                market.last_trade_at = Some(at);
            }
        }
    }

    // -- read access -----------------------------------------------------

    #[must_use]
    pub fn get(&self, market_id: &MarketId) -> Option<Market> {
        self.markets.read().get(market_id).cloned()
    }

    /// Resolve a market by one of its outcome tokens.
    #[must_use]
    pub fn market_for_token(&self, token_id: &TokenId) -> Option<Market> {
        self.markets
            .read()
            .values()
            .find(|m| {
                m.yes_token_id.as_ref() == Some(token_id)
                    || m.no_token_id.as_ref() == Some(token_id)
            })
            .cloned()
    }

    /// Collectable markets currently in `tier`.
    #[must_use]
    pub fn markets_in_tier(&self, tier: Tier) -> Vec<Market> {
        self.markets
            .read()
            .values()
            .filter(|m| m.tier == tier && m.is_collectable())
            .cloned()
            .collect()
    }

    /// All collectable markets.
    #[must_use]
    pub fn active_markets(&self) -> Vec<Market> {
        self.markets
            .read()
            .values()
            .filter(|m| m.is_collectable())
            .cloned()
            .collect()
    }

    /// Per-tier census of collectable markets, indexed by tier number.
    #[must_use]
    pub fn tier_census(&self) -> [usize; 5] {
        let mut census = [0usize; 5];
        for market in self.markets.read().values() {
            if market.is_collectable() {
                census[market.tier.as_i32() as usize] += 1;
            }
        }
        census
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::testkit::discovery::StaticDiscovery;
    use crate::testkit::domain::descriptor;
    use chrono::TimeZone;

    fn config() -> CollectorConfig {
        CollectorConfig {
            volume_threshold_24h: 1_000.0,
            lookahead_hours: 336.0,
            ..CollectorConfig::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn registry_with(
        descriptors: Vec<MarketDescriptor>,
    ) -> (MarketRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let discovery = Arc::new(StaticDiscovery::new(descriptors));
        let registry = MarketRegistry::new(discovery, store.clone(), &config());
        (registry, store)
    }

    #[tokio::test]
    async fn discovery_inserts_and_is_idempotent() {
        let (registry, _store) = registry_with(vec![
            descriptor("0xa", 5.0, 20_000.0),
            descriptor("0xb", 30.0, 5_000.0),
        ]);

        let first = registry.discover_once(now()).await.unwrap();
        assert_eq!(first.added, 2);

        let second = registry.discover_once(now()).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(registry.active_markets().len(), 2);
    }

    #[tokio::test]
    async fn discovery_filters_low_volume_and_horizon() {
        let mut thin = descriptor("0xthin", 5.0, 10.0); // below volume floor
        thin.liquidity = Some(1.0);
        let far = descriptor("0xfar", 9_999.0, 50_000.0); // beyond lookahead
        let mut no_book = descriptor("0xnobook", 5.0, 50_000.0);
        no_book.enable_order_book = false;

        let (registry, _store) = registry_with(vec![thin, far, no_book]);
        let summary = registry.discover_once(now()).await.unwrap();
        assert_eq!(summary.eligible, 0);
        assert!(registry.active_markets().is_empty());
    }

    #[tokio::test]
    async fn initial_tier_matches_hours_to_close() {
        let (registry, _store) = registry_with(vec![
            descriptor("0xt4", 0.75, 20_000.0),
            descriptor("0xt3", 2.0, 20_000.0),
            descriptor("0xt2", 8.0, 20_000.0),
            descriptor("0xt1", 24.0, 20_000.0),
            descriptor("0xt0", 100.0, 20_000.0),
        ]);
        registry.discover_once(now()).await.unwrap();
        assert_eq!(registry.get(&MarketId::from("0xt4")).unwrap().tier, Tier::T4);
        assert_eq!(registry.get(&MarketId::from("0xt3")).unwrap().tier, Tier::T3);
        assert_eq!(registry.get(&MarketId::from("0xt2")).unwrap().tier, Tier::T2);
        assert_eq!(registry.get(&MarketId::from("0xt1")).unwrap().tier, Tier::T1);
        assert_eq!(registry.get(&MarketId::from("0xt0")).unwrap().tier, Tier::T0);
    }

    #[tokio::test]
    async fn recompute_emits_one_transition_per_crossing() {
        // Market 45 minutes from close: tier 4 at discovery.
        let (registry, store) = registry_with(vec![descriptor("0xa", 0.75, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();
        assert_eq!(registry.get(&MarketId::from("0xa")).unwrap().tier, Tier::T4);

        // 30 minutes later: still tier 4, no transition.
        let t1 = now() + chrono::Duration::minutes(30);
        let transitions = registry.recompute_tiers(t1).await.unwrap();
        assert!(transitions.is_empty());

        // Another 45 minutes: past end date, deactivated as expired.
        let t2 = t1 + chrono::Duration::minutes(45);
        let transitions = registry.recompute_tiers(t2).await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to_tier, -1);
        assert_eq!(transitions[0].reason, TransitionReason::Expired);
        assert!(!registry.get(&MarketId::from("0xa")).unwrap().active);
        assert_eq!(store.tier_transitions().len(), 1);
    }

    #[tokio::test]
    async fn promotion_as_clock_advances() {
        // 5 hours out: tier 2. After 2 hours: 3 hours out -> tier 3.
        let (registry, _store) = registry_with(vec![descriptor("0xa", 5.0, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();
        let transitions = registry
            .recompute_tiers(now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_tier, 2);
        assert_eq!(transitions[0].to_tier, 3);
        assert_eq!(transitions[0].reason, TransitionReason::Promotion);
    }

    #[tokio::test]
    async fn deactivate_is_single_shot() {
        let (registry, store) = registry_with(vec![descriptor("0xa", 5.0, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();

        let first = registry
            .deactivate(&MarketId::from("0xa"), TransitionReason::Delisted, now())
            .await
            .unwrap();
        assert!(first.is_some());
        let second = registry
            .deactivate(&MarketId::from("0xa"), TransitionReason::Delisted, now())
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.tier_transitions().len(), 1);
    }

    #[tokio::test]
    async fn stale_sweep_uses_tier_thresholds() {
        let (registry, _store) = registry_with(vec![
            descriptor("0xhot", 0.5, 20_000.0),  // T4: stale after 1h
            descriptor("0xcold", 100.0, 20_000.0), // T0: stale after 7d
        ]);
        registry.discover_once(now()).await.unwrap();

        // Both quiet for 2 hours: only the T4 market goes stale.
        let swept = registry
            .sweep_stale(now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(swept, vec![MarketId::from("0xhot")]);
    }

    #[tokio::test]
    async fn trade_heartbeat_defers_staleness() {
        let (registry, _store) = registry_with(vec![descriptor("0xhot", 0.5, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();
        registry.mark_trade(
            &MarketId::from("0xhot"),
            now() + chrono::Duration::minutes(90),
        );
        let swept = registry
            .sweep_stale(now() + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert!(swept.is_empty());
    }

    #[tokio::test]
    async fn resolve_sets_outcome_and_retires() {
        let (registry, _store) = registry_with(vec![descriptor("0xa", 5.0, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();
        registry
            .resolve(&MarketId::from("0xa"), Outcome::Yes, now())
            .await
            .unwrap();
        let market = registry.get(&MarketId::from("0xa")).unwrap();
        assert!(market.resolved);
        assert_eq!(market.outcome, Some(Outcome::Yes));
        assert!(!market.active);
    }

    #[tokio::test]
    async fn token_lookup_finds_market() {
        let (registry, _store) = registry_with(vec![descriptor("0xa", 5.0, 20_000.0)]);
        registry.discover_once(now()).await.unwrap();
        let market = registry.market_for_token(&TokenId::from("0xa-yes")).unwrap();
        assert_eq!(market.condition_id, MarketId::from("0xa"));
    }
}
