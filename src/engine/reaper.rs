//! Resolution reaper: closes positions on settled markets.
//!
//! Periodically re-queries the discovery API for markets that have gone
//! closed-and-resolved, assigns the terminal outcome, and closes every
//! open position at the terminal payoff. This component is the single
//! owner of the `open -> closed` transition for settled markets; without
//! it, P&L figures are meaningless.
//!
//! Ambiguity policy: if the venue does not report an unambiguous outcome,
//! the market is marked closed but unresolved and positions stay open.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{MarketId, Outcome};
use crate::engine::ledger::DecisionLedger;
use crate::engine::state::{terminal_price, EngineState};
use crate::error::Result;
use crate::registry::MarketRegistry;
use crate::store::Store;
use crate::venue::traits::MarketDiscovery;

/// Counters from one reap pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub checked: usize,
    pub resolved: usize,
    pub positions_closed: usize,
    pub ambiguous: usize,
}

/// Detects resolved markets and settles their positions.
pub struct ResolutionReaper {
    discovery: Arc<dyn MarketDiscovery>,
    registry: Arc<MarketRegistry>,
    state: Arc<EngineState>,
    store: Arc<dyn Store>,
    ledger: DecisionLedger,
    invalid_recovery_price: Decimal,
}

impl ResolutionReaper {
    #[must_use]
    pub fn new(
        discovery: Arc<dyn MarketDiscovery>,
        registry: Arc<MarketRegistry>,
        state: Arc<EngineState>,
        store: Arc<dyn Store>,
        invalid_recovery_price: Decimal,
    ) -> Self {
        Self {
            discovery,
            registry,
            state,
            store: store.clone(),
            ledger: DecisionLedger::new(store),
            invalid_recovery_price,
        }
    }

    /// Markets worth checking: everything with an open position, plus
    /// tracked markets the registry already believes are closed or expired.
    fn candidates(&self, now: DateTime<Utc>) -> BTreeSet<MarketId> {
        let mut candidates: BTreeSet<MarketId> = self
            .state
            .open_positions()
            .into_iter()
            .map(|p| p.market_id)
            .collect();
        for market in self.registry.active_markets() {
            if market.closed || market.hours_to_close(now) <= 0.0 {
                candidates.insert(market.condition_id);
            }
        }
        candidates
    }

    /// One reap pass.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReapSummary> {
        let mut summary = ReapSummary::default();

        for market_id in self.candidates(now) {
            summary.checked += 1;
            let descriptor = match self.discovery.fetch_market(&market_id).await {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => continue,
                Err(e) => {
                    warn!(market_id = %market_id, error = %e, "Resolution check failed");
                    continue;
                }
            };
            if !descriptor.closed {
                continue;
            }

            match descriptor.resolved_outcome() {
                Some(outcome) => {
                    summary.resolved += 1;
                    summary.positions_closed +=
                        self.settle_market(&market_id, outcome, now).await?;
                }
                None => {
                    summary.ambiguous += 1;
                    warn!(
                        market_id = %market_id,
                        "Market closed without unambiguous outcome; leaving positions open"
                    );
                    self.registry.mark_closed_unresolved(&market_id).await?;
                }
            }
        }

        if summary.resolved > 0 || summary.ambiguous > 0 {
            info!(
                checked = summary.checked,
                resolved = summary.resolved,
                positions_closed = summary.positions_closed,
                ambiguous = summary.ambiguous,
                "Reap pass complete"
            );
        }
        Ok(summary)
    }

    /// Resolve the market and close its open positions at terminal payoff.
    async fn settle_market(
        &self,
        market_id: &MarketId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let market = self.registry.get(market_id);
        self.registry.resolve(market_id, outcome, now).await?;

        let mut closed = 0;
        for position in self.state.open_positions() {
            if &position.market_id != market_id {
                continue;
            }
            let token_is_yes = market
                .as_ref()
                .and_then(|m| m.yes_token_id.as_ref())
                .map_or(false, |yes| yes == &position.token_id);
            let exit = terminal_price(token_is_yes, outcome, self.invalid_recovery_price);

            let (settled, pnl) =
                self.state
                    .settle_position(&position.id, exit, Decimal::ZERO, now)?;
            self.ledger.record_settlement(&settled).await?;
            closed += 1;
            info!(
                market_id = %market_id,
                strategy = %settled.strategy,
                outcome = outcome.as_str(),
                exit = %exit,
                pnl = %pnl,
                "Position settled"
            );
        }
        if closed > 0 {
            self.state.persist_balances(&self.store).await?;
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::collector::CollectorConfig;
    use crate::domain::{Side, Signal, TokenId};
    use crate::store::memory::MemoryStore;
    use crate::testkit::discovery::StaticDiscovery;
    use crate::testkit::domain as fixtures;
    use rust_decimal_macros::dec;

    struct Rig {
        reaper: ResolutionReaper,
        discovery: Arc<StaticDiscovery>,
        registry: Arc<MarketRegistry>,
        state: Arc<EngineState>,
        store: Arc<MemoryStore>,
    }

    async fn rig() -> Rig {
        let store = Arc::new(MemoryStore::new());
        let discovery = Arc::new(StaticDiscovery::new(vec![fixtures::descriptor(
            "0xa", 2.0, 20_000.0,
        )]));
        let registry = Arc::new(MarketRegistry::new(
            discovery.clone(),
            store.clone(),
            &CollectorConfig::default(),
        ));
        registry.discover_once(fixtures::clock()).await.unwrap();
        let state = Arc::new(EngineState::new(dec!(5000)));
        state.ensure_wallet("s1", dec!(500));
        let reaper = ResolutionReaper::new(
            discovery.clone(),
            registry.clone(),
            state.clone(),
            store.clone(),
            dec!(0.5),
        );
        Rig {
            reaper,
            discovery,
            registry,
            state,
            store,
        }
    }

    fn open_yes_position(state: &EngineState, price: Decimal, shares: Decimal) -> String {
        let signal = Signal::new(
            "s1",
            "v1",
            MarketId::from("0xa"),
            TokenId::from("0xa-yes"),
            Side::Buy,
            "test",
            0.05,
            0.8,
            price,
            fixtures::clock(),
        );
        let fill = crate::domain::Fill {
            order_id: crate::domain::OrderId::generate(),
            price,
            shares,
            cost: price * shares,
            fees: Decimal::ZERO,
            slippage: Decimal::ZERO,
            at: fixtures::clock(),
        };
        state
            .apply_fill(&signal, &fill, true, fixtures::clock())
            .unwrap()
            .id
    }

    fn mark_resolved(discovery: &StaticDiscovery, yes: f64, no: f64) {
        discovery.update_market("0xa", |d| {
            d.closed = true;
            d.active = false;
            d.outcome_prices = Some((yes, no));
        });
    }

    #[tokio::test]
    async fn yes_resolution_pays_out_and_counts_win() {
        let rig = rig().await;
        open_yes_position(&rig.state, dec!(0.40), dec!(100));
        mark_resolved(&rig.discovery, 1.0, 0.0);

        let summary = rig.reaper.run_once(fixtures::clock()).await.unwrap();
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.positions_closed, 1);

        let wallet = rig.state.wallet("s1").unwrap();
        assert_eq!(wallet.realized_pnl, dec!(60.00));
        assert_eq!(wallet.wins, 1);
        assert_eq!(rig.state.open_position_count(), 0);

        let market = rig.registry.get(&MarketId::from("0xa")).unwrap();
        assert!(market.resolved);
        assert_eq!(market.outcome, Some(Outcome::Yes));
        // Closed position persisted.
        assert_eq!(rig.store.positions().len(), 1);
        assert!(!rig.store.positions()[0].is_open());
    }

    #[tokio::test]
    async fn no_resolution_loses_cost_basis() {
        let rig = rig().await;
        open_yes_position(&rig.state, dec!(0.40), dec!(100));
        mark_resolved(&rig.discovery, 0.0, 1.0);

        rig.reaper.run_once(fixtures::clock()).await.unwrap();
        let wallet = rig.state.wallet("s1").unwrap();
        assert_eq!(wallet.realized_pnl, dec!(-40.00));
        assert_eq!(wallet.losses, 1);
    }

    #[tokio::test]
    async fn invalid_resolution_settles_at_recovery_price() {
        let rig = rig().await;
        open_yes_position(&rig.state, dec!(0.40), dec!(100));
        rig.discovery.update_market("0xa", |d| {
            d.closed = true;
            d.outcome_prices = Some((0.5, 0.5));
            d.resolution_status = Some("invalid".into());
        });

        rig.reaper.run_once(fixtures::clock()).await.unwrap();
        let wallet = rig.state.wallet("s1").unwrap();
        // 100 * 0.5 - 40 = +10
        assert_eq!(wallet.realized_pnl, dec!(10.00));
    }

    #[tokio::test]
    async fn ambiguous_outcome_leaves_positions_open() {
        let rig = rig().await;
        open_yes_position(&rig.state, dec!(0.40), dec!(100));
        mark_resolved(&rig.discovery, 0.6, 0.4); // not terminal

        let summary = rig.reaper.run_once(fixtures::clock()).await.unwrap();
        assert_eq!(summary.ambiguous, 1);
        assert_eq!(summary.positions_closed, 0);
        assert_eq!(rig.state.open_position_count(), 1);

        let market = rig.registry.get(&MarketId::from("0xa")).unwrap();
        assert!(market.closed);
        assert!(!market.resolved);
    }

    #[tokio::test]
    async fn open_markets_are_untouched() {
        let rig = rig().await;
        open_yes_position(&rig.state, dec!(0.40), dec!(100));

        let summary = rig.reaper.run_once(fixtures::clock()).await.unwrap();
        assert_eq!(summary.resolved, 0);
        assert_eq!(rig.state.open_position_count(), 1);
    }
}
