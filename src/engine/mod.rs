//! Trading engine core: scan -> strategies -> risk -> execute.
//!
//! One cycle materializes scanner views, runs every enabled strategy
//! sequentially (risk decisions for a single strategy are serialized by
//! construction), gates each signal, and settles approved fills into
//! positions and wallets. Exits run after entries using each strategy's
//! `should_exit`.

pub mod executor;
pub mod ledger;
pub mod reaper;
pub mod risk;
pub mod scanner;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::risk::{EngineConfig, ExecutionConfig, TradeMode};
use crate::domain::signal::OrderType;
use crate::domain::{MarketId, Side};
use crate::error::Result;
use crate::store::Store;
use crate::strategy::{dec, Strategy};

pub use executor::{Executor, LiveExecutor, OrderOutcome, PaperExecutor};
pub use ledger::DecisionLedger;
pub use reaper::ResolutionReaper;
pub use risk::RiskGate;
pub use scanner::{MarketView, Scanner};
pub use state::EngineState;

/// Counters from one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub views: usize,
    pub signals: usize,
    pub approved: usize,
    pub rejected: usize,
    pub filled: usize,
    pub unfilled: usize,
    pub exits: usize,
}

/// The signal-to-execution pipeline.
pub struct TradingEngine {
    scanner: Scanner,
    strategies: Arc<RwLock<Vec<Box<dyn Strategy>>>>,
    risk: Arc<RiskGate>,
    executor: Arc<dyn Executor>,
    state: Arc<EngineState>,
    ledger: DecisionLedger,
    store: Arc<dyn Store>,
    config: EngineConfig,
    execution: ExecutionConfig,
    mode: TradeMode,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        scanner: Scanner,
        strategies: Arc<RwLock<Vec<Box<dyn Strategy>>>>,
        risk: Arc<RiskGate>,
        executor: Arc<dyn Executor>,
        state: Arc<EngineState>,
        store: Arc<dyn Store>,
        config: EngineConfig,
        execution: ExecutionConfig,
        mode: TradeMode,
    ) -> Self {
        Self {
            scanner,
            strategies,
            risk,
            executor,
            state,
            ledger: DecisionLedger::new(store.clone()),
            store,
            config,
            execution,
            mode,
        }
    }

    fn is_paper(&self) -> bool {
        self.mode == TradeMode::Paper
    }

    /// One full scan cycle at `now`.
    pub async fn scan_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let with_history = self
            .strategies
            .read()
            .iter()
            .any(|s| s.wants_price_history());
        let views = self
            .scanner
            .views(now, with_history, self.config.price_history_len)
            .await?;
        let views_by_market: HashMap<MarketId, usize> = views
            .iter()
            .enumerate()
            .map(|(i, v)| (v.market_id.clone(), i))
            .collect();

        let mut summary = CycleSummary {
            views: views.len(),
            ..CycleSummary::default()
        };

        // Mark open positions against the latest views.
        for position in self.state.open_positions() {
            if let Some(&i) = views_by_market.get(&position.market_id) {
                let view = &views[i];
                let mark = if Some(&position.token_id) == view.yes_token.as_ref() {
                    view.price
                } else {
                    1.0 - view.price
                };
                self.state.mark_position(&position.id, dec(mark));
            }
        }

        // Strategies run sequentially: wallet and position state observed by
        // one strategy's scan is never mutated by a concurrent scan of the
        // same strategy.
        let strategy_count = self.strategies.read().len();
        for index in 0..strategy_count {
            let (signals, order_type, strategy_name) = {
                let strategies = self.strategies.read();
                let Some(strategy) = strategies.get(index) else {
                    break;
                };
                let filtered: Vec<MarketView> = views
                    .iter()
                    .filter(|v| strategy.filter(v))
                    .cloned()
                    .collect();
                (
                    strategy.scan(&filtered, now),
                    strategy
                        .order_type()
                        .unwrap_or(self.execution.default_order_type),
                    strategy.name().to_owned(),
                )
            };

            summary.signals += signals.len();
            for signal in signals {
                self.ledger.record_signal(&signal).await;
                let view = views_by_market
                    .get(&signal.market_id)
                    .map(|&i| &views[i]);
                let decision = self.risk.evaluate(&signal, view, now);
                self.ledger.record_decision(&decision).await;

                match &decision.outcome {
                    crate::domain::DecisionOutcome::Approved { size_usd } => {
                        summary.approved += 1;
                        self.execute(&signal, *size_usd, order_type, now, &mut summary)
                            .await;
                    }
                    crate::domain::DecisionOutcome::Rejected { .. } => {
                        summary.rejected += 1;
                    }
                }
            }

            summary.exits += self
                .run_exits(index, &strategy_name, &views, &views_by_market, now)
                .await;
        }

        self.state.persist_balances(&self.store).await?;
        if summary.signals > 0 || summary.exits > 0 {
            info!(
                views = summary.views,
                signals = summary.signals,
                approved = summary.approved,
                rejected = summary.rejected,
                filled = summary.filled,
                exits = summary.exits,
                "Scan cycle complete"
            );
        }
        Ok(summary)
    }

    async fn execute(
        &self,
        signal: &crate::domain::Signal,
        size_usd: Decimal,
        order_type: OrderType,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) {
        match self.executor.place_order(signal, size_usd, order_type).await {
            Ok(OrderOutcome::Filled(fill)) => {
                match self.state.apply_fill(signal, &fill, self.is_paper(), now) {
                    Ok(position) => {
                        summary.filled += 1;
                        self.ledger.record_fill(&signal.id, &fill, self.is_paper()).await;
                        if let Err(e) = self.store.upsert_position(&position).await {
                            warn!(position_id = %position.id, error = %e, "Position persist failed");
                        }
                    }
                    Err(e) => {
                        // Unreachable behind the gate: the wallet was checked
                        // before approval.
                        warn!(signal_id = %signal.id, error = %e, "Fill settlement failed");
                    }
                }
            }
            Ok(OrderOutcome::Unfilled { reason }) => {
                summary.unfilled += 1;
                debug!(signal_id = %signal.id, reason = %reason, "Order unfilled");
            }
            Err(e) => {
                summary.unfilled += 1;
                warn!(signal_id = %signal.id, error = %e, "Executor failure; wallet untouched");
            }
        }
    }

    /// Run one strategy's exit logic over its open positions. Exits settle
    /// at the prevailing bid (for long token positions) and bypass the
    /// entry gate: reducing risk is never blocked.
    async fn run_exits(
        &self,
        strategy_index: usize,
        strategy_name: &str,
        views: &[MarketView],
        views_by_market: &HashMap<MarketId, usize>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut exits = 0;
        for position in self.state.open_positions() {
            if position.strategy != strategy_name {
                continue;
            }
            let Some(&i) = views_by_market.get(&position.market_id) else {
                continue;
            };
            let view = &views[i];

            let exit_signal = {
                let strategies = self.strategies.read();
                let Some(strategy) = strategies.get(strategy_index) else {
                    break;
                };
                strategy.should_exit(&position, view, now)
            };
            let Some(exit_signal) = exit_signal else {
                continue;
            };

            self.ledger.record_signal(&exit_signal).await;
            let token_is_yes = Some(&position.token_id) == view.yes_token.as_ref();
            let token_price = if token_is_yes {
                view.price
            } else {
                1.0 - view.price
            };
            let exit_price = match exit_signal.side {
                Side::Sell => dec(view.best_bid.map_or(token_price, |b| {
                    if token_is_yes {
                        b
                    } else {
                        1.0 - b
                    }
                })),
                Side::Buy => dec(token_price),
            };

            match self
                .state
                .settle_position(&position.id, exit_price, Decimal::ZERO, now)
            {
                Ok((settled, pnl)) => {
                    exits += 1;
                    info!(
                        strategy = strategy_name,
                        market_id = %position.market_id,
                        exit_price = %exit_price,
                        pnl = %pnl,
                        reason = %exit_signal.reason,
                        "Position exited"
                    );
                    if let Err(e) = self.ledger.record_settlement(&settled).await {
                        warn!(position_id = %settled.id, error = %e, "Exit persist failed");
                    }
                }
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "Exit settlement failed");
                }
            }
        }
        exits
    }

    /// Periodic engine loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.scan_interval_secs.max(1),
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.scan_cycle(Utc::now()).await {
                warn!(error = %e, "Scan cycle failed");
            }
        }
        info!("Trading engine stopped");
    }
}
