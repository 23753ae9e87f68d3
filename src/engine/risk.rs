//! Portfolio risk gate and position sizing.
//!
//! Checks run in a fixed order for every signal: portfolio drawdown first,
//! then per-strategy wallet cover, then position caps, then per-(strategy,
//! market, token) deduplication. The first failing check rejects the
//! signal; rejections are recorded, never raised.
//!
//! Limits live behind a lock so a config reload takes effect at the next
//! gate evaluation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::risk::{RiskConfig, SizingConfig, SizingMethod};
use crate::domain::signal::{DecisionOutcome, RejectReason};
use crate::domain::{Signal, TradeDecision};
use crate::engine::scanner::MarketView;
use crate::engine::state::EngineState;

/// Portfolio-level gate applied to every signal.
pub struct RiskGate {
    state: Arc<EngineState>,
    limits: RwLock<RiskConfig>,
    sizing: RwLock<SizingConfig>,
}

impl RiskGate {
    #[must_use]
    pub fn new(state: Arc<EngineState>, limits: RiskConfig, sizing: SizingConfig) -> Self {
        Self {
            state,
            limits: RwLock::new(limits),
            sizing: RwLock::new(sizing),
        }
    }

    /// Swap in reloaded limits; effective at the next evaluation.
    pub fn update(&self, limits: RiskConfig, sizing: SizingConfig) {
        *self.limits.write() = limits;
        *self.sizing.write() = sizing;
    }

    #[must_use]
    pub fn limits(&self) -> RiskConfig {
        *self.limits.read()
    }

    /// Evaluate one signal, producing the paired decision record.
    #[must_use]
    pub fn evaluate(
        &self,
        signal: &Signal,
        view: Option<&MarketView>,
        now: DateTime<Utc>,
    ) -> TradeDecision {
        let outcome = self.evaluate_inner(signal, view);
        if let DecisionOutcome::Rejected { reason } = &outcome {
            debug!(
                strategy = %signal.strategy,
                market_id = %signal.market_id,
                reason = reason.as_str(),
                "Signal rejected"
            );
        }
        TradeDecision::new(signal.clone(), outcome, now)
    }

    fn evaluate_inner(&self, signal: &Signal, view: Option<&MarketView>) -> DecisionOutcome {
        let limits = *self.limits.read();

        // 1. Portfolio drawdown halts everything.
        if self.state.paper_balance().drawdown() > limits.max_drawdown_pct {
            return DecisionOutcome::Rejected {
                reason: RejectReason::DrawdownExceeded,
            };
        }

        // 2. Size the trade, then check the strategy's wallet covers it.
        let size_usd = self.compute_size(signal, view);
        if size_usd <= Decimal::ZERO {
            return DecisionOutcome::Rejected {
                reason: RejectReason::NonPositiveSize,
            };
        }
        let available = self
            .state
            .wallet(&signal.strategy)
            .map_or(Decimal::ZERO, |w| w.available);
        if size_usd > available {
            return DecisionOutcome::Rejected {
                reason: RejectReason::InsufficientStrategyBalance,
            };
        }

        // 3. Position caps.
        if self.state.open_position_count() >= limits.max_positions {
            return DecisionOutcome::Rejected {
                reason: RejectReason::MaxPositions,
            };
        }
        if self.state.total_exposure() + size_usd > limits.max_total_exposure_usd {
            return DecisionOutcome::Rejected {
                reason: RejectReason::MaxTotalExposure,
            };
        }
        if size_usd > limits.max_position_usd {
            return DecisionOutcome::Rejected {
                reason: RejectReason::MaxPositionSize,
            };
        }

        // 4. One open position per (strategy, market, token).
        if self
            .state
            .has_open(&signal.strategy, &signal.market_id, &signal.token_id)
        {
            return DecisionOutcome::Rejected {
                reason: RejectReason::DuplicatePosition,
            };
        }

        DecisionOutcome::Approved { size_usd }
    }

    /// Intended notional for a signal.
    ///
    /// A strategy's suggested size wins; otherwise the configured method
    /// applies. Kelly uses the corrected binary-contract form
    /// `f = (p*b - q) / b` with `b = 1/price - 1`, scaled by the Kelly
    /// fraction and clamped to the per-position cap.
    #[must_use]
    pub fn compute_size(&self, signal: &Signal, view: Option<&MarketView>) -> Decimal {
        if let Some(size) = signal.suggested_size {
            return size;
        }
        let sizing = *self.sizing.read();
        match sizing.method {
            SizingMethod::Fixed => sizing.fixed_amount_usd,
            SizingMethod::Kelly => {
                let price = signal.signal_price;
                if price <= Decimal::ZERO || price >= Decimal::ONE {
                    return Decimal::ZERO;
                }
                let Some(p) = Decimal::from_f64(signal.confidence) else {
                    return Decimal::ZERO;
                };
                let b = Decimal::ONE / price - Decimal::ONE;
                if b.is_zero() {
                    return Decimal::ZERO;
                }
                let q = Decimal::ONE - p;
                let f = (p * b - q) / b;
                if f <= Decimal::ZERO {
                    return Decimal::ZERO;
                }
                let size = sizing.kelly_fraction * f * sizing.kelly_base_usd;
                size.min(self.limits.read().max_position_usd)
            }
            SizingMethod::VolatilityScaled => {
                let stdev = view
                    .and_then(|v| v.price_history.as_ref())
                    .filter(|h| h.len() >= 2)
                    .map(|h| {
                        let n = h.len() as f64;
                        let mean = h.iter().sum::<f64>() / n;
                        (h.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n).sqrt()
                    });
                match stdev.and_then(Decimal::from_f64) {
                    Some(stdev) if stdev > Decimal::ZERO => {
                        let size = sizing.vol_base_usd / stdev;
                        size.clamp(sizing.vol_min_usd, sizing.vol_max_usd)
                    }
                    // No usable history: take the conservative floor.
                    _ => sizing.vol_min_usd,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fill, MarketId, OrderId, Side, TokenId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn signal_sized(strategy: &str, market: &str, size: Option<Decimal>) -> Signal {
        let mut signal = Signal::new(
            strategy,
            "v1",
            MarketId::from(market),
            TokenId::from(format!("{market}-yes")),
            Side::Buy,
            "test",
            0.05,
            0.8,
            dec!(0.40),
            now(),
        );
        signal.suggested_size = size;
        signal
    }

    fn fill(cost: Decimal) -> Fill {
        Fill {
            order_id: OrderId::generate(),
            price: dec!(0.40),
            shares: cost / dec!(0.40),
            cost,
            fees: Decimal::ZERO,
            slippage: Decimal::ZERO,
            at: now(),
        }
    }

    fn gate(limits: RiskConfig) -> (RiskGate, Arc<EngineState>) {
        let state = Arc::new(EngineState::new(dec!(5000)));
        state.ensure_wallet("s1", dec!(1000));
        let gate = RiskGate::new(state.clone(), limits, SizingConfig::default());
        (gate, state)
    }

    #[test]
    fn approves_within_all_limits() {
        let (gate, _state) = gate(RiskConfig::default());
        let decision = gate.evaluate(&signal_sized("s1", "m", Some(dec!(50))), None, now());
        assert!(decision.outcome.is_approved());
    }

    #[test]
    fn max_positions_rejects_with_ordered_reason() {
        let limits = RiskConfig {
            max_positions: 2,
            ..RiskConfig::default()
        };
        let (gate, state) = gate(limits);
        for market in ["m1", "m2"] {
            state
                .apply_fill(&signal_sized("s1", market, None), &fill(dec!(20)), true, now())
                .unwrap();
        }
        let decision = gate.evaluate(&signal_sized("s1", "m3", Some(dec!(50))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::MaxPositions
            }
        );
    }

    #[test]
    fn drawdown_precedes_every_other_rejection() {
        // Breach the drawdown limit AND set up a duplicate position; the
        // rejection must still be drawdown_exceeded.
        let (gate, state) = gate(RiskConfig::default());
        // Keep an open position on "m" so a new "m" signal is a duplicate.
        state
            .apply_fill(&signal_sized("s1", "m", None), &fill(dec!(100)), true, now())
            .unwrap();
        // Realize losses on two other markets: balance 5000 -> 4200.
        for market in ["m2", "m3"] {
            let p = state
                .apply_fill(&signal_sized("s1", market, None), &fill(dec!(400)), true, now())
                .unwrap();
            state
                .settle_position(&p.id, Decimal::ZERO, Decimal::ZERO, now())
                .unwrap();
        }
        assert!(state.paper_balance().drawdown() > dec!(0.10));

        let limits = RiskConfig {
            max_drawdown_pct: dec!(0.10),
            ..RiskConfig::default()
        };
        gate.update(limits, SizingConfig::default());

        let decision = gate.evaluate(&signal_sized("s1", "m", Some(dec!(10))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::DrawdownExceeded
            }
        );

        // With the drawdown floor relaxed, the duplicate check surfaces
        // instead: still no approval while the position is open.
        let relaxed = RiskConfig {
            max_drawdown_pct: dec!(0.50),
            ..RiskConfig::default()
        };
        gate.update(relaxed, SizingConfig::default());
        let decision = gate.evaluate(&signal_sized("s1", "m", Some(dec!(10))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::DuplicatePosition
            }
        );
    }

    #[test]
    fn insufficient_wallet_rejects() {
        let (gate, _state) = gate(RiskConfig {
            max_position_usd: dec!(5000),
            max_total_exposure_usd: dec!(10000),
            ..RiskConfig::default()
        });
        let decision = gate.evaluate(&signal_sized("s1", "m", Some(dec!(2000))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::InsufficientStrategyBalance
            }
        );
    }

    #[test]
    fn unknown_strategy_has_no_cover() {
        let (gate, _state) = gate(RiskConfig::default());
        let decision = gate.evaluate(&signal_sized("ghost", "m", Some(dec!(10))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::InsufficientStrategyBalance
            }
        );
    }

    #[test]
    fn oversize_single_position_rejects() {
        let (gate, _state) = gate(RiskConfig {
            max_position_usd: dec!(100),
            ..RiskConfig::default()
        });
        let decision = gate.evaluate(&signal_sized("s1", "m", Some(dec!(500))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::MaxPositionSize
            }
        );
    }

    #[test]
    fn exposure_cap_counts_open_cost_basis() {
        let (gate, state) = gate(RiskConfig {
            max_total_exposure_usd: dec!(100),
            ..RiskConfig::default()
        });
        state
            .apply_fill(&signal_sized("s1", "m1", None), &fill(dec!(80)), true, now())
            .unwrap();
        let decision = gate.evaluate(&signal_sized("s1", "m2", Some(dec!(50))), None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::MaxTotalExposure
            }
        );
    }

    #[test]
    fn duplicate_position_rejects_per_strategy() {
        let (gate, state) = gate(RiskConfig::default());
        state
            .apply_fill(&signal_sized("s1", "m", None), &fill(dec!(20)), true, now())
            .unwrap();

        let dup = gate.evaluate(&signal_sized("s1", "m", Some(dec!(20))), None, now());
        assert_eq!(
            dup.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::DuplicatePosition
            }
        );

        // Another strategy may take the same market.
        state.ensure_wallet("s2", dec!(1000));
        let other = gate.evaluate(&signal_sized("s2", "m", Some(dec!(20))), None, now());
        assert!(other.outcome.is_approved());
    }

    #[test]
    fn kelly_sizing_matches_formula() {
        let state = Arc::new(EngineState::new(dec!(5000)));
        state.ensure_wallet("s1", dec!(1000));
        let sizing = SizingConfig {
            method: SizingMethod::Kelly,
            kelly_fraction: dec!(0.5),
            kelly_base_usd: dec!(1000),
            ..SizingConfig::default()
        };
        let gate = RiskGate::new(state, RiskConfig::default(), sizing);

        // price 0.40, p = 0.8: b = 1.5, f = (0.8*1.5 - 0.2)/1.5 = 2/3,
        // so 0.5 * f * 1000 = 333.33, clamped to the 250 position cap.
        let signal = signal_sized("s1", "m", None);
        let size = gate.compute_size(&signal, None);
        assert_eq!(size, RiskConfig::default().max_position_usd);
    }

    #[test]
    fn kelly_negative_edge_sizes_zero() {
        let state = Arc::new(EngineState::new(dec!(5000)));
        state.ensure_wallet("s1", dec!(1000));
        let sizing = SizingConfig {
            method: SizingMethod::Kelly,
            ..SizingConfig::default()
        };
        let gate = RiskGate::new(state, RiskConfig::default(), sizing);
        let mut signal = signal_sized("s1", "m", None);
        signal.confidence = 0.2; // worse than price implies
        assert_eq!(gate.compute_size(&signal, None), Decimal::ZERO);

        let decision = gate.evaluate(&signal, None, now());
        assert_eq!(
            decision.outcome,
            DecisionOutcome::Rejected {
                reason: RejectReason::NonPositiveSize
            }
        );
    }

    #[test]
    fn suggested_size_overrides_method() {
        let (gate, _state) = gate(RiskConfig::default());
        let signal = signal_sized("s1", "m", Some(dec!(42)));
        assert_eq!(gate.compute_size(&signal, None), dec!(42));
    }
}
