//! Strategy capability set and registry.
//!
//! Every strategy implements [`Strategy`]; instances are built from the
//! declarative strategies document by the registration table in
//! [`build_strategies`]. New strategy types are added by registering a
//! builder against a type tag, not by subclassing anything.
//!
//! Strategies are pure with respect to the views passed in: no store
//! access, no mutable state across scans.

pub mod flow_fade;
pub mod longshot;
pub mod mean_reversion;
pub mod new_market;
pub mod no_bias;
pub mod whale_fade;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::config::strategy::{InstanceCommon, StrategiesConfig, StrategyDefaults};
use crate::domain::signal::OrderType;
use crate::domain::{Position, Signal};
use crate::engine::scanner::MarketView;

pub use flow_fade::FlowFade;
pub use longshot::Longshot;
pub use mean_reversion::MeanReversion;
pub use new_market::NewMarket;
pub use no_bias::NoBias;
pub use whale_fade::WhaleFade;

/// Convert a venue float into execution decimal space.
///
/// Unrepresentable values collapse to zero, which downstream sizing treats
/// as "no trade".
#[must_use]
pub fn dec(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or_default()
}

/// Capability set every strategy provides.
pub trait Strategy: Send + Sync {
    /// Stable instance identifier; keys the wallet and position ownership.
    fn name(&self) -> &str;

    /// Change-fingerprint recorded on every emitted signal.
    fn version(&self) -> &str;

    /// Whether `scan` needs views with price history populated.
    fn wants_price_history(&self) -> bool {
        false
    }

    /// Preferred order type, when the instance overrides the global default.
    fn order_type(&self) -> Option<OrderType> {
        None
    }

    /// Fast pre-filter; `scan` only sees views that pass.
    fn filter(&self, view: &MarketView) -> bool;

    /// Main producer: signals for this scan cycle.
    fn scan(&self, views: &[MarketView], now: DateTime<Utc>) -> Vec<Signal>;

    /// Per-position exit logic. Default: hold.
    fn should_exit(
        &self,
        _position: &Position,
        _view: &MarketView,
        _now: DateTime<Utc>,
    ) -> Option<Signal> {
        None
    }

    /// Optional diagnostics for operator surfaces.
    fn debug_stats(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Instance settings every strategy shares, resolved against the document's
/// defaults block.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub name: String,
    pub size_usd: Option<Decimal>,
    pub order_type: Option<OrderType>,
}

impl ResolvedInstance {
    fn resolve(common: &InstanceCommon, defaults: &StrategyDefaults) -> Self {
        Self {
            name: common.name.clone(),
            size_usd: common.size_usd.or(defaults.size_usd),
            order_type: common.order_type.or(defaults.order_type),
        }
    }
}

type BuilderFn = fn(&StrategiesConfig, &StrategyDefaults) -> Vec<Box<dyn Strategy>>;

/// Registration table: type tag -> instance builder.
static BUILDERS: &[(&str, BuilderFn)] = &[
    ("no_bias", build_no_bias),
    ("longshot", build_longshot),
    ("mean_reversion", build_mean_reversion),
    ("whale_fade", build_whale_fade),
    ("flow_fade", build_flow_fade),
    ("new_market", build_new_market),
];

fn build_no_bias(config: &StrategiesConfig, defaults: &StrategyDefaults) -> Vec<Box<dyn Strategy>> {
    config
        .no_bias
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(NoBias::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

fn build_longshot(config: &StrategiesConfig, defaults: &StrategyDefaults) -> Vec<Box<dyn Strategy>> {
    config
        .longshot
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(Longshot::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

fn build_mean_reversion(
    config: &StrategiesConfig,
    defaults: &StrategyDefaults,
) -> Vec<Box<dyn Strategy>> {
    config
        .mean_reversion
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(MeanReversion::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

fn build_whale_fade(
    config: &StrategiesConfig,
    defaults: &StrategyDefaults,
) -> Vec<Box<dyn Strategy>> {
    config
        .whale_fade
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(WhaleFade::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

fn build_flow_fade(
    config: &StrategiesConfig,
    defaults: &StrategyDefaults,
) -> Vec<Box<dyn Strategy>> {
    config
        .flow_fade
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(FlowFade::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

fn build_new_market(
    config: &StrategiesConfig,
    defaults: &StrategyDefaults,
) -> Vec<Box<dyn Strategy>> {
    config
        .new_market
        .iter()
        .filter(|p| p.common.enabled)
        .map(|p| {
            Box::new(NewMarket::new(
                p.clone(),
                ResolvedInstance::resolve(&p.common, defaults),
            )) as Box<dyn Strategy>
        })
        .collect()
}

/// Build every enabled instance from the strategies document.
#[must_use]
pub fn build_strategies(config: &StrategiesConfig) -> Vec<Box<dyn Strategy>> {
    let mut strategies = Vec::new();
    for (tag, builder) in BUILDERS {
        let built = builder(config, &config.defaults);
        if !built.is_empty() {
            info!(
                strategy_type = tag,
                instances = built.len(),
                "Strategy instances built"
            );
        }
        strategies.extend(built);
    }
    strategies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_instances_are_skipped() {
        let config = StrategiesConfig::parse_toml(
            r#"
[[longshot]]
name = "on"

[[longshot]]
name = "off"
enabled = false
"#,
        )
        .unwrap();
        let strategies = build_strategies(&config);
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].name(), "on");
    }

    #[test]
    fn defaults_flow_into_instances() {
        let config = StrategiesConfig::parse_toml(
            r#"
[defaults]
size_usd = 75.0
order_type = "limit"

[[longshot]]
name = "a"

[[longshot]]
name = "b"
order_type = "market"
"#,
        )
        .unwrap();
        let strategies = build_strategies(&config);
        assert_eq!(strategies[0].order_type(), Some(OrderType::Limit));
        assert_eq!(strategies[1].order_type(), Some(OrderType::Market));
    }

    #[test]
    fn empty_document_builds_nothing() {
        let config = StrategiesConfig::parse_toml("").unwrap();
        assert!(build_strategies(&config).is_empty());
    }

    #[test]
    fn dec_collapses_unrepresentable_to_zero() {
        assert_eq!(dec(f64::NAN), Decimal::ZERO);
        assert_eq!(dec(0.42), Decimal::from_f64(0.42).unwrap());
    }
}
