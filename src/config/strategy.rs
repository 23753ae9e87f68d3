//! Declarative strategy configuration.
//!
//! `strategies.toml` groups instances by strategy type; each list entry is
//! one instance with its own name and type-specific parameters. A change to
//! this document takes effect on the next scan cycle.
//!
//! ```toml
//! [defaults]
//! size_usd = 50.0
//! order_type = "market"
//!
//! [[longshot]]
//! name = "longshot-shortdated"
//! min_probability = 0.92
//! max_hours_to_close = 24.0
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::signal::OrderType;
use crate::error::{Error, Result};

/// Settings applied to every instance unless overridden.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StrategyDefaults {
    pub size_usd: Option<Decimal>,
    pub order_type: Option<OrderType>,
}

/// Fields shared by every strategy instance.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceCommon {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-instance notional override.
    pub size_usd: Option<Decimal>,
    pub order_type: Option<OrderType>,
}

const fn default_enabled() -> bool {
    true
}

/// Buys NO on categories with an empirically high NO base rate.
#[derive(Debug, Clone, Deserialize)]
pub struct NoBiasParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Category tags this instance applies to.
    pub categories: Vec<String>,
    /// Observed NO-resolution base rate for those categories.
    #[serde(default = "default_no_base_rate")]
    pub no_base_rate: f64,
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
    #[serde(default = "default_nb_min_hours")]
    pub min_hours_to_close: f64,
    #[serde(default = "default_nb_max_hours")]
    pub max_hours_to_close: f64,
    /// Skip when the NO side already costs more than this.
    #[serde(default = "default_max_no_price")]
    pub max_no_price: f64,
}

const fn default_no_base_rate() -> f64 {
    0.70
}

const fn default_min_liquidity() -> f64 {
    1_000.0
}

const fn default_nb_min_hours() -> f64 {
    6.0
}

const fn default_nb_max_hours() -> f64 {
    336.0
}

const fn default_max_no_price() -> f64 {
    0.65
}

/// Buys the favored side when its implied probability is extreme.
#[derive(Debug, Clone, Deserialize)]
pub struct LongshotParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Favored-side implied probability threshold.
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,
    #[serde(default = "default_ls_max_hours")]
    pub max_hours_to_close: f64,
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
}

const fn default_min_probability() -> f64 {
    0.92
}

const fn default_ls_max_hours() -> f64 {
    48.0
}

/// Signals when price deviates from its rolling mean by K standard
/// deviations. Requires price history.
#[derive(Debug, Clone, Deserialize)]
pub struct MeanReversionParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Rolling window length in snapshots.
    #[serde(default = "default_mr_window")]
    pub window: usize,
    /// Deviation threshold in standard deviations.
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
    /// Minimum history points before the instance will signal.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
}

const fn default_mr_window() -> usize {
    24
}

const fn default_zscore_threshold() -> f64 {
    2.0
}

const fn default_min_history() -> usize {
    12
}

/// Fades the direction of the most recent whale trade.
#[derive(Debug, Clone, Deserialize)]
pub struct WhaleFadeParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Ignore whales older than this.
    #[serde(default = "default_max_whale_age_secs")]
    pub max_whale_age_secs: i64,
    /// Minimum 1h whale volume to act on.
    #[serde(default = "default_min_whale_volume")]
    pub min_whale_volume: f64,
}

const fn default_max_whale_age_secs() -> i64 {
    900
}

const fn default_min_whale_volume() -> f64 {
    5_000.0
}

/// Fades extreme short-window buy/sell imbalance or volume spikes.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowFadeParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Buy (or sell) share of 1h volume treated as extreme.
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,
    /// Minimum trades in the window before imbalance is meaningful.
    #[serde(default = "default_min_trades")]
    pub min_trades: u64,
}

const fn default_imbalance_threshold() -> f64 {
    0.80
}

const fn default_min_trades() -> u64 {
    20
}

/// Buys NO on freshly-discovered long-dated markets on a statistical prior.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMarketParams {
    #[serde(flatten)]
    pub common: InstanceCommon,
    /// Only markets first seen within this many hours.
    #[serde(default = "default_max_tracked_hours")]
    pub max_tracked_hours: f64,
    #[serde(default = "default_nm_min_hours")]
    pub min_hours_to_close: f64,
    /// Prior probability of NO resolution for untraded new markets.
    #[serde(default = "default_no_prior")]
    pub no_prior: f64,
}

const fn default_max_tracked_hours() -> f64 {
    24.0
}

const fn default_nm_min_hours() -> f64 {
    168.0
}

const fn default_no_prior() -> f64 {
    0.60
}

/// The full strategies document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategiesConfig {
    #[serde(default)]
    pub defaults: StrategyDefaults,
    #[serde(default)]
    pub no_bias: Vec<NoBiasParams>,
    #[serde(default)]
    pub longshot: Vec<LongshotParams>,
    #[serde(default)]
    pub mean_reversion: Vec<MeanReversionParams>,
    #[serde(default)]
    pub whale_fade: Vec<WhaleFadeParams>,
    #[serde(default)]
    pub flow_fade: Vec<FlowFadeParams>,
    #[serde(default)]
    pub new_market: Vec<NewMarketParams>,
}

impl StrategiesConfig {
    /// Parse the strategies document from TOML text.
    pub fn parse_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("strategies: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a file path.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_toml(&text)
    }

    /// Instance names must be unique across all types; they key wallets and
    /// position ownership.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for name in self.instance_names() {
            if !seen.insert(name.clone()) {
                return Err(Error::Config(format!("duplicate strategy name: {name}")));
            }
        }
        Ok(())
    }

    /// Names of every configured instance, enabled or not.
    #[must_use]
    pub fn instance_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        names.extend(self.no_bias.iter().map(|p| p.common.name.clone()));
        names.extend(self.longshot.iter().map(|p| p.common.name.clone()));
        names.extend(self.mean_reversion.iter().map(|p| p.common.name.clone()));
        names.extend(self.whale_fade.iter().map(|p| p.common.name.clone()));
        names.extend(self.flow_fade.iter().map(|p| p.common.name.clone()));
        names.extend(self.new_market.iter().map(|p| p.common.name.clone()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
size_usd = 50.0
order_type = "market"

[[longshot]]
name = "longshot-shortdated"
min_probability = 0.95

[[no_bias]]
name = "nobias-politics"
categories = ["politics"]
no_base_rate = 0.72
size_usd = 25.0

[[mean_reversion]]
name = "meanrev-default"
enabled = false
"#;

    #[test]
    fn parses_typed_instance_lists() {
        let config = StrategiesConfig::parse_toml(SAMPLE).unwrap();
        assert_eq!(config.longshot.len(), 1);
        assert_eq!(config.no_bias.len(), 1);
        assert!((config.longshot[0].min_probability - 0.95).abs() < f64::EPSILON);
        assert!(!config.mean_reversion[0].common.enabled);
        assert_eq!(config.defaults.order_type, Some(OrderType::Market));
    }

    #[test]
    fn instance_defaults_fill_in() {
        let config = StrategiesConfig::parse_toml(SAMPLE).unwrap();
        let nb = &config.no_bias[0];
        assert!(nb.common.enabled);
        assert!((nb.max_no_price - 0.65).abs() < f64::EPSILON);
        assert_eq!(nb.common.size_usd, Some(rust_decimal_macros::dec!(25.0)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let text = r#"
[[longshot]]
name = "dup"

[[no_bias]]
name = "dup"
categories = ["x"]
"#;
        assert!(StrategiesConfig::parse_toml(text).is_err());
    }

    #[test]
    fn empty_document_is_valid() {
        let config = StrategiesConfig::parse_toml("").unwrap();
        assert!(config.instance_names().is_empty());
    }
}
