//! Application configuration loading and validation.
//!
//! Two documents are loaded at startup and re-read on change:
//! - `config.toml` — venue endpoints, collector shape, risk/sizing/execution
//!   limits, engine cadences, logging.
//! - `strategies.toml` — declarative strategy instances.
//!
//! A parse error at startup is fatal; on reload the change is rejected and
//! the prior document kept.

pub mod collector;
pub mod logging;
pub mod risk;
pub mod strategy;

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
pub use collector::{CollectorConfig, PoolConfig, ReconnectConfig, VenueConfig};
pub use logging::LoggingConfig;
pub use risk::{EngineConfig, ExecutionConfig, RiskConfig, SizingConfig, SizingMethod, TradeMode};
pub use strategy::StrategiesConfig;

/// Main application configuration (`config.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub mode: TradeMode,
    /// SQLite database path.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "polyflow.db".into()
}

impl Config {
    /// Load and validate from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::parse_toml(&text)
    }

    /// Parse and validate from TOML text.
    pub fn parse_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks that are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.collector.pool.connections == 0 {
            return Err(Error::Config("pool.connections must be >= 1".into()));
        }
        if self.collector.pool.tokens_per_connection == 0 {
            return Err(Error::Config(
                "pool.tokens_per_connection must be >= 1".into(),
            ));
        }
        if self.collector.lookahead_hours <= 0.0 {
            return Err(Error::Config("collector.lookahead_hours must be > 0".into()));
        }
        for tier in &self.collector.pool.ws_tiers {
            if !(0..=4).contains(tier) {
                return Err(Error::Config(format!("pool.ws_tiers contains {tier}")));
            }
        }
        if self.risk.max_drawdown_pct <= rust_decimal::Decimal::ZERO {
            return Err(Error::Config("risk.max_drawdown_pct must be > 0".into()));
        }
        if self.engine.invalid_recovery_price < rust_decimal::Decimal::ZERO
            || self.engine.invalid_recovery_price > rust_decimal::Decimal::ONE
        {
            return Err(Error::Config(
                "engine.invalid_recovery_price must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_validates_with_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.mode, TradeMode::Paper);
        assert_eq!(config.database_path, "polyflow.db");
    }

    #[test]
    fn invalid_pool_shape_is_fatal() {
        let err = Config::parse_toml("[collector.pool]\nconnections = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn out_of_range_ws_tier_is_fatal() {
        let err = Config::parse_toml("[collector.pool]\nws_tiers = [2, 9]\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn mode_parses_lowercase() {
        let config = Config::parse_toml("mode = \"live\"").unwrap();
        assert_eq!(config.mode, TradeMode::Live);
    }

    #[test]
    fn recovery_price_bounds_checked() {
        let err = Config::parse_toml("[engine]\ninvalid_recovery_price = 1.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
