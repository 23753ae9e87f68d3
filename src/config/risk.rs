//! Risk, sizing, and execution configuration.
//!
//! This is the hot-reloadable half of the engine configuration: limit
//! changes take effect at the next gate evaluation.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::signal::OrderType;

/// Whether fills are simulated or routed to the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    #[default]
    Paper,
    Live,
}

/// Portfolio-level limits enforced by the risk gate.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiskConfig {
    /// Maximum notional for a single position.
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: Decimal,
    /// Maximum combined cost basis across open positions.
    #[serde(default = "default_max_total_exposure_usd")]
    pub max_total_exposure_usd: Decimal,
    /// Maximum number of simultaneously open positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Fractional drawdown from the high-water mark that halts new entries.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
}

fn default_max_position_usd() -> Decimal {
    Decimal::from(250)
}

fn default_max_total_exposure_usd() -> Decimal {
    Decimal::from(2_000)
}

const fn default_max_positions() -> usize {
    10
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_usd: default_max_position_usd(),
            max_total_exposure_usd: default_max_total_exposure_usd(),
            max_positions: default_max_positions(),
            max_drawdown_pct: default_max_drawdown_pct(),
        }
    }
}

/// Position sizing method, configured globally; strategies may override the
/// resulting notional through their `size_usd` instance setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    #[default]
    Fixed,
    Kelly,
    VolatilityScaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SizingConfig {
    #[serde(default)]
    pub method: SizingMethod,
    /// Notional for the `fixed` method.
    #[serde(default = "default_fixed_amount_usd")]
    pub fixed_amount_usd: Decimal,
    /// Fraction of full Kelly to deploy.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    /// Capital base the Kelly fraction applies to.
    #[serde(default = "default_kelly_base_usd")]
    pub kelly_base_usd: Decimal,
    /// Base notional for the volatility-scaled method, divided by the
    /// rolling price stdev.
    #[serde(default = "default_vol_base_usd")]
    pub vol_base_usd: Decimal,
    #[serde(default = "default_vol_min_usd")]
    pub vol_min_usd: Decimal,
    #[serde(default = "default_vol_max_usd")]
    pub vol_max_usd: Decimal,
}

fn default_fixed_amount_usd() -> Decimal {
    Decimal::from(50)
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_kelly_base_usd() -> Decimal {
    Decimal::from(1_000)
}

fn default_vol_base_usd() -> Decimal {
    Decimal::from(50)
}

fn default_vol_min_usd() -> Decimal {
    Decimal::from(10)
}

fn default_vol_max_usd() -> Decimal {
    Decimal::from(200)
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::default(),
            fixed_amount_usd: default_fixed_amount_usd(),
            kelly_fraction: default_kelly_fraction(),
            kelly_base_usd: default_kelly_base_usd(),
            vol_base_usd: default_vol_base_usd(),
            vol_min_usd: default_vol_min_usd(),
            vol_max_usd: default_vol_max_usd(),
        }
    }
}

/// Executor behavior shared by paper and live back-ends.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub default_order_type: OrderType,
    /// Limit orders post at mid +/- this offset.
    #[serde(default = "default_limit_offset_bps")]
    pub limit_offset_bps: u32,
    /// Unfilled limit orders are canceled after this long.
    #[serde(default = "default_limit_timeout_secs")]
    pub limit_timeout_secs: u64,
    /// Spread orders escalate to marketable after this long.
    #[serde(default = "default_spread_timeout_secs")]
    pub spread_timeout_secs: u64,
    /// Paper slippage model: `base + coeff * (size / depth_at_best)`,
    /// clamped to `max_slippage`.
    #[serde(default = "default_base_slippage")]
    pub base_slippage: Decimal,
    #[serde(default = "default_slippage_depth_coeff")]
    pub slippage_depth_coeff: Decimal,
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
    /// Venue fee in basis points applied to fill cost.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
}

const fn default_limit_offset_bps() -> u32 {
    50
}

const fn default_limit_timeout_secs() -> u64 {
    60
}

const fn default_spread_timeout_secs() -> u64 {
    30
}

fn default_base_slippage() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_slippage_depth_coeff() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_max_slippage() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

const fn default_fee_bps() -> u32 {
    0
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_order_type: OrderType::default(),
            limit_offset_bps: default_limit_offset_bps(),
            limit_timeout_secs: default_limit_timeout_secs(),
            spread_timeout_secs: default_spread_timeout_secs(),
            base_slippage: default_base_slippage(),
            slippage_depth_coeff: default_slippage_depth_coeff(),
            max_slippage: default_max_slippage(),
            fee_bps: default_fee_bps(),
        }
    }
}

/// Engine loop cadences and capital allocation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Trading engine scan cadence.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Resolution reaper cadence.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    /// Paper balance at startup.
    #[serde(default = "default_starting_balance_usd")]
    pub starting_balance_usd: Decimal,
    /// Capital allocated to each strategy wallet.
    #[serde(default = "default_allocation_per_strategy_usd")]
    pub allocation_per_strategy_usd: Decimal,
    /// Price-history points loaded when a strategy asks for history.
    #[serde(default = "default_price_history_len")]
    pub price_history_len: usize,
    /// Settlement price for INVALID resolutions. Venues differ on reclaim
    /// value; confirm before trading live.
    #[serde(default = "default_invalid_recovery_price")]
    pub invalid_recovery_price: Decimal,
    /// Cadence for re-reading the config documents.
    #[serde(default = "default_config_reload_secs")]
    pub config_reload_secs: u64,
}

const fn default_scan_interval_secs() -> u64 {
    30
}

const fn default_reaper_interval_secs() -> u64 {
    300
}

fn default_starting_balance_usd() -> Decimal {
    Decimal::from(5_000)
}

fn default_allocation_per_strategy_usd() -> Decimal {
    Decimal::from(500)
}

const fn default_price_history_len() -> usize {
    48
}

fn default_invalid_recovery_price() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

const fn default_config_reload_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            starting_balance_usd: default_starting_balance_usd(),
            allocation_per_strategy_usd: default_allocation_per_strategy_usd(),
            price_history_len: default_price_history_len(),
            invalid_recovery_price: default_invalid_recovery_price(),
            config_reload_secs: default_config_reload_secs(),
        }
    }
}
