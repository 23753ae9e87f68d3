//! Collection pipeline configuration: venue endpoints, discovery filters,
//! ring buffer bounds, WebSocket pool shape, and reconnection behavior.

use serde::Deserialize;

use crate::domain::trade::WhaleThresholds;

/// Venue endpoint and HTTP behavior settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Market discovery (Gamma-style) REST base URL.
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// Orderbook (CLOB-style) REST base URL.
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// Real-time trade feed WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// End-to-end deadline for a single HTTP request.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Attempts per logical call (1 = no retry).
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Base backoff between attempts; doubles per attempt up to the cap.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_retry_backoff_cap_ms")]
    pub retry_backoff_cap_ms: u64,
    /// Consecutive failures before a client's breaker opens.
    #[serde(default = "default_breaker_failures")]
    pub breaker_failures: u32,
    /// How long an open breaker blocks calls before the next probe.
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".into()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".into()
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".into()
}

const fn default_http_timeout_ms() -> u64 {
    10_000
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_retry_max_attempts() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    500
}

const fn default_retry_backoff_cap_ms() -> u64 {
    15_000
}

const fn default_breaker_failures() -> u32 {
    5
}

const fn default_breaker_cooldown_ms() -> u64 {
    60_000
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            clob_url: default_clob_url(),
            ws_url: default_ws_url(),
            http_timeout_ms: default_http_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_cap_ms: default_retry_backoff_cap_ms(),
            breaker_failures: default_breaker_failures(),
            breaker_cooldown_ms: default_breaker_cooldown_ms(),
        }
    }
}

/// Self-imposed REST rate limits, held conservatively below venue caps.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_discovery_per_sec")]
    pub discovery_per_sec: f64,
    #[serde(default = "default_discovery_burst")]
    pub discovery_burst: u32,
    #[serde(default = "default_orderbook_per_sec")]
    pub orderbook_per_sec: f64,
    #[serde(default = "default_orderbook_burst")]
    pub orderbook_burst: u32,
}

const fn default_discovery_per_sec() -> f64 {
    4.0
}

const fn default_discovery_burst() -> u32 {
    8
}

const fn default_orderbook_per_sec() -> f64 {
    10.0
}

const fn default_orderbook_burst() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            discovery_per_sec: default_discovery_per_sec(),
            discovery_burst: default_discovery_burst(),
            orderbook_per_sec: default_orderbook_per_sec(),
            orderbook_burst: default_orderbook_burst(),
        }
    }
}

/// Trade ring buffer bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BufferConfig {
    /// Maximum trades retained per market.
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    /// Wall-clock TTL for buffered trades.
    #[serde(default = "default_buffer_ttl_secs")]
    pub ttl_secs: u64,
}

const fn default_buffer_capacity() -> usize {
    10_000
}

const fn default_buffer_ttl_secs() -> u64 {
    7_200
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
            ttl_secs: default_buffer_ttl_secs(),
        }
    }
}

/// WebSocket connection pool shape and health thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Parallel WebSocket connections (K).
    #[serde(default = "default_connections")]
    pub connections: usize,
    /// Token subscriptions per connection (M); pool capacity is K*M.
    #[serde(default = "default_tokens_per_connection")]
    pub tokens_per_connection: usize,
    /// Subscription refresh cadence.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Deterministic reconnect stagger step: connection `i` waits
    /// `i * stagger_step_secs` before its first reconnect attempt.
    #[serde(default = "default_stagger_step_secs")]
    pub stagger_step_secs: u64,
    /// Trade-rate floor (trades/minute); slower connections are recycled.
    #[serde(default = "default_trade_rate_floor")]
    pub trade_rate_floor_per_min: f64,
    /// Max silence before a connection is considered dead.
    #[serde(default = "default_stale_event_secs")]
    pub stale_event_secs: u64,
    /// Bounded event channel between connections and the router.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Tiers eligible for WebSocket subscriptions.
    #[serde(default = "default_ws_tiers")]
    pub ws_tiers: Vec<i32>,
}

const fn default_connections() -> usize {
    4
}

const fn default_tokens_per_connection() -> usize {
    500
}

const fn default_refresh_secs() -> u64 {
    60
}

const fn default_stagger_step_secs() -> u64 {
    2
}

const fn default_trade_rate_floor() -> f64 {
    30.0
}

const fn default_stale_event_secs() -> u64 {
    120
}

const fn default_event_buffer() -> usize {
    8_192
}

fn default_ws_tiers() -> Vec<i32> {
    vec![2, 3, 4]
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            tokens_per_connection: default_tokens_per_connection(),
            refresh_secs: default_refresh_secs(),
            stagger_step_secs: default_stagger_step_secs(),
            trade_rate_floor_per_min: default_trade_rate_floor(),
            stale_event_secs: default_stale_event_secs(),
            event_buffer: default_event_buffer(),
            ws_tiers: default_ws_tiers(),
        }
    }
}

/// WebSocket reconnection and backoff parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_circuit_cooldown_ms")]
    pub circuit_breaker_cooldown_ms: u64,
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_consecutive_failures() -> u32 {
    5
}

const fn default_circuit_cooldown_ms() -> u64 {
    60_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_consecutive_failures: default_max_consecutive_failures(),
            circuit_breaker_cooldown_ms: default_circuit_cooldown_ms(),
        }
    }
}

/// Collection pipeline settings from the `[collector]` TOML section.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Minimum 24h volume for a market to be tracked.
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold_24h: f64,
    /// Only track markets closing within this horizon.
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: f64,
    /// Discovery loop cadence.
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,
    /// Tier recomputation cadence.
    #[serde(default = "default_recompute_interval_secs")]
    pub recompute_interval_secs: u64,
    /// Stale-market sweep cadence.
    #[serde(default = "default_stale_sweep_interval_secs")]
    pub stale_sweep_interval_secs: u64,
    /// Soft deadline for one snapshot assembly; sections still pending when
    /// it expires are nulled.
    #[serde(default = "default_snapshot_deadline_ms")]
    pub snapshot_soft_deadline_ms: u64,
    /// Discovery pagination page size.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub whale: WhaleThresholds,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

const fn default_volume_threshold() -> f64 {
    1_000.0
}

const fn default_lookahead_hours() -> f64 {
    336.0
}

const fn default_discovery_interval_secs() -> u64 {
    3_600
}

const fn default_recompute_interval_secs() -> u64 {
    300
}

const fn default_stale_sweep_interval_secs() -> u64 {
    600
}

const fn default_snapshot_deadline_ms() -> u64 {
    10_000
}

const fn default_page_size() -> usize {
    100
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            volume_threshold_24h: default_volume_threshold(),
            lookahead_hours: default_lookahead_hours(),
            discovery_interval_secs: default_discovery_interval_secs(),
            recompute_interval_secs: default_recompute_interval_secs(),
            stale_sweep_interval_secs: default_stale_sweep_interval_secs(),
            snapshot_soft_deadline_ms: default_snapshot_deadline_ms(),
            page_size: default_page_size(),
            buffer: BufferConfig::default(),
            whale: WhaleThresholds::default(),
            pool: PoolConfig::default(),
            reconnect: ReconnectConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
