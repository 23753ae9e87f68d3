//! WebSocket subscription manager.
//!
//! Maintains K parallel feed connections of at most M token subscriptions
//! each. The desired set is every collectable market in a websocket-enabled
//! tier with a YES token; when it exceeds K*M capacity, markets are
//! prioritized by tier (descending) then hours-to-close (ascending) and
//! sharded round-robin across connections.
//!
//! Each connection runs as its own task wrapping a [`ReconnectingStream`]
//! whose stagger offset is `connection_id * stagger_step`, so concurrent
//! remote disconnects never produce simultaneous reconnects. Health is
//! tracked per connection (last event age, trade rate) and unhealthy
//! connections are force-reconnected on the refresh cadence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::buffer::TradeRingBuffer;
use crate::collector::quotes::QuoteCache;
use crate::config::collector::CollectorConfig;
use crate::domain::{Market, MarketId, Tier, TokenId, Trade, WhaleThresholds};
use crate::error::Result;
use crate::registry::MarketRegistry;
use crate::store::Store;
use crate::venue::stream::ReconnectingStream;
use crate::venue::traits::{StreamEvent, TradeStream};

/// Builds the base stream for connection `i`. Lets tests inject mocks and
/// production inject [`crate::venue::VenueTradeStream`].
pub type StreamFactory = Arc<dyn Fn(usize) -> Box<dyn TradeStream> + Send + Sync>;

/// One market the pool would like streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionCandidate {
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub tier: Tier,
    pub hours_to_close: f64,
}

/// Select and shard the subscription set.
///
/// Sorts by tier descending then hours-to-close ascending, truncates to
/// `connections * per_connection`, and deals tokens round-robin so no
/// connection exceeds `per_connection` ids.
#[must_use]
pub fn plan_assignments(
    mut candidates: Vec<SubscriptionCandidate>,
    connections: usize,
    per_connection: usize,
) -> Vec<Vec<TokenId>> {
    candidates.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then(a.hours_to_close.total_cmp(&b.hours_to_close))
    });
    candidates.truncate(connections * per_connection);

    let mut assignments = vec![Vec::new(); connections];
    for (i, candidate) in candidates.into_iter().enumerate() {
        assignments[i % connections].push(candidate.token_id);
    }
    assignments
}

/// Candidates for the websocket-enabled tier set at `now`.
#[must_use]
pub fn desired_candidates(
    markets: &[Market],
    ws_tiers: &[Tier],
    now: DateTime<Utc>,
) -> Vec<SubscriptionCandidate> {
    markets
        .iter()
        .filter(|m| m.is_collectable() && ws_tiers.contains(&m.tier))
        .filter_map(|m| {
            Some(SubscriptionCandidate {
                market_id: m.condition_id.clone(),
                token_id: m.yes_token_id.clone()?,
                tier: m.tier,
                hours_to_close: m.hours_to_close(now),
            })
        })
        .collect()
}

/// Pool observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub connections: usize,
    pub subscribed_tokens: usize,
    pub events_seen: u64,
    pub events_dropped: u64,
    pub forced_reconnects: u64,
}

enum ConnCommand {
    /// Replace the connection's subscription set.
    Retarget(Vec<TokenId>),
    /// Drop and re-establish the socket (health failure).
    Reconnect,
}

struct ConnectionHandle {
    id: usize,
    tokens: Vec<TokenId>,
    cmd_tx: mpsc::Sender<ConnCommand>,
    last_event_ms: Arc<AtomicU64>,
    events_seen: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    /// Events seen at the previous health check, for rate computation.
    prev_events: u64,
}

/// Shared counters updated by connection tasks and the router.
struct SharedCounters {
    events_seen: AtomicU64,
    events_dropped: AtomicU64,
    forced_reconnects: AtomicU64,
}

fn epoch_millis(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().max(0) as u64
}

/// Multi-connection trade-stream pool.
pub struct SubscriptionManager {
    registry: Arc<MarketRegistry>,
    buffer: Arc<TradeRingBuffer>,
    store: Arc<dyn Store>,
    quotes: Arc<QuoteCache>,
    config: CollectorConfig,
    whale: WhaleThresholds,
    ws_tiers: Vec<Tier>,
    factory: StreamFactory,
    connections: Mutex<Vec<ConnectionHandle>>,
    counters: Arc<SharedCounters>,
    event_tx: mpsc::Sender<StreamEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<StreamEvent>>>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(
        registry: Arc<MarketRegistry>,
        buffer: Arc<TradeRingBuffer>,
        store: Arc<dyn Store>,
        quotes: Arc<QuoteCache>,
        config: CollectorConfig,
        factory: StreamFactory,
    ) -> Self {
        let ws_tiers = config
            .pool
            .ws_tiers
            .iter()
            .filter_map(|t| Tier::from_i32(*t))
            .collect();
        let (event_tx, event_rx) = mpsc::channel(config.pool.event_buffer);
        Self {
            registry,
            buffer,
            store,
            quotes,
            whale: config.whale,
            ws_tiers,
            factory,
            config,
            connections: Mutex::new(Vec::new()),
            counters: Arc::new(SharedCounters {
                events_seen: AtomicU64::new(0),
                events_dropped: AtomicU64::new(0),
                forced_reconnects: AtomicU64::new(0),
            }),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    fn spawn_connection(&self, id: usize) -> ConnectionHandle {
        let stagger = Duration::from_secs(self.config.pool.stagger_step_secs * id as u64);
        let mut stream =
            ReconnectingStream::new((self.factory)(id), self.config.reconnect, stagger);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<ConnCommand>(8);
        let last_event_ms = Arc::new(AtomicU64::new(epoch_millis(Utc::now())));
        let events_seen = Arc::new(AtomicU64::new(0));
        let connected = Arc::new(AtomicBool::new(false));
        let event_tx = self.event_tx.clone();
        let counters = self.counters.clone();

        let last_event = last_event_ms.clone();
        let seen = events_seen.clone();
        let connected_flag = connected.clone();

        tokio::spawn(async move {
            let mut subscribed = false;
            loop {
                tokio::select! {
                    command = cmd_rx.recv() => match command {
                        Some(ConnCommand::Retarget(tokens)) => {
                            if !subscribed {
                                if let Err(e) = stream.connect().await {
                                    warn!(connection_id = id, error = %e, "Initial connect failed");
                                }
                            }
                            match stream.subscribe(&tokens).await {
                                Ok(()) => {
                                    subscribed = true;
                                    connected_flag.store(true, Ordering::Relaxed);
                                    debug!(connection_id = id, tokens = tokens.len(), "Retargeted");
                                }
                                Err(e) => {
                                    warn!(connection_id = id, error = %e, "Retarget subscribe failed");
                                }
                            }
                        }
                        Some(ConnCommand::Reconnect) => {
                            counters.forced_reconnects.fetch_add(1, Ordering::Relaxed);
                            warn!(connection_id = id, "Forcing reconnect");
                            if let Err(e) = stream.connect().await {
                                warn!(connection_id = id, error = %e, "Forced reconnect failed");
                                connected_flag.store(false, Ordering::Relaxed);
                            }
                        }
                        None => {
                            debug!(connection_id = id, "Command channel closed, terminating");
                            break;
                        }
                    },
                    event = stream.next_event(), if subscribed => match event {
                        Some(event) => {
                            last_event.store(epoch_millis(Utc::now()), Ordering::Relaxed);
                            seen.fetch_add(1, Ordering::Relaxed);
                            counters.events_seen.fetch_add(1, Ordering::Relaxed);
                            match event_tx.try_send(event) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => break,
                            }
                        }
                        None => {
                            warn!(connection_id = id, "Stream terminated");
                            connected_flag.store(false, Ordering::Relaxed);
                            break;
                        }
                    },
                }
            }
        });

        ConnectionHandle {
            id,
            tokens: Vec::new(),
            cmd_tx,
            last_event_ms,
            events_seen,
            connected,
            prev_events: 0,
        }
    }

    /// Create the K connection tasks. Called once before the refresh loop.
    pub fn start_connections(&self) {
        let mut connections = self.connections.lock();
        if !connections.is_empty() {
            return;
        }
        for id in 0..self.config.pool.connections {
            connections.push(self.spawn_connection(id));
        }
        info!(connections = connections.len(), "Subscription pool started");
    }

    /// One refresh pass: recompute the desired set, retarget connections
    /// whose assignment changed, and recycle unhealthy connections.
    pub async fn refresh_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let markets = self.registry.active_markets();
        let candidates = desired_candidates(&markets, &self.ws_tiers, now);
        let desired = candidates.len();
        let assignments = plan_assignments(
            candidates,
            self.config.pool.connections,
            self.config.pool.tokens_per_connection,
        );

        let retargets: Vec<(usize, Vec<TokenId>)> = {
            let mut connections = self.connections.lock();
            assignments
                .into_iter()
                .enumerate()
                .filter_map(|(i, tokens)| {
                    let handle = connections.get_mut(i)?;
                    if handle.tokens == tokens {
                        return None;
                    }
                    let added = tokens
                        .iter()
                        .filter(|t| !handle.tokens.contains(t))
                        .count();
                    let removed = handle
                        .tokens
                        .iter()
                        .filter(|t| !tokens.contains(t))
                        .count();
                    debug!(
                        connection_id = handle.id,
                        added,
                        removed,
                        total = tokens.len(),
                        "Subscription diff"
                    );
                    handle.tokens = tokens.clone();
                    Some((i, tokens))
                })
                .collect()
        };

        for (i, tokens) in retargets {
            let tx = {
                let connections = self.connections.lock();
                connections[i].cmd_tx.clone()
            };
            let _ = tx.send(ConnCommand::Retarget(tokens)).await;
        }

        self.check_health(now).await;
        Ok(desired)
    }

    /// Recycle connections that are silent or below the trade-rate floor.
    async fn check_health(&self, now: DateTime<Utc>) {
        let refresh_secs = self.config.pool.refresh_secs.max(1);
        let floor_per_refresh = self.config.pool.trade_rate_floor_per_min
            * (refresh_secs as f64 / 60.0);

        let to_recycle: Vec<mpsc::Sender<ConnCommand>> = {
            let mut connections = self.connections.lock();
            connections
                .iter_mut()
                .filter_map(|handle| {
                    if handle.tokens.is_empty() || !handle.connected.load(Ordering::Relaxed) {
                        handle.prev_events = handle.events_seen.load(Ordering::Relaxed);
                        return None;
                    }
                    let seen = handle.events_seen.load(Ordering::Relaxed);
                    let delta = seen.saturating_sub(handle.prev_events);
                    handle.prev_events = seen;

                    let last_ms = handle.last_event_ms.load(Ordering::Relaxed);
                    let silence_secs =
                        (epoch_millis(now).saturating_sub(last_ms)) / 1_000;

                    let stale = silence_secs > self.config.pool.stale_event_secs;
                    let slow = (delta as f64) < floor_per_refresh;
                    if stale || slow {
                        warn!(
                            connection_id = handle.id,
                            events_in_window = delta,
                            silence_secs,
                            "Connection unhealthy"
                        );
                        Some(handle.cmd_tx.clone())
                    } else {
                        None
                    }
                })
                .collect()
        };

        for tx in to_recycle {
            let _ = tx.send(ConnCommand::Reconnect).await;
        }
    }

    /// Route feed events into the ring buffer, quote cache, and store.
    /// Runs until shutdown or channel close.
    pub async fn run_router(&self, mut shutdown: watch::Receiver<bool>) {
        let mut rx = match self.event_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("Event router already running");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = rx.recv() => match event {
                    Some(event) => self.route_event(event).await,
                    None => break,
                },
            }
        }
        info!("Event router stopped");
    }

    async fn route_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Trade {
                token_id,
                price,
                size,
                side,
                at,
            } => {
                let Some(market) = self.registry.market_for_token(&token_id) else {
                    return;
                };
                let quote = self.quotes.get(&token_id).unwrap_or_default();
                let trade = Trade {
                    market_id: market.condition_id.clone(),
                    at,
                    price,
                    size,
                    side,
                    whale_tier: self.whale.classify(size),
                    best_bid: quote.best_bid,
                    best_ask: quote.best_ask,
                    mid: quote.mid(),
                };
                self.quotes.update_price(&token_id, price);
                self.registry.mark_trade(&market.condition_id, at);
                self.buffer.push(trade.clone());
                if let Err(e) = self.store.insert_trade(&trade).await {
                    warn!(error = %e, "Trade persist failed");
                }
                if trade.is_whale() {
                    if let Err(e) = self.store.insert_whale_event(&trade).await {
                        warn!(error = %e, "Whale event persist failed");
                    }
                }
            }
            StreamEvent::BookUpdate {
                token_id,
                best_bid,
                best_ask,
                ..
            } => {
                self.quotes.update_book(&token_id, best_bid, best_ask);
            }
            StreamEvent::PriceChange { token_id, price, .. } => {
                if let Some(price) = price {
                    self.quotes.update_price(&token_id, price);
                }
            }
            StreamEvent::Connected | StreamEvent::Disconnected { .. } => {}
        }
    }

    /// Periodic refresh loop.
    pub async fn run_refresh(&self, mut shutdown: watch::Receiver<bool>) {
        self.start_connections();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.pool.refresh_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.refresh_once(Utc::now()).await {
                        warn!(error = %e, "Subscription refresh failed");
                    }
                }
            }
        }
        info!("Subscription refresh loop stopped");
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let connections = self.connections.lock();
        PoolStats {
            connections: connections.len(),
            subscribed_tokens: connections.iter().map(|c| c.tokens.len()).sum(),
            events_seen: self.counters.events_seen.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            forced_reconnects: self.counters.forced_reconnects.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::domain as fixtures;

    fn candidate(id: &str, tier: Tier, hours: f64) -> SubscriptionCandidate {
        SubscriptionCandidate {
            market_id: MarketId::from(id),
            token_id: TokenId::from(format!("{id}-yes")),
            tier,
            hours_to_close: hours,
        }
    }

    #[test]
    fn all_fit_when_under_capacity() {
        let candidates = vec![
            candidate("a", Tier::T2, 8.0),
            candidate("b", Tier::T3, 2.0),
            candidate("c", Tier::T4, 0.5),
        ];
        let assignments = plan_assignments(candidates, 2, 10);
        let total: usize = assignments.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert!(assignments.iter().all(|a| a.len() <= 10));
    }

    #[test]
    fn overflow_prefers_higher_tier_then_closer_close() {
        // Capacity 2x1 = 2; four candidates.
        let candidates = vec![
            candidate("far-t2", Tier::T2, 10.0),
            candidate("near-t2", Tier::T2, 5.0),
            candidate("t3", Tier::T3, 3.0),
            candidate("t4", Tier::T4, 0.5),
        ];
        let assignments = plan_assignments(candidates, 2, 1);
        let kept: Vec<String> = assignments
            .iter()
            .flatten()
            .map(|t| t.as_str().to_owned())
            .collect();
        assert_eq!(kept, vec!["t4-yes", "t3-yes"]);
    }

    #[test]
    fn round_robin_respects_per_connection_cap() {
        let candidates: Vec<_> = (0..10)
            .map(|i| candidate(&format!("m{i}"), Tier::T3, i as f64))
            .collect();
        let assignments = plan_assignments(candidates, 4, 2);
        // Capacity 8: two connections get 2, and none exceeds the cap.
        let total: usize = assignments.iter().map(Vec::len).sum();
        assert_eq!(total, 8);
        assert!(assignments.iter().all(|a| a.len() <= 2));
    }

    #[test]
    fn tie_on_tier_breaks_by_hours_to_close() {
        let candidates = vec![
            candidate("later", Tier::T3, 3.5),
            candidate("sooner", Tier::T3, 1.2),
        ];
        let assignments = plan_assignments(candidates, 1, 1);
        assert_eq!(assignments[0][0].as_str(), "sooner-yes");
    }

    #[test]
    fn desired_set_filters_tier_and_token() {
        let now = fixtures::clock();
        let mut no_token = fixtures::market("0xnotoken", 2.0);
        no_token.yes_token_id = None;
        let markets = vec![
            fixtures::market("0xt0", 100.0), // tier 0: not ws-enabled
            fixtures::market("0xt3", 2.0),
            no_token,
        ];
        let candidates = desired_candidates(&markets, &[Tier::T2, Tier::T3, Tier::T4], now);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].market_id, MarketId::from("0xt3"));
    }

    #[test]
    fn resolved_markets_never_subscribe() {
        let now = fixtures::clock();
        let mut resolved = fixtures::market("0xdone", 2.0);
        resolved.resolved = true;
        let candidates =
            desired_candidates(&[resolved], &[Tier::T2, Tier::T3, Tier::T4], now);
        assert!(candidates.is_empty());
    }
}
