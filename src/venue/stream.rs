//! Real-time trade feed over WebSocket.
//!
//! [`VenueTradeStream`] speaks the venue's market channel: one subscription
//! message per connection carrying the asset id list, inbound events tagged
//! by `event_type`. [`ReconnectingStream`] wraps any [`TradeStream`] with
//! jittered exponential backoff, a circuit breaker, resubscription after
//! reconnect, and a deterministic initial offset so pooled connections never
//! reconnect in the same second.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::collector::ReconnectConfig;
use crate::domain::{Side, TokenId};
use crate::error::{Error, Result};
use crate::venue::dto::{
    parse_epoch_millis, SubscribeMessage, WsBookMessage, WsEventMessage, WsPriceChangeMessage,
    WsTradeMessage,
};
use crate::venue::traits::{StreamEvent, TradeStream};

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for one venue market-channel connection.
pub struct VenueTradeStream {
    url: String,
    ws: Option<WsConnection>,
    /// Events decoded from the last frame but not yet consumed; a single
    /// frame may carry several events.
    pending: VecDeque<StreamEvent>,
    malformed: Arc<AtomicU64>,
}

impl VenueTradeStream {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ws: None,
            pending: VecDeque::new(),
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared malformed-message counter for pool observability.
    #[must_use]
    pub fn malformed_counter(&self) -> Arc<AtomicU64> {
        self.malformed.clone()
    }

    fn decode_frame(&self, text: &str) -> Vec<StreamEvent> {
        // Frames carry either a single event object or an array of them.
        let messages: Vec<WsEventMessage> =
            match serde_json::from_str::<Vec<WsEventMessage>>(text) {
                Ok(batch) => batch,
                Err(_) => match serde_json::from_str::<WsEventMessage>(text) {
                    Ok(single) => vec![single],
                    Err(e) => {
                        self.malformed.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, bytes = text.len(), "Dropping malformed feed message");
                        return Vec::new();
                    }
                },
            };
        messages.into_iter().filter_map(to_stream_event).collect()
    }
}

fn to_stream_event(msg: WsEventMessage) -> Option<StreamEvent> {
    match msg {
        WsEventMessage::LastTradePrice(WsTradeMessage {
            asset_id,
            price,
            size,
            side,
            timestamp,
        }) => Some(StreamEvent::Trade {
            token_id: TokenId::from(asset_id),
            price: price?,
            size: size.unwrap_or(0.0),
            side: side.as_deref().and_then(Side::parse).unwrap_or(Side::Buy),
            at: parse_epoch_millis(timestamp.as_deref()).unwrap_or_else(Utc::now),
        }),
        WsEventMessage::Book(WsBookMessage {
            asset_id,
            bids,
            asks,
            timestamp,
        }) => {
            let best = |levels: &[crate::venue::dto::RawLevel], pick_max: bool| {
                let parsed = levels.iter().filter_map(|l| l.price.parse::<f64>().ok());
                if pick_max {
                    parsed.fold(None, |acc: Option<f64>, p| {
                        Some(acc.map_or(p, |a| a.max(p)))
                    })
                } else {
                    parsed.fold(None, |acc: Option<f64>, p| {
                        Some(acc.map_or(p, |a| a.min(p)))
                    })
                }
            };
            Some(StreamEvent::BookUpdate {
                token_id: TokenId::from(asset_id),
                best_bid: best(&bids, true),
                best_ask: best(&asks, false),
                at: parse_epoch_millis(timestamp.as_deref()).unwrap_or_else(Utc::now),
            })
        }
        WsEventMessage::PriceChange(WsPriceChangeMessage {
            asset_id,
            price,
            timestamp,
        }) => Some(StreamEvent::PriceChange {
            token_id: TokenId::from(asset_id),
            price,
            at: parse_epoch_millis(timestamp.as_deref()).unwrap_or_else(Utc::now),
        }),
    }
}

#[async_trait]
impl TradeStream for VenueTradeStream {
    async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting trade feed");
        let (ws, response) = connect_async(&self.url).await?;
        info!(status = %response.status(), "Trade feed connected");
        self.ws = Some(ws);
        self.pending.clear();
        Ok(())
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| Error::Connection("subscribe before connect".into()))?;

        let assets: Vec<String> = token_ids.iter().map(|t| t.as_str().to_owned()).collect();
        let total = assets.len();
        let json = serde_json::to_string(&SubscribeMessage::market(assets))?;
        if total <= 5 {
            info!(tokens = total, "Subscribing to assets");
        } else {
            info!(tokens = total, "Subscribing to assets (list truncated)");
        }
        ws.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let ws = self.ws.as_mut()?;
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(bytes = text.len(), "Feed frame");
                    let events = self.decode_frame(&text);
                    self.pending.extend(events);
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws.send(Message::Pong(data)).await {
                        error!(error = %e, "Pong send failed");
                        self.ws = None;
                        return Some(StreamEvent::Disconnected {
                            reason: e.to_string(),
                        });
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Feed closed by server");
                    self.ws = None;
                    return Some(StreamEvent::Disconnected {
                        reason: "server close".into(),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "Feed error");
                    self.ws = None;
                    return Some(StreamEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
                None => {
                    self.ws = None;
                    return Some(StreamEvent::Disconnected {
                        reason: "stream ended".into(),
                    });
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "polymarket-ws"
    }

    fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Reconnecting wrapper
// ---------------------------------------------------------------------------

/// Circuit breaker state for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    /// Too many consecutive failures; reconnects blocked until the instant.
    Open { until: Instant },
}

/// Wrapper adding automatic reconnection to any [`TradeStream`].
///
/// On disconnect it waits the connection's deterministic stagger offset,
/// then backs off exponentially (with jitter), reconnects, and resubscribes
/// to the tracked token set. A circuit breaker trips after too many
/// consecutive failures.
pub struct ReconnectingStream<S: TradeStream> {
    inner: S,
    config: ReconnectConfig,
    /// Deterministic delay applied before the first reconnect attempt of
    /// each disconnect episode. Pooled connections use `id * stagger_step`.
    stagger_offset: Duration,
    subscribed_tokens: Vec<TokenId>,
    consecutive_failures: u32,
    current_delay_ms: u64,
    circuit_state: CircuitState,
    connected: bool,
    /// True from disconnect until the first reconnect attempt; gates the
    /// stagger offset so it applies once per episode.
    episode_start: bool,
}

impl<S: TradeStream> ReconnectingStream<S> {
    #[must_use]
    pub fn new(inner: S, config: ReconnectConfig, stagger_offset: Duration) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            inner,
            config,
            stagger_offset,
            subscribed_tokens: Vec::new(),
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            circuit_state: CircuitState::Closed,
            connected: false,
            episode_start: true,
        }
    }

    fn reset_backoff(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
        self.circuit_state = CircuitState::Closed;
    }

    /// Current delay with up to 20% jitter; advances the delay for the next
    /// attempt.
    fn next_delay(&mut self) -> Duration {
        let base = Duration::from_millis(self.current_delay_ms);
        let delay = base + Duration::from_millis(jitter_ms(base));
        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);
        delay
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.connected = false;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            let cooldown = Duration::from_millis(self.config.circuit_breaker_cooldown_ms);
            self.circuit_state = CircuitState::Open {
                until: Instant::now() + cooldown,
            };
            error!(
                failures = self.consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Reconnect circuit tripped, pausing attempts"
            );
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        if let CircuitState::Open { until } = self.circuit_state {
            let remaining = until.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                warn!(
                    remaining_secs = remaining.as_secs(),
                    "Reconnect circuit open, waiting"
                );
                sleep(remaining).await;
            }
            self.circuit_state = CircuitState::Closed;
            self.reset_backoff();
        }

        if self.episode_start {
            self.episode_start = false;
            if !self.stagger_offset.is_zero() {
                debug!(
                    offset_ms = self.stagger_offset.as_millis() as u64,
                    "Applying reconnect stagger offset"
                );
                sleep(self.stagger_offset).await;
            }
        }

        let delay = self.next_delay();
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.consecutive_failures + 1,
            "Reconnecting after delay"
        );
        sleep(delay).await;

        match self.inner.connect().await {
            Ok(()) => {
                self.connected = true;
                if !self.subscribed_tokens.is_empty() {
                    debug!(tokens = self.subscribed_tokens.len(), "Resubscribing");
                    if let Err(err) = self.inner.subscribe(&self.subscribed_tokens).await {
                        error!(error = %err, "Resubscribe failed after reconnect");
                        self.record_failure();
                        return Err(err);
                    }
                }
                self.reset_backoff();
                info!("Reconnected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Reconnection failed");
                self.record_failure();
                Err(e)
            }
        }
    }
}

/// Up to 20% jitter derived from the clock's sub-second nanos, preventing
/// synchronized reconnect storms without pulling in a RNG here.
fn jitter_ms(base: Duration) -> u64 {
    let range = (base.as_millis() as u64) / 5;
    if range == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (range + 1)
}

#[async_trait]
impl<S: TradeStream + Send> TradeStream for ReconnectingStream<S> {
    async fn connect(&mut self) -> Result<()> {
        let result = self.inner.connect().await;
        if result.is_ok() {
            self.connected = true;
            self.reset_backoff();
        }
        result
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        self.subscribed_tokens = token_ids.to_vec();
        self.inner.subscribe(token_ids).await
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if !self.connected {
                if let Err(e) = self.reconnect().await {
                    warn!(error = %e, "Reconnect attempt failed, retrying");
                    continue;
                }
            }

            match self.inner.next_event().await {
                Some(StreamEvent::Disconnected { reason }) => {
                    warn!(reason = %reason, "Feed lost, will reconnect");
                    self.connected = false;
                    self.episode_start = true;
                    self.record_failure();
                }
                Some(event) => {
                    if self.consecutive_failures > 0 {
                        self.reset_backoff();
                    }
                    return Some(event);
                }
                None => {
                    warn!("Feed ended unexpectedly, will reconnect");
                    self.connected = false;
                    self.episode_start = true;
                    self.record_failure();
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn malformed_count(&self) -> u64 {
        self.inner.malformed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use crate::testkit::stream::ScriptedStream;

    fn fast_config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 3,
            circuit_breaker_cooldown_ms: 10,
        }
    }

    fn backoff_config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_consecutive_failures: 3,
            circuit_breaker_cooldown_ms: 50,
        }
    }

    #[tokio::test]
    async fn passes_events_through_when_connected() {
        let mock =
            ScriptedStream::new().with_events(vec![Some(testkit::domain::trade_event("t1"))]);
        let mut stream = ReconnectingStream::new(mock, backoff_config(), Duration::ZERO);
        stream.connect().await.unwrap();
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Trade { .. })
        ));
    }

    #[tokio::test]
    async fn reconnects_and_resubscribes_after_disconnect() {
        let mock = ScriptedStream::new().with_events(vec![
            Some(StreamEvent::Disconnected {
                reason: "test".into(),
            }),
            Some(testkit::domain::trade_event("t1")),
        ]);
        let (connect_count, subscribe_count) = mock.counts();

        let mut stream = ReconnectingStream::new(mock, fast_config(), Duration::ZERO);
        stream.connect().await.unwrap();
        stream.subscribe(&[TokenId::from("t1")]).await.unwrap();

        let event = stream.next_event().await;
        assert!(matches!(event, Some(StreamEvent::Trade { .. })));
        assert!(connect_count.load(Ordering::SeqCst) >= 2);
        assert!(subscribe_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn backoff_grows_and_caps() {
        let mut stream =
            ReconnectingStream::new(ScriptedStream::new(), backoff_config(), Duration::ZERO);
        let in_range = |d: Duration, base: u64| {
            let ms = d.as_millis() as u64;
            (base..=base + base / 5).contains(&ms)
        };
        assert!(in_range(stream.next_delay(), 10));
        assert!(in_range(stream.next_delay(), 20));
        assert!(in_range(stream.next_delay(), 40));
        assert!(in_range(stream.next_delay(), 80));
        assert!(in_range(stream.next_delay(), 100));
    }

    #[tokio::test]
    async fn circuit_trips_after_max_failures() {
        let mut stream =
            ReconnectingStream::new(ScriptedStream::new(), backoff_config(), Duration::ZERO);
        for _ in 0..3 {
            stream.record_failure();
        }
        assert!(matches!(stream.circuit_state, CircuitState::Open { .. }));
    }

    #[tokio::test]
    async fn stagger_offset_applies_once_per_episode() {
        // Disconnect, then an event. With a 50ms offset the event cannot
        // arrive before the offset has elapsed.
        let mock = ScriptedStream::new().with_events(vec![
            Some(StreamEvent::Disconnected {
                reason: "remote".into(),
            }),
            Some(testkit::domain::trade_event("t1")),
        ]);
        let mut stream =
            ReconnectingStream::new(mock, fast_config(), Duration::from_millis(50));
        stream.connect().await.unwrap();

        let start = Instant::now();
        let event = stream.next_event().await;
        assert!(matches!(event, Some(StreamEvent::Trade { .. })));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn jitter_bounded_to_a_fifth() {
        for _ in 0..20 {
            assert!(jitter_ms(Duration::from_millis(100)) <= 20);
        }
        assert_eq!(jitter_ms(Duration::ZERO), 0);
    }
}
