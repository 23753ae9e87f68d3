//! Mock [`TradeStream`] implementations.
//!
//! - [`ScriptedStream`] — pre-loaded connect/subscribe results and events.
//!   Best for error handling and reconnection tests.
//! - [`ChannelStream`] — channel-backed stream with an external control
//!   handle. Best for pool and subscription-manager integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::TokenId;
use crate::error::Result;
use crate::venue::traits::{StreamEvent, TradeStream};

// ---------------------------------------------------------------------------
// ScriptedStream
// ---------------------------------------------------------------------------

/// A mock stream with scripted connect/subscribe results and a fixed event
/// queue. Each call pops the next result (defaults to `Ok(())` when
/// exhausted); `next_event` returns `None` once events run out.
pub struct ScriptedStream {
    connect_results: VecDeque<Result<()>>,
    subscribe_results: VecDeque<Result<()>>,
    events: VecDeque<Option<StreamEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
}

impl ScriptedStream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_results: VecDeque::new(),
            subscribe_results: VecDeque::new(),
            events: VecDeque::new(),
            connect_count: Arc::new(AtomicU32::new(0)),
            subscribe_count: Arc::new(AtomicU32::new(0)),
        }
    }

    #[must_use]
    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    #[must_use]
    pub fn with_subscribe_results(mut self, results: Vec<Result<()>>) -> Self {
        self.subscribe_results = results.into();
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<Option<StreamEvent>>) -> Self {
        self.events = events.into();
        self
    }

    /// Shared counters for asserting connect/subscribe call counts.
    #[must_use]
    pub fn counts(&self) -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        (self.connect_count.clone(), self.subscribe_count.clone())
    }
}

impl Default for ScriptedStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStream for ScriptedStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, _token_ids: &[TokenId]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front().flatten()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// ChannelStream
// ---------------------------------------------------------------------------

/// A mock stream controlled externally via a [`ChannelStreamHandle`].
pub struct ChannelStream {
    event_rx: tokio::sync::mpsc::Receiver<Option<StreamEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
    subscribed_tokens: Arc<Mutex<Vec<TokenId>>>,
}

/// Control handle for a [`ChannelStream`].
pub struct ChannelStreamHandle {
    event_tx: tokio::sync::mpsc::Sender<Option<StreamEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
    subscribed_tokens: Arc<Mutex<Vec<TokenId>>>,
}

impl ChannelStreamHandle {
    /// Send an event to the stream.
    pub async fn send(&self, event: StreamEvent) {
        let _ = self.event_tx.send(Some(event)).await;
    }

    /// Signal end-of-stream (`next_event` returns `None`).
    pub async fn close(&self) {
        let _ = self.event_tx.send(None).await;
    }

    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// The token set from the most recent `subscribe` call.
    #[must_use]
    pub fn subscribed_tokens(&self) -> Vec<TokenId> {
        self.subscribed_tokens.lock().unwrap().clone()
    }
}

/// Create a [`ChannelStream`] and its control handle.
#[must_use]
pub fn channel_stream(buffer: usize) -> (ChannelStream, ChannelStreamHandle) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    let connects = Arc::new(AtomicU32::new(0));
    let subscribes = Arc::new(AtomicU32::new(0));
    let tokens = Arc::new(Mutex::new(Vec::new()));
    (
        ChannelStream {
            event_rx: rx,
            connect_count: connects.clone(),
            subscribe_count: subscribes.clone(),
            subscribed_tokens: tokens.clone(),
        },
        ChannelStreamHandle {
            event_tx: tx,
            connect_count: connects,
            subscribe_count: subscribes,
            subscribed_tokens: tokens,
        },
    )
}

#[async_trait]
impl TradeStream for ChannelStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        *self.subscribed_tokens.lock().unwrap() = token_ids.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<StreamEvent> {
        match self.event_rx.recv().await {
            Some(Some(event)) => Some(event),
            Some(None) | None => None,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
