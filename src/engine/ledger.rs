//! Append-only decision ledger.
//!
//! Every signal, every gate decision, every fill, and every settlement
//! flows through here into the store. Nothing is ever updated in place;
//! the ledger is the audit trail that makes P&L figures defensible.

use std::sync::Arc;

use tracing::warn;

use crate::domain::{Fill, Position, Signal, TradeDecision};
use crate::error::Result;
use crate::store::Store;

/// Writer for the audit trail tables.
pub struct DecisionLedger {
    store: Arc<dyn Store>,
}

impl DecisionLedger {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record an emitted signal. Failures are logged, not raised; losing an
    /// audit row must never stall the engine.
    pub async fn record_signal(&self, signal: &Signal) {
        if let Err(e) = self.store.insert_signal(signal).await {
            warn!(signal_id = %signal.id, error = %e, "Signal ledger write failed");
        }
    }

    /// Record the risk gate's verdict for a signal.
    pub async fn record_decision(&self, decision: &TradeDecision) {
        if let Err(e) = self.store.insert_decision(decision).await {
            warn!(decision_id = %decision.id, error = %e, "Decision ledger write failed");
        }
    }

    /// Record an execution fill.
    pub async fn record_fill(&self, signal_id: &str, fill: &Fill, paper: bool) {
        if let Err(e) = self.store.insert_executor_trade(signal_id, fill, paper).await {
            warn!(signal_id, error = %e, "Fill ledger write failed");
        }
    }

    /// Record a settlement by persisting the closed position row.
    pub async fn record_settlement(&self, position: &Position) -> Result<()> {
        self.store.upsert_position(position).await
    }
}
