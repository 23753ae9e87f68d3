//! The tiered collection pipeline: scheduler, snapshot assembler, and the
//! WebSocket subscription pool with its quote cache.

pub mod assembler;
pub mod quotes;
pub mod scheduler;
pub mod subscriptions;

pub use assembler::SnapshotAssembler;
pub use quotes::{Quote, QuoteCache};
pub use scheduler::TierScheduler;
pub use subscriptions::{
    desired_candidates, plan_assignments, PoolStats, StreamFactory, SubscriptionCandidate,
    SubscriptionManager,
};
