//! Polyflow - tiered prediction-market collection and automated trading.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/       # Pure domain types (markets, trades, snapshots, positions)
//! ├── config/       # TOML configuration documents
//! ├── venue/        # REST + WebSocket venue adapters
//! ├── buffer/       # Per-market trade ring buffer
//! ├── store/        # Diesel SQLite persistence
//! ├── registry/     # Authoritative tracked-market set and tiering
//! ├── collector/    # Tier scheduler, snapshot assembler, WS pool
//! ├── strategy/     # Pluggable signal producers
//! ├── engine/       # Scanner, risk gate, executors, resolution reaper
//! ├── app/          # Application container and loops
//! └── cli/          # Command-line boundary
//! ```

pub mod app;
pub mod buffer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod registry;
pub mod store;
pub mod strategy;
pub mod venue;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
