//! Order Matching Engine
//!
//! Price-time priority matching over per-fingerprint FIFO queues, with
//! settlement bundled atomically per fill.
//!
//! # Architecture
//!
//! ```text
//! API Handler
//!   ↓
//! MatchingEngine (C3)
//!   ├→ OrderStore (C1)
//!   ├→ PriceLevelBook (C2)
//!   └→ Settlement (C4) → BalanceStore / PortfolioStore
//! BookProjector (C6) reads OrderStore + PriceLevelBook for snapshots.
//! ```
//!
//! Durable writes and WebSocket fan-out are driven off `EngineEvent`
//! broadcasts consumed by the write-behind worker (`db::persistence`) and the
//! Subscription Hub (`websocket::hub`), never on the matcher's own thread.

pub mod book;
pub mod engine;
pub mod order_store;
pub mod projector;
pub mod types;

pub use book::{PriceLevelBook, QueueGuard};
pub use engine::{EngineConfig, MatchingEngine};
pub use order_store::OrderStore;
pub use projector::{BookProjector, BookSnapshot, DepthLevel, MarketSummary, SideDepth};
pub use types::*;
