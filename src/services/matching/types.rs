//! Matching Engine Types
//!
//! Shared types and errors for the matching engine, book, and settlement layers.

use serde::Serialize;

use crate::models::{Order, Trade};

/// Matching engine errors: validation and authorization errors never mutate
/// state; `SettlementFailure` is fatal and halts the affected event.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("invalid price {0}: must be in [1,10]")]
    InvalidPrice(i32),

    #[error("invalid quantity {0}: must be > 0")]
    InvalidQuantity(i32),

    #[error("event {0} is not accepting orders")]
    EventNotAccepting(i64),

    #[error("user {user_id} is not authorized to act on order {order_id}")]
    Authorization { user_id: i64, order_id: i64 },

    #[error("user {0} has insufficient balance for this order")]
    InsufficientBalance(i64),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("event {0} not found")]
    EventNotFound(i64),

    #[error("lock on {0} timed out after {1} retries")]
    LockTimeout(String, u32),

    #[error("settlement failed for event {event_id}: {reason}")]
    SettlementFailure { event_id: i64, reason: String },

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl MatchingError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MatchingError::SettlementFailure { .. } | MatchingError::Internal(_))
    }
}

/// Outcome of `submit_order`, as a tagged sum rather than a trait object — see
/// the design notes on dynamic dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome")]
pub enum OrderResult {
    FullyFilled { order_id: i64, trades: Vec<Trade> },
    PartiallyFilled {
        order_id: i64,
        trades: Vec<Trade>,
        resting_id: i64,
    },
    Resting { order_id: i64 },
}

impl OrderResult {
    pub fn order_id(&self) -> i64 {
        match self {
            OrderResult::FullyFilled { order_id, .. } => *order_id,
            OrderResult::PartiallyFilled { order_id, .. } => *order_id,
            OrderResult::Resting { order_id } => *order_id,
        }
    }

    pub fn trades(&self) -> &[Trade] {
        match self {
            OrderResult::FullyFilled { trades, .. } => trades,
            OrderResult::PartiallyFilled { trades, .. } => trades,
            OrderResult::Resting { .. } => &[],
        }
    }
}

/// Events emitted by the engine for downstream, decoupled consumers: the
/// write-behind persistence worker, the Redis fan-out worker, and the
/// Subscription Hub. Mirrors the reference codebase's `subscribe_trades`
/// broadcast pattern, generalized to the settlement bundle this domain needs.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A brand-new order was admitted into the order store and must be
    /// inserted into the relational store before anything else can
    /// reference its id (a trade row's `buyer_order_id`/`seller_order_id`,
    /// in particular).
    OrderCreated(Order),
    /// An order reached a terminal state (filled or cancelled) and must be
    /// written through to the relational store; it is no longer in C1.
    OrderTerminal(Order),
    /// A fill was settled: the trade plus the resulting (already-applied)
    /// balances and portfolio quantities for both parties, so the persistence
    /// worker can upsert durable state without re-deriving deltas.
    Settled(Box<SettlementRecord>),
    /// The book for this event changed; the Subscription Hub should recompute
    /// and fan out an update.
    BookChanged { event_id: i64 },
    /// The event finished its resolution drain; the Subscription Hub should
    /// close out its subscriber set for this event.
    EventResolved { event_id: i64 },
}

/// One atomic settlement bundle: exactly one trade, one buyer debit,
/// one seller credit, and the resulting portfolio quantities for both parties.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub trade: Trade,
    pub buyer_user_id: i64,
    pub buyer_balance_after: i64,
    pub buyer_portfolio_after: i32,
    pub seller_user_id: i64,
    pub seller_balance_after: i64,
    pub seller_portfolio_after: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_flagged() {
        assert!(MatchingError::SettlementFailure {
            event_id: 1,
            reason: "x".into()
        }
        .is_fatal());
        assert!(!MatchingError::InvalidPrice(0).is_fatal());
    }
}
