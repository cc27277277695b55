use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_side", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "share_type", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareType {
    Yes,
    No,
}

impl fmt::Display for ShareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareType::Yes => write!(f, "YES"),
            ShareType::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Incomplete,
    PartialFilled,
    CompletelyFilled,
    Cancelled,
}

impl OrderStatus {
    /// Derive the status implied by a fill/total pair: zero filled is
    /// incomplete, anything less than total is partial, otherwise filled.
    pub fn for_fill(filled: i32, total: i32) -> Self {
        if filled == 0 {
            OrderStatus::Incomplete
        } else if filled < total {
            OrderStatus::PartialFilled
        } else {
            OrderStatus::CompletelyFilled
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::CompletelyFilled | OrderStatus::Cancelled)
    }
}

/// A resting or mid-match order, as owned by the Order Store (C1).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub side: Side,
    pub share_type: ShareType,
    pub price: i32,
    pub total_quantity: i32,
    pub filled_quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> i32 {
        self.total_quantity - self.filled_quantity
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            event_id: self.event_id,
            side: self.side,
            share_type: self.share_type,
            price: self.price,
        }
    }
}

/// Canonical key naming one price-level queue: `(event_id, side, share_type, price)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub event_id: i64,
    pub side: Side,
    pub share_type: ShareType,
    pub price: i32,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.event_id, self.side, self.share_type, self.price
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrderRequest {
    pub user_id: i64,
    pub event_id: i64,
    pub side: Side,
    pub share_type: ShareType,
    pub price: i32,
    pub total_quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: i64,
    pub event_id: i64,
    pub side: Side,
    pub share_type: ShareType,
    pub price: i32,
    pub total_quantity: i32,
    pub filled_quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            event_id: order.event_id,
            side: order.side,
            share_type: order.share_type,
            price: order.price,
            total_quantity: order.total_quantity,
            filled_quantity: order.filled_quantity,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_for_fill_matches_invariant() {
        assert_eq!(OrderStatus::for_fill(0, 10), OrderStatus::Incomplete);
        assert_eq!(OrderStatus::for_fill(4, 10), OrderStatus::PartialFilled);
        assert_eq!(OrderStatus::for_fill(10, 10), OrderStatus::CompletelyFilled);
    }

    #[test]
    fn fingerprint_display_is_stable() {
        let fp = Fingerprint {
            event_id: 7,
            side: Side::Buy,
            share_type: ShareType::Yes,
            price: 6,
        };
        assert_eq!(fp.to_string(), "7:buy:YES:6");
    }
}
