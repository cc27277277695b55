use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::order::ShareType;

/// An append-only trade row. One row per matched quantity pair at a single price;
/// the price is always the resting (maker) order's price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: i64,
    pub event_id: i64,
    pub price: i32,
    pub quantity: i32,
    pub share_type: ShareType,
    pub buyer_user_id: i64,
    pub seller_user_id: i64,
    pub buyer_order_id: Option<i64>,
    pub seller_order_id: Option<i64>,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn value(&self) -> i64 {
        self.quantity as i64 * self.price as i64
    }
}
