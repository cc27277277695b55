use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::order::ShareType;

/// Unique per `(user_id, event_id, share_type)`. Mutated only by Settlement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioEntry {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub share_type: ShareType,
    pub quantity: i32,
}

/// Key identifying one portfolio row without the synthetic `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortfolioKey {
    pub user_id: i64,
    pub event_id: i64,
    pub share_type: ShareType,
}
