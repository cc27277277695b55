use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single integer `current_balance`, owned by the User store. Mutated only by
/// Settlement and by admin operations outside the core.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub current_balance: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub current_balance: i64,
}
