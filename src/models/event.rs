use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::order::ShareType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Ongoing,
    Completed,
}

/// Winning side of a resolved event. `Draw` pays 5 on both share types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_result", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventResult {
    Yes,
    No,
    Draw,
}

impl EventResult {
    /// Payout per share for `share_type`: 10 on a match, 0 on a miss, 5 on a draw.
    pub fn payout_per_share(self, share_type: ShareType) -> i32 {
        match self {
            EventResult::Draw => 5,
            EventResult::Yes if share_type == ShareType::Yes => 10,
            EventResult::No if share_type == ShareType::No => 10,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub status: EventStatus,
    pub result: Option<EventResult>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payout_matches_spec_table() {
        assert_eq!(EventResult::Yes.payout_per_share(ShareType::Yes), 10);
        assert_eq!(EventResult::Yes.payout_per_share(ShareType::No), 0);
        assert_eq!(EventResult::No.payout_per_share(ShareType::Yes), 0);
        assert_eq!(EventResult::No.payout_per_share(ShareType::No), 10);
        assert_eq!(EventResult::Draw.payout_per_share(ShareType::Yes), 5);
        assert_eq!(EventResult::Draw.payout_per_share(ShareType::No), 5);
    }
}
