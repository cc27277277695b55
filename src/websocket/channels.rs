//! WebSocket wire messages.
//!
//! The protocol is deliberately small: a client gets a `snapshot` on
//! subscribe, `update`s as the book changes, and can ask for `ping`/`refresh`.
//! There is no channel-string parsing here — subscription is scoped to one
//! event per connection via the route's path parameter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::matching::projector::BookSnapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
    Refresh,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[allow(clippy::large_enum_variant)]
pub enum ServerMessage {
    Snapshot {
        event_id: i64,
        timestamp: DateTime<Utc>,
        data: BookSnapshot,
    },
    Update {
        event_id: i64,
        timestamp: DateTime<Utc>,
        data: BookSnapshot,
    },
    Pong,
    Closed {
        event_id: i64,
    },
}

impl ServerMessage {
    pub fn snapshot(data: BookSnapshot) -> Self {
        ServerMessage::Snapshot {
            event_id: data.event_id,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn update(data: BookSnapshot) -> Self {
        ServerMessage::Update {
            event_id: data.event_id,
            timestamp: Utc::now(),
            data,
        }
    }
}
