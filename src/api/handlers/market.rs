//! Market Data API Handlers
//!
//! Read-only views over the live book via the projector (C6). No caching
//! layer here: the projector's per-queue lock acquisition is cheap enough to
//! run per request, and it's the same path the Subscription Hub uses for
//! WebSocket updates.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::services::matching::{BookProjector, BookSnapshot};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

/// GET /events/:event_id/book
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    Query(query): Query<DepthQuery>,
) -> Json<BookSnapshot> {
    let projector = BookProjector::new(state.engine.book(), state.engine.order_store());
    let snapshot = match query.depth {
        Some(n) => projector.depth(event_id, n),
        None => projector.snapshot(event_id),
    };
    Json(snapshot)
}
