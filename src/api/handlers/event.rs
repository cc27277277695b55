//! Event Resolution Handler
//!
//! Event CRUD lives outside this service; the one operation owned here is the
//! resolution drain, which is why this handler reads the event row
//! directly rather than going through a dedicated events service.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{Event, EventResult, EventStatus};
use crate::utils::response::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveEventRequest {
    pub result: EventResult,
}

/// POST /events/:event_id/resolve
pub async fn resolve_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    Json(req): Json<ResolveEventRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db.pool)
        .await
        .map_err(|e| AppError::internal(&format!("failed to load event {event_id}: {e}")))?
        .ok_or_else(|| AppError::not_found(&format!("event {event_id} not found")))?;

    if event.status == EventStatus::Completed {
        return Err(AppError::bad_request(&format!("event {event_id} is already resolved")));
    }

    let records = state
        .engine
        .resolve_event(&event, req.result, state.config.operator_user_id)?;

    let resolved_at = chrono::Utc::now();
    sqlx::query("UPDATE events SET status = 'completed', result = $1, resolved_at = $2 WHERE id = $3")
        .bind(req.result)
        .bind(resolved_at)
        .bind(event_id)
        .execute(&state.db.pool)
        .await
        .map_err(|e| AppError::internal(&format!("failed to persist event resolution: {e}")))?;

    Ok(Json(serde_json::json!({
        "event_id": event_id,
        "settlements": records.len(),
    })))
}
