//! Order API Handlers
//!
//! `submit_order`/`cancel_order`/`get_order` are thin translations from HTTP
//! onto the matching engine's entry points — all validation and state
//! mutation lives in `MatchingEngine`, not here. The one exception is the
//! pre-trade balance check on submission, which this layer owns: the engine
//! only re-checks it defensively at the point of debit.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::models::{OrderResponse, Side, SubmitOrderRequest};
use crate::services::matching::{MatchingError, OrderResult};
use crate::utils::response::AppError;
use crate::AppState;

/// POST /orders
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<OrderResult>, AppError> {
    if req.side == Side::Buy {
        let required = req.price as i64 * req.total_quantity as i64;
        let available = state.engine.settlement().balances().get(req.user_id);
        if available < required {
            return Err(MatchingError::InsufficientBalance(req.user_id).into());
        }
    }

    let result = state.engine.submit_order(
        req.user_id,
        req.event_id,
        req.side,
        req.share_type,
        req.price,
        req.total_quantity,
    )?;
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct CancelOrderRequest {
    pub requester_id: i64,
}

/// DELETE /orders/:order_id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.cancel_order(order_id, req.requester_id)?;
    Ok(Json(serde_json::json!({ "order_id": order_id, "cancelled": true })))
}

/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .engine
        .get_order(order_id)
        .ok_or_else(|| AppError::not_found(&format!("order {order_id} not found")))?;
    Ok(Json(order.into()))
}
