#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn error(code: &str, message: &str) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(&self.code, &self.message);
        (self.status, Json(body)).into_response()
    }
}

impl From<crate::services::matching::MatchingError> for AppError {
    fn from(err: crate::services::matching::MatchingError) -> Self {
        use crate::services::matching::MatchingError as E;
        match err {
            E::InvalidPrice(_) | E::InvalidQuantity(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", &err.to_string())
            }
            E::EventNotAccepting(_) => {
                Self::new(StatusCode::CONFLICT, "EVENT_NOT_ACCEPTING", &err.to_string())
            }
            E::Authorization { .. } => {
                Self::new(StatusCode::FORBIDDEN, "AUTHORIZATION_ERROR", &err.to_string())
            }
            E::InsufficientBalance(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE", &err.to_string())
            }
            E::OrderNotFound(_) | E::EventNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", &err.to_string())
            }
            E::LockTimeout(..) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "LOCK_TIMEOUT", &err.to_string())
            }
            E::SettlementFailure { .. } | E::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", &err.to_string())
            }
        }
    }
}
