//! Application-wide error taxonomy.
//!
//! Every subsystem's leaf error type converts into `AppError` so handlers can `?`-propagate
//! uniformly; `AppError` is the only type that implements `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    #[error("operation not allowed in current state: {0}")]
    State(String),

    #[error("blocked")]
    Blocked(BlockedPayload),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedPayload {
    pub status: &'static str,
    pub can_continue: bool,
    pub context_status: serde_json::Value,
    pub user_tier: String,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let debug_enabled = std::env::var("DEBUG").map(|v| v == "true" || v == "1").unwrap_or(false);

        if let AppError::Blocked(payload) = &self {
            return (StatusCode::OK, Json(payload.clone())).into_response();
        }

        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::RateLimit { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "the model provider is rate-limiting us, please retry shortly".to_string())
            }
            AppError::State(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Blocked(_) => unreachable!(),
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "something went wrong on our end, please try again".to_string())
            }
            AppError::Http(e) => {
                tracing::error!(error = %e, "http error");
                (StatusCode::BAD_GATEWAY, "we couldn't reach an upstream service, please try again".to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "serialization error");
                (StatusCode::INTERNAL_SERVER_ERROR, "something went wrong on our end, please try again".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "something went wrong on our end, please try again".to_string())
            }
        };

        let mut body = json!({
            "status": "error",
            "error": message,
        });

        if debug_enabled {
            body["details"] = json!(format!("{self:?}"));
        }

        (status, Json(body)).into_response()
    }
}
