use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these —
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "NOT_FOUND", "message": "..."}`.
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const ROLLBACK_FAILED: &str = "ROLLBACK_FAILED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type used across all modules.
///
/// Each variant maps to a stable error code (see [`error_code`]) and an
/// HTTP status code. The JSON response always includes both:
///
/// ```json
/// {"code": "NOT_FOUND", "message": "task 'abc' not found"}
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Resource does not resolve within its expected scope. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Input data is malformed or logically inconsistent. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// Actor's role is insufficient for the operation. HTTP 403.
    #[error("{0}")]
    PermissionDenied(String),

    /// Attempted write against an archived project. HTTP 403.
    #[error("{0}")]
    ReadOnly(String),

    /// Mutation quota exhausted. HTTP 429, carries the concrete
    /// retry-after so callers can inform the user precisely.
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A compensating write failed after a primary write already
    /// failed, leaving the system in a state it cannot self-heal.
    /// HTTP 500 with a distinct code so operators can alert on it.
    #[error("{0}")]
    RollbackFailed(String),

    /// Storage backend failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::PermissionDenied(_) => error_code::PERMISSION_DENIED,
            ServiceError::ReadOnly(_) => error_code::READ_ONLY,
            ServiceError::RateLimited { .. } => error_code::RATE_LIMITED,
            ServiceError::RollbackFailed(_) => error_code::ROLLBACK_FAILED,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::ReadOnly(_) => StatusCode::FORBIDDEN,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::RollbackFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });

        if let ServiceError::RateLimited { retry_after_secs } = &self {
            body["retry_after_secs"] = serde_json::json!(retry_after_secs);
            let mut resp = (status, axum::Json(body)).into_response();
            if let Ok(v) = retry_after_secs.to_string().parse() {
                resp.headers_mut().insert(RETRY_AFTER, v);
            }
            return resp;
        }

        (status, axum::Json(body)).into_response()
    }
}
