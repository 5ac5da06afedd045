//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Postgres SQLSTATE for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key or portal token is missing, invalid, or inactive.
    #[error("Invalid credentials")]
    Unauthorized,

    /// Authenticated, but not allowed to perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// Requested resource does not exist or belongs to another workspace.
    ///
    /// The payload names the resource kind, e.g. `"ticket"`.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The request conflicts with current state (duplicate, closed ticket, ...).
    #[error("{0}")]
    Conflict(String),

    /// Well-formed request that cannot be processed.
    #[error("{0}")]
    Unprocessable(String),

    /// An upstream service (AI provider) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable",
                msg.clone(),
            ),
            AppError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "The AI provider request failed".to_string(),
            ),
            AppError::Database(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                (
                    StatusCode::CONFLICT,
                    "conflict",
                    "A record with the same unique value already exists".to_string(),
                )
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "ticket not found"
///   }
/// }
/// ```
///
/// Database and upstream details are logged, never returned to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        (status, serde_json::from_slice(&bytes).expect("body is json"))
    }

    #[tokio::test]
    async fn not_found_names_the_resource() {
        let (status, body) = body_json(AppError::NotFound("ticket")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
        assert_eq!(body["error"]["message"], "ticket not found");
    }

    #[tokio::test]
    async fn invalid_request_carries_its_message() {
        let (status, body) =
            body_json(AppError::InvalidRequest("subject must not be empty".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "subject must not be empty");
    }

    #[tokio::test]
    async fn database_errors_are_hidden() {
        let (status, body) = body_json(AppError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn upstream_errors_map_to_bad_gateway() {
        let (status, body) = body_json(AppError::Upstream("timeout".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "upstream_error");
    }

    #[test]
    fn status_codes_for_client_errors() {
        assert_eq!(AppError::Unauthorized.parts().0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden("admin only".into()).parts().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Conflict("closed".into()).parts().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unprocessable("no match".into()).parts().0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
