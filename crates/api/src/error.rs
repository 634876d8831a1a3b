use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use netfleet_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the orchestration core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::InvalidRequest(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
                }
                CoreError::InvalidTransition { .. } => (
                    StatusCode::CONFLICT,
                    "INVALID_TRANSITION",
                    core.to_string(),
                ),
                CoreError::AlreadyTerminal { .. } => {
                    (StatusCode::CONFLICT, "ALREADY_TERMINAL", core.to_string())
                }
                CoreError::Resolution(msg) => {
                    tracing::error!(error = %msg, "Resolution error surfaced to API");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`)
///   map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let err = AppError::Core(CoreError::InvalidRequest("bad filter".into()));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_transition_maps_to_409() {
        let err = AppError::Core(CoreError::InvalidTransition {
            job_id: 1,
            from: "success",
            to: "running",
        });
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn already_terminal_maps_to_409() {
        let err = AppError::Core(CoreError::AlreadyTerminal {
            job_id: 1,
            status: "cancelled",
        });
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: 9,
        });
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }
}
