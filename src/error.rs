use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no eligible vehicle for order {0}")]
    NoCapacity(Uuid),

    #[error("vehicle {0} was claimed by another assignment")]
    ReservationConflict(Uuid),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid progress: {0}")]
    InvalidProgress(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same request later with a fresh
    /// fleet snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NoCapacity(_) | AppError::ReservationConflict(_)
        )
    }

    /// Reports a broken internal invariant. Panics in debug builds, logs and
    /// returns an error otherwise.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "invariant violated");
        debug_assert!(false, "invariant violated: {message}");
        AppError::InvariantViolation(message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidAction(_) | AppError::InvalidProgress(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_)
            | AppError::InvalidTransition(_)
            | AppError::ReservationConflict(_) => StatusCode::CONFLICT,
            AppError::NoCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvariantViolation(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::AppError;

    #[test]
    fn only_capacity_and_reservation_errors_are_retryable() {
        assert!(AppError::NoCapacity(Uuid::nil()).is_retryable());
        assert!(AppError::ReservationConflict(Uuid::nil()).is_retryable());
        assert!(!AppError::InvalidTransition("done".to_string()).is_retryable());
        assert!(!AppError::InvalidProgress("back".to_string()).is_retryable());
        assert!(!AppError::NotFound("mission".to_string()).is_retryable());
    }
}
