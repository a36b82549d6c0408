use automation_core::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConfigNotFound(_)
            | CoreError::SchemaNotFound(_)
            | CoreError::InvalidOverride(_)
            | CoreError::Validation(_) => AppError::BadRequest(err.to_string()),
            CoreError::InvalidStepTransition { .. } => AppError::Conflict(err.to_string()),
            CoreError::SchemaViolation { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(msg) => AppError::BadRequest(msg),
            OrchestratorError::NotFound(id) => AppError::NotFound(format!("Task not found: {}", id)),
            OrchestratorError::DuplicateTask(_) | OrchestratorError::InvalidTransition { .. } => {
                AppError::Conflict(err.to_string())
            }
            OrchestratorError::Core(core) => core.into(),
            OrchestratorError::ShuttingDown => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_orchestrator_errors_map_to_status() {
        assert_eq!(
            status_of(OrchestratorError::NotFound("t1".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrchestratorError::DuplicateTask("t1".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                OrchestratorError::InvalidTransition {
                    from: "completed".to_string(),
                    to: "cancelled".to_string(),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::Validation("empty".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::ShuttingDown.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_core_errors_map_to_bad_request() {
        assert_eq!(
            status_of(CoreError::ConfigNotFound("turbo".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::Core(CoreError::SchemaNotFound("x".to_string())).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
