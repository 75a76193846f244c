use crate::services::coordinator::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Pipeline(PipelineError::Session(e)) => {
                tracing::error!("Session error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Upload session could not be started".to_string(),
                )
            }
            AppError::Pipeline(e) => {
                tracing::error!("Pipeline error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Upload service unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::{SessionError, SessionInput, SessionState};

    #[test]
    fn test_pipeline_errors_map_to_status_codes() {
        let stopped = AppError::from(PipelineError::CoordinatorStopped).into_response();
        assert_eq!(stopped.status(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid = AppError::from(PipelineError::Session(SessionError::InvalidTransition {
            from: SessionState::Transferring,
            input: SessionInput::Submit,
        }))
        .into_response();
        assert_eq!(invalid.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = AppError::BadRequest("No file provided".to_string()).into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }
}
