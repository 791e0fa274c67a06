use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::attempt_finalize::FinalizeError;
use crate::services::errors::{EngineError, FieldErrors};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    NotFound(&'static str),
    Validation { message: String, fields: FieldErrors },
    Engine(EngineError),
    TooManyRequests(&'static str),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub(crate) fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Engine(EngineError::validation(field, message))
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation { .. }
        | EngineError::AssemblyIncomplete
        | EngineError::InsufficientQuestions { .. }
        | EngineError::InvalidWindow(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::ExamLocked(_)
        | EngineError::ExamNotAvailable(_)
        | EngineError::AttemptAlreadyInProgress
        | EngineError::AttemptLimitReached(_)
        | EngineError::AttemptClosed(_)
        | EngineError::TimeExpired
        | EngineError::HasDependents(_)
        | EngineError::InvalidState(_) => StatusCode::CONFLICT,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ScoringFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<FinalizeError> for ApiError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::Engine(err) => Self::Engine(err),
            FinalizeError::Database(err) => Self::internal(err, "Failed to finalize attempt"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, errors) = match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let body = ErrorResponse {
                    status: status.as_u16(),
                    code: "UNAUTHORIZED",
                    message: message.to_string(),
                    errors: None,
                };
                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", message.to_string(), None)
            }
            ApiError::NotFound(entity) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{entity} not found"), None)
            }
            ApiError::Validation { message, fields } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message, Some(fields))
            }
            ApiError::Engine(EngineError::Validation { message, fields }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message, Some(fields))
            }
            ApiError::Engine(err) => {
                let status = engine_status(&err);
                if status.is_server_error() {
                    tracing::error!(code = err.code(), error = %err, "Engine failure");
                }
                (status, err.code(), err.to_string(), None)
            }
            ApiError::TooManyRequests(message) => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message.to_string(), None)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message, None)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), code, message, errors }))
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn validation_errors_carry_field_map() {
        let (status, body) =
            render(EngineError::validation("title", "Title is required").into()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["errors"]["title"][0], "Title is required");
    }

    #[tokio::test]
    async fn engine_conflicts_render_code_and_message() {
        let (status, body) = render(EngineError::AttemptAlreadyInProgress.into()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
        assert_eq!(body["code"], "ATTEMPT_ALREADY_IN_PROGRESS");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn assembly_preconditions_are_unprocessable() {
        let (status, body) = render(
            EngineError::InsufficientQuestions {
                category_id: "c1".into(),
                requested: 5,
                available: 3,
            }
            .into(),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INSUFFICIENT_QUESTIONS");
    }

    #[tokio::test]
    async fn scoring_failures_are_server_errors() {
        let (status, body) = render(EngineError::ScoringFailed("gone".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "SCORING_FAILED");
    }

    #[tokio::test]
    async fn unauthorized_sets_bearer_challenge() {
        let response = ApiError::Unauthorized("Invalid authentication credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
