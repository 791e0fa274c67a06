use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::QuestionContext;
use crate::repositories;
use crate::schemas::question::{ContextCreate, ContextResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_contexts).post(create_context))
}

fn to_response(context: QuestionContext) -> ContextResponse {
    ContextResponse {
        id: context.id,
        title: context.title,
        body: context.body,
        created_at: format_primitive(context.created_at),
    }
}

/// Shared reading passages; several questions may point at the same one.
async fn create_context(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ContextCreate>,
) -> Result<(StatusCode, Json<ContextResponse>), ApiError> {
    validate_payload(&payload)?;

    let context = repositories::contexts::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        payload.title.trim(),
        &payload.body,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create context"))?;

    Ok((StatusCode::CREATED, Json(to_response(context))))
}

async fn list_contexts(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<ContextResponse>>, ApiError> {
    let contexts = repositories::contexts::list(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list contexts"))?;

    Ok(Json(contexts.into_iter().map(to_response).collect()))
}
