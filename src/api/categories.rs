use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Category;
use crate::repositories;
use crate::schemas::question::{CategoryCreate, CategoryResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_categories).post(create_category))
}

fn to_response(category: Category, question_count: i64) -> CategoryResponse {
    CategoryResponse {
        id: category.id,
        name: category.name,
        description: category.description,
        question_count,
        created_at: format_primitive(category.created_at),
    }
}

async fn create_category(
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<CategoryCreate>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    validate_payload(&payload)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::field("name", "Name is required"));
    }
    let description =
        payload.description.as_deref().map(str::trim).filter(|value| !value.is_empty());

    let category = repositories::categories::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        name,
        description,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create category"))?
    .ok_or_else(|| ApiError::field("name", "A category with this name already exists"))?;

    tracing::info!(
        user_id = %user.id,
        category_id = %category.id,
        action = "category_create",
        "Category created"
    );

    Ok((StatusCode::CREATED, Json(to_response(category, 0))))
}

async fn list_categories(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = repositories::categories::list_with_counts(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list categories"))?;

    Ok(Json(categories.into_iter().map(|(category, count)| to_response(category, count)).collect()))
}
