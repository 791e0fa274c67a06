use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::Attachment;
use crate::db::types::ResourceType;
use crate::repositories;
use crate::schemas::attachment::{AttachmentCreate, AttachmentResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_attachment))
        .route("/:resource_type/:resource_id", get(list_attachments))
}

fn to_response(attachment: Attachment) -> AttachmentResponse {
    AttachmentResponse {
        id: attachment.id,
        resource_type: attachment.resource_type,
        resource_id: attachment.resource_id,
        file_name: attachment.file_name,
        content_type: attachment.content_type,
        url: attachment.url,
        size_bytes: attachment.size_bytes,
        uploaded_by: attachment.uploaded_by,
        created_at: format_primitive(attachment.created_at),
    }
}

/// Records metadata for a file that was already uploaded elsewhere.
async fn create_attachment(
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AttachmentCreate>,
) -> Result<(StatusCode, Json<AttachmentResponse>), ApiError> {
    validate_payload(&payload)?;

    let owner_exists = repositories::attachments::resource_exists(
        state.db(),
        payload.resource_type,
        &payload.resource_id,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to resolve attachment owner"))?;
    if !owner_exists {
        return Err(ApiError::field("resource_id", "Referenced resource does not exist"));
    }

    let attachment = repositories::attachments::create(
        state.db(),
        repositories::attachments::CreateAttachment {
            id: &Uuid::new_v4().to_string(),
            resource_type: payload.resource_type,
            resource_id: &payload.resource_id,
            file_name: payload.file_name.trim(),
            content_type: &payload.content_type,
            url: &payload.url,
            size_bytes: payload.size_bytes,
            uploaded_by: &user.id,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attachment"))?;

    tracing::info!(
        user_id = %user.id,
        attachment_id = %attachment.id,
        resource_id = %attachment.resource_id,
        action = "attachment_create",
        "Attachment recorded"
    );

    Ok((StatusCode::CREATED, Json(to_response(attachment))))
}

async fn list_attachments(
    Path((resource_type, resource_id)): Path<(String, String)>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttachmentResponse>>, ApiError> {
    let resource_type =
        ResourceType::parse(&resource_type).ok_or(ApiError::NotFound("Resource type"))?;

    let owner_exists =
        repositories::attachments::resource_exists(state.db(), resource_type, &resource_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to resolve attachment owner"))?;
    if !owner_exists {
        return Err(ApiError::NotFound("Resource"));
    }

    let attachments =
        repositories::attachments::list_for_resource(state.db(), resource_type, &resource_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list attachments"))?;

    Ok(Json(attachments.into_iter().map(to_response).collect()))
}
