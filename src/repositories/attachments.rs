use time::PrimitiveDateTime;

use crate::db::models::Attachment;
use crate::db::types::ResourceType;

const COLUMNS: &str = "\
    id, resource_type, resource_id, file_name, content_type, url, size_bytes, uploaded_by, \
    created_at";

pub(crate) struct CreateAttachment<'a> {
    pub(crate) id: &'a str,
    pub(crate) resource_type: ResourceType,
    pub(crate) resource_id: &'a str,
    pub(crate) file_name: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) url: &'a str,
    pub(crate) size_bytes: i64,
    pub(crate) uploaded_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Resolves the owning row through the table that matches the tag.
pub(crate) async fn resource_exists(
    executor: impl sqlx::PgExecutor<'_>,
    resource_type: ResourceType,
    resource_id: &str,
) -> Result<bool, sqlx::Error> {
    let query = match resource_type {
        ResourceType::Question => "SELECT EXISTS(SELECT 1 FROM questions WHERE id = $1)",
        ResourceType::Exam => "SELECT EXISTS(SELECT 1 FROM exams WHERE id = $1)",
    };
    sqlx::query_scalar(query).bind(resource_id).fetch_one(executor).await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttachment<'_>,
) -> Result<Attachment, sqlx::Error> {
    sqlx::query_as::<_, Attachment>(&format!(
        "INSERT INTO attachments (
            id, resource_type, resource_id, file_name, content_type, url, size_bytes,
            uploaded_by, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.resource_type)
    .bind(params.resource_id)
    .bind(params.file_name)
    .bind(params.content_type)
    .bind(params.url)
    .bind(params.size_bytes)
    .bind(params.uploaded_by)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_for_resource(
    executor: impl sqlx::PgExecutor<'_>,
    resource_type: ResourceType,
    resource_id: &str,
) -> Result<Vec<Attachment>, sqlx::Error> {
    sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {COLUMNS} FROM attachments
         WHERE resource_type = $1 AND resource_id = $2
         ORDER BY created_at"
    ))
    .bind(resource_type)
    .bind(resource_id)
    .fetch_all(executor)
    .await
}

/// Attachments have no foreign key to their owner, so owners clean up explicitly.
pub(crate) async fn delete_for_resource(
    executor: impl sqlx::PgExecutor<'_>,
    resource_type: ResourceType,
    resource_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM attachments WHERE resource_type = $1 AND resource_id = $2")
        .bind(resource_type)
        .bind(resource_id)
        .execute(executor)
        .await?;
    Ok(())
}
