use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::ResourceType;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AttachmentCreate {
    #[serde(alias = "resourceType")]
    pub(crate) resource_type: ResourceType,
    #[serde(alias = "resourceId")]
    #[validate(length(min = 1, message = "Resource id is required"))]
    pub(crate) resource_id: String,
    #[serde(alias = "fileName")]
    #[validate(length(min = 1, max = 255, message = "File name must be 1 to 255 characters"))]
    pub(crate) file_name: String,
    #[serde(alias = "contentType")]
    #[validate(length(min = 1, max = 100, message = "Content type must be 1 to 100 characters"))]
    pub(crate) content_type: String,
    #[validate(url(message = "Url must be absolute"))]
    pub(crate) url: String,
    #[serde(alias = "sizeBytes")]
    #[validate(range(min = 0, message = "Size must be non-negative"))]
    pub(crate) size_bytes: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttachmentResponse {
    pub(crate) id: String,
    pub(crate) resource_type: ResourceType,
    pub(crate) resource_id: String,
    pub(crate) file_name: String,
    pub(crate) content_type: String,
    pub(crate) url: String,
    pub(crate) size_bytes: i64,
    pub(crate) uploaded_by: String,
    pub(crate) created_at: String,
}
