use crate::api::error::AppError;
use crate::models::{ContentDescriptor, RawFile};
use crate::services::session::{SessionState, UploadSession};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub display_name: String,
    pub byte_size: u64,
    /// Size in MiB with two decimals
    pub size_mib: String,
    pub locator: String,
    pub storage_path: String,
    pub completed_at: DateTime<Utc>,
}

impl From<&ContentDescriptor> for DocumentResponse {
    fn from(descriptor: &ContentDescriptor) -> Self {
        Self {
            display_name: descriptor.display_name.clone(),
            byte_size: descriptor.byte_size,
            size_mib: descriptor.size_mib(),
            locator: descriptor.locator.clone(),
            storage_path: descriptor.storage_path.clone(),
            completed_at: descriptor.completed_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/documents",
    request_body(content = Multipart, description = "Document upload (field `file`)"),
    responses(
        (status = 202, description = "Transfer started", body = UploadSession),
        (status = 422, description = "Document rejected before upload", body = UploadSession),
        (status = 400, description = "No file provided"),
        (status = 413, description = "Request body too large")
    ),
    tag = "documents"
)]
pub async fn upload_document(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadSession>), AppError> {
    let mut upload: Option<(RawFile, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let err_msg = e.to_string();
        if err_msg.contains("length limit exceeded") {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        } else {
            AppError::BadRequest(err_msg)
        }
    })? {
        if field.name().unwrap_or_default() != "file" {
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let media_type = field
            .content_type()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref())
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let file = RawFile::new(file_name, data.len() as u64, media_type);
        upload = Some((file, data));
    }

    let (file, data) = upload.ok_or(AppError::BadRequest("No file provided".to_string()))?;
    tracing::info!(
        "📥 Document '{}' received ({} bytes, {})",
        file.name,
        file.byte_size,
        file.declared_media_type
    );

    let session = state.pipeline.submit(file, data).await?;
    let status = match session.state {
        SessionState::Failed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::ACCEPTED,
    };

    Ok((status, Json(session)))
}

#[utoipa::path(
    get,
    path = "/upload/session",
    responses(
        (status = 200, description = "Session currently on display, null before the first upload", body = UploadSession)
    ),
    tag = "documents"
)]
pub async fn current_session(State(state): State<crate::AppState>) -> Json<Option<UploadSession>> {
    Json(state.pipeline.session())
}

#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "Completed documents in upload order", body = Vec<DocumentResponse>)
    ),
    tag = "documents"
)]
pub async fn list_documents(State(state): State<crate::AppState>) -> Json<Vec<DocumentResponse>> {
    let documents = state.pipeline.documents();
    Json(documents.iter().map(DocumentResponse::from).collect())
}
