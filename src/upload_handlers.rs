use crate::auth::OptionalSession;
use crate::compression::CompressionLevel;
use crate::error::ApiError;
use crate::pipeline::StagedFile;
use crate::AppState;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Compresses one or more images from the `image` multipart field(s).
/// Authentication is optional: with a session the produced records are
/// appended to the account history, without one they are only returned.
pub async fn optimize_img(
    State(state): State<Arc<AppState>>,
    OptionalSession(session): OptionalSession,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut files = Vec::new();
    let mut level_param = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| ApiError::Validation("Image filename is required".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
                files.push(StagedFile::stage(&state.config.temp_dir, &file_name, &bytes)?);
            }
            "compressionLevel" => {
                level_param = field.text().await.ok();
            }
            _ => {}
        }
    }

    let level = CompressionLevel::from_param(level_param.as_deref());
    let count = files.len();
    let links = state
        .pipeline
        .process_images(files, level, session.as_ref())
        .await?;

    info!(count, persisted = session.is_some(), "Images compressed");

    Ok(Json(json!({
        "success": true,
        "message": "Image compressed successfully",
        "data": { "links": links },
    })))
}

/// Compresses a single PDF from the `file` multipart field via the remote
/// optimization API. Optional authentication, same persistence rule as
/// images.
pub async fn compress_pdf(
    State(state): State<Arc<AppState>>,
    OptionalSession(session): OptionalSession,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut staged = None;
    let mut level_param = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| ApiError::Validation("PDF filename is required".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
                staged = Some(StagedFile::stage(
                    &state.config.temp_dir,
                    &file_name,
                    &bytes,
                )?);
            }
            "compressionLevel" => {
                level_param = field.text().await.ok();
            }
            _ => {}
        }
    }

    let staged =
        staged.ok_or_else(|| ApiError::Validation("PDF file is required".to_string()))?;
    let level = CompressionLevel::from_param(level_param.as_deref());

    let (artifact, original_size, record) = state
        .pipeline
        .process_pdf(staged, level, session.as_ref())
        .await?;

    info!(
        page_count = artifact.page_count,
        persisted = record.is_some(),
        "PDF compressed"
    );

    Ok(Json(json!({
        "success": true,
        "message": "PDF compressed successfully",
        "data": {
            "compressedPdfUrl": artifact.url,
            "originalFileSize": original_size,
            "compressedFileSize": artifact.compressed_size,
            "pageCount": artifact.page_count,
            "record": record,
        },
    })))
}
