//! POST /api/upload
//!
//! Accepts one image in the multipart field `image` and stores it next to
//! the generated artifacts.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};

use crate::error::AppError;
use crate::models::artifact::UploadResponse;
use crate::AppState;

/// Upload size cap (5MB)
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const FIELD_NAME: &str = "image";

pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart
        .map_err(|_| AppError::Validation("Request must be multipart/form-data".to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::Validation("File must be an image".to_string()));
        }

        let original_filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?;

        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation("File size must be less than 5MB".to_string()));
        }

        let artifact = state
            .store
            .save_upload(&bytes, &original_filename, &content_type)
            .await
            .map_err(|e| AppError::from(e).context("Failed to upload file"))?;

        return Ok(Json(UploadResponse {
            success: true,
            image_url: artifact.public_path,
            original_filename,
            size: bytes.len(),
            content_type,
        }));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}
