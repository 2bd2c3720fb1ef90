//! POST /api/generate-image

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::error::AppError;
use crate::models::image::{GenerateImageRequest, GenerateImageResponse};
use crate::models::job::ImageOptions;
use crate::AppState;

pub async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, AppError> {
    let Json(payload) = payload?;
    let prompt = payload.prompt.unwrap_or_default();
    let options = ImageOptions {
        size: payload.image_size.filter(|s| !s.trim().is_empty()),
    };

    let image = state.orchestrator.generate_image(&prompt, &options).await?;

    Ok(Json(GenerateImageResponse {
        success: true,
        image_url: image.artifact.public_path,
        original_url: image.original_url,
        created: image.created,
    }))
}
