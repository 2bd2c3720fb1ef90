use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::AppError;
use crate::models::artifact::{ArtifactListResponse, ListImagesQuery};
use crate::AppState;

/// Sub-directory name accepted by `?dir=`
const GENERATED_DIR: &str = "generated";

/// GET /api/list-images
///
/// File names of stored images, newest first.
pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<ListImagesQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    if let Some(dir) = query.dir.as_deref().filter(|d| !d.is_empty()) {
        if dir != GENERATED_DIR {
            return Err(AppError::Validation(format!("Unknown directory: {}", dir)));
        }
    }

    Ok(Json(state.store.list_image_names().await?))
}

/// GET /api/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
) -> Result<Json<ArtifactListResponse>, AppError> {
    let artifacts = state.store.list_artifacts().await?;
    Ok(Json(ArtifactListResponse { artifacts }))
}
