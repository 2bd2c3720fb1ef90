//! Video generation endpoints
//!
//! POST /api/generate-video submits a paid job, GET /api/generate-video
//! checks on it and downloads the result once it is ready.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::config::PUBLIC_PREFIX;
use crate::error::AppError;
use crate::models::job::{ImageInput, TaskStatus, VideoOptions};
use crate::models::payment::PendingJob;
use crate::models::video::{
    GenerateVideoRequest, GenerateVideoResponse, VideoStatusQuery, VideoStatusResponse,
};
use crate::services::artifact_store::{ArtifactStore, StoreError};
use crate::services::orchestrator::PollOutcome;
use crate::services::payment_gate::{client_ip, GateDecision};
use crate::AppState;

const MISSING_INPUT: &str = "Image URL and prompt are required";
const UNRESOLVED_LOCAL_IMAGE: &str =
    "Could not process the image URL. For local images, please provide the original URL.";

pub async fn generate_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateVideoRequest>, JsonRejection>,
) -> Result<Json<GenerateVideoResponse>, AppError> {
    let Json(payload) = payload?;
    let ip = client_ip(&headers);

    info!(
        client_ip = %ip,
        order_id = ?payload.order_id,
        is_base64 = payload.is_base64.unwrap_or(false),
        with_audio = payload.with_audio.unwrap_or(false),
        "Received video generation request"
    );

    // Without an order there is no server-held job to fall back on
    if payload.order_id.is_none() && !has_inputs(&payload) {
        return Err(AppError::Validation(MISSING_INPUT.to_string()));
    }

    let decision = state
        .payment_gate
        .check(payload.order_id.as_deref(), &ip)
        .await?;

    let pending = match &decision {
        GateDecision::Paid { pending_job, .. } => pending_job.clone(),
        _ => None,
    };
    let request = merge_pending(payload, pending);

    match submit(&state, &request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            state.payment_gate.refund(&decision).await;
            Err(e.context("Failed to generate video"))
        }
    }
}

async fn submit(
    state: &AppState,
    request: &GenerateVideoRequest,
) -> Result<GenerateVideoResponse, AppError> {
    let image = resolve_image(&state.store, request).await?;
    let prompt = request.prompt.as_deref().unwrap_or_default();
    let options = VideoOptions {
        with_audio: request.with_audio.unwrap_or(false),
    };

    let job = state
        .orchestrator
        .submit(image.as_ref(), prompt, &options)
        .await?;

    Ok(GenerateVideoResponse {
        success: true,
        task_id: job.task_id,
        request_id: job.request_id,
        model: job.model,
        task_status: job.status,
    })
}

pub async fn get_video_status(
    State(state): State<AppState>,
    Query(query): Query<VideoStatusQuery>,
) -> Result<Json<VideoStatusResponse>, AppError> {
    let task_id = query
        .task_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Task ID is required".to_string()))?;

    let outcome = state
        .orchestrator
        .poll(&task_id)
        .await
        .map_err(|e| AppError::from(e).context("Failed to get video result"))?;

    let response = match outcome {
        PollOutcome::Pending => VideoStatusResponse::processing(),
        PollOutcome::Completed(done) => VideoStatusResponse {
            success: true,
            task_status: TaskStatus::Success,
            video_url: Some(done.video.public_path),
            original_video_url: done.video.source_url,
            cover_image_url: done.cover.as_ref().map(|c| c.public_path.clone()),
            original_cover_url: done.cover.and_then(|c| c.source_url),
            message: None,
            error: None,
        },
        PollOutcome::Failed(status) => VideoStatusResponse::failed(status),
    };

    Ok(Json(response))
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn has_inputs(request: &GenerateVideoRequest) -> bool {
    non_empty(&request.image_url) && non_empty(&request.prompt)
}

/// Fill gaps in the request from the job recorded with the order
fn merge_pending(mut request: GenerateVideoRequest, pending: Option<PendingJob>) -> GenerateVideoRequest {
    let Some(job) = pending else {
        return request;
    };

    if !non_empty(&request.image_url) {
        request.image_url = Some(job.image_url);
        request.original_url = job.original_url;
        request.is_base64 = Some(job.is_base64);
    }
    if !non_empty(&request.prompt) {
        request.prompt = Some(job.prompt);
    }
    if request.with_audio.is_none() {
        request.with_audio = Some(job.with_audio);
    }
    request
}

/// Work out what to send the provider as the source image.
///
/// Inline data is passed through. Otherwise the provider URL wins, then a
/// local `/generated/...` path is mapped back to where it was downloaded
/// from, or inlined from disk when it has no remote origin (uploads).
async fn resolve_image(
    store: &ArtifactStore,
    request: &GenerateVideoRequest,
) -> Result<Option<ImageInput>, AppError> {
    let Some(image_url) = request.image_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    else {
        return Ok(None);
    };

    if request.is_base64.unwrap_or(false) {
        return Ok(Some(ImageInput::Inline(image_url.to_string())));
    }

    if let Some(original) = request
        .original_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    {
        return Ok(Some(ImageInput::Url(original.to_string())));
    }

    if image_url.starts_with(&format!("{}/", PUBLIC_PREFIX)) {
        if let Some(source) = store.source_url_for(image_url).await {
            return Ok(Some(ImageInput::Url(source)));
        }
        return match store.inline_data_url(image_url).await {
            Ok(data) => Ok(Some(ImageInput::Inline(data))),
            Err(StoreError::NotFound(_)) | Err(StoreError::InvalidPath(_)) => {
                Err(AppError::Validation(UNRESOLVED_LOCAL_IMAGE.to_string()))
            }
            Err(e) => Err(e.into()),
        };
    }

    if image_url.starts_with("http://") || image_url.starts_with("https://") {
        return Ok(Some(ImageInput::Url(image_url.to_string())));
    }

    if image_url.starts_with("data:") {
        return Ok(Some(ImageInput::Inline(image_url.to_string())));
    }

    Err(AppError::Validation(UNRESOLVED_LOCAL_IMAGE.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(image_url: Option<&str>, prompt: Option<&str>) -> GenerateVideoRequest {
        GenerateVideoRequest {
            image_url: image_url.map(str::to_string),
            prompt: prompt.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_pending_only_fills_gaps() {
        let pending = PendingJob {
            image_url: "https://cdn.example.com/stored.png".to_string(),
            original_url: None,
            is_base64: false,
            prompt: "stored prompt".to_string(),
            with_audio: true,
        };

        let merged = merge_pending(request(None, Some("new prompt")), Some(pending.clone()));
        assert_eq!(merged.image_url.as_deref(), Some("https://cdn.example.com/stored.png"));
        assert_eq!(merged.prompt.as_deref(), Some("new prompt"));
        assert_eq!(merged.with_audio, Some(true));

        let untouched = merge_pending(request(Some("https://a/b.png"), Some("p")), None);
        assert_eq!(untouched.image_url.as_deref(), Some("https://a/b.png"));
    }

    #[tokio::test]
    async fn test_resolve_image_preference_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let mut inline = request(Some("iVBORw0KGgo="), Some("p"));
        inline.is_base64 = Some(true);
        assert_eq!(
            resolve_image(&store, &inline).await.unwrap(),
            Some(ImageInput::Inline("iVBORw0KGgo=".to_string()))
        );

        let mut with_original = request(Some("/generated/image_1.png"), Some("p"));
        with_original.original_url = Some("https://cdn.example.com/1.png".to_string());
        assert_eq!(
            resolve_image(&store, &with_original).await.unwrap(),
            Some(ImageInput::Url("https://cdn.example.com/1.png".to_string()))
        );

        let remote = request(Some("https://cdn.example.com/2.png"), Some("p"));
        assert_eq!(
            resolve_image(&store, &remote).await.unwrap(),
            Some(ImageInput::Url("https://cdn.example.com/2.png".to_string()))
        );

        assert_eq!(resolve_image(&store, &request(None, Some("p"))).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_upload_is_inlined_and_unknown_local_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let upload = store.save_upload(b"abc", "me.png", "image/png").await.unwrap();

        let resolved = resolve_image(&store, &request(Some(&upload.public_path), Some("p")))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            Some(ImageInput::Inline("data:image/png;base64,YWJj".to_string()))
        );

        let missing = resolve_image(&store, &request(Some("/generated/gone.png"), Some("p"))).await;
        assert!(matches!(missing, Err(AppError::Validation(_))));

        let relative = resolve_image(&store, &request(Some("pictures/me.png"), Some("p"))).await;
        assert!(matches!(relative, Err(AppError::Validation(_))));
    }
}
