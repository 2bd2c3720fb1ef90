//! Client for the remote image/video generation provider
//!
//! Talks to the ZhipuAI paas v4 API: synchronous image generation,
//! asynchronous video generation and task result lookup.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeneratorConfig;
use crate::models::job::{
    is_remote_id, truncate, GeneratedImages, GenerationJob, ImageInput, ImageOptions, TaskStatus, VideoOptions,
    VideoOutput, VideoTaskResult,
};

const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const IMAGE_QUALITY: &str = "standard";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("API key is not set")]
    MissingApiKey,
    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider error {status}: {message}")]
    Upstream { status: u16, message: String },
}

/// Operations the orchestrator needs from a generation provider
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<GeneratedImages, GeneratorError>;

    async fn generate_video(
        &self,
        image: &ImageInput,
        prompt: &str,
        options: &VideoOptions,
    ) -> Result<GenerationJob, GeneratorError>;

    async fn get_video_result(&self, task_id: &str) -> Result<VideoTaskResult, GeneratorError>;
}

#[derive(Clone)]
pub struct MediaGeneratorService {
    client: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    video_model: String,
}

#[derive(Debug, Serialize)]
struct ImageGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    created: i64,
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct VideoGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    image_url: &'a str,
    with_audio: bool,
}

#[derive(Debug, Deserialize)]
struct VideoGenerationResponse {
    id: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    task_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsyncResultResponse {
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    video_result: Option<Vec<VideoResultItem>>,
}

#[derive(Debug, Deserialize)]
struct VideoResultItem {
    url: String,
    #[serde(default)]
    cover_image_url: Option<String>,
}

/// Error payload shape: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl MediaGeneratorService {
    pub fn new(config: &GeneratorConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("ZHIPUAI_API_KEY is not set. Generation requests will fail.");
        }

        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
        }
    }

    fn ensure_api_key(&self) -> Result<(), GeneratorError> {
        if self.api_key.is_empty() {
            return Err(GeneratorError::MissingApiKey);
        }
        Ok(())
    }

    /// Turn a non-2xx response into `GeneratorError::Upstream`, keeping the
    /// provider's own message when it sent one
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GeneratorError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);

        tracing::error!(status = status.as_u16(), message = %message, "Generation provider error");

        Err(GeneratorError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MediaGenerator for MediaGeneratorService {
    async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<GeneratedImages, GeneratorError> {
        self.ensure_api_key()?;

        let size = options.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE);
        tracing::info!(model = %self.image_model, size = %size, "Requesting image generation");

        let url = format!("{}/images/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ImageGenerationBody {
                model: &self.image_model,
                prompt,
                size,
                quality: IMAGE_QUALITY,
            })
            .send()
            .await?;

        let data: ImageGenerationResponse = Self::check_status(response).await?.json().await?;

        tracing::info!("Image generation returned {} image(s)", data.data.len());

        Ok(GeneratedImages {
            urls: data.data.into_iter().map(|d| d.url).collect(),
            created: data.created,
        })
    }

    async fn generate_video(
        &self,
        image: &ImageInput,
        prompt: &str,
        options: &VideoOptions,
    ) -> Result<GenerationJob, GeneratorError> {
        self.ensure_api_key()?;

        tracing::info!(
            model = %self.video_model,
            image = %image.log_label(),
            with_audio = options.with_audio,
            "Submitting video generation task"
        );

        let url = format!("{}/videos/generations", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&VideoGenerationBody {
                model: &self.video_model,
                prompt,
                image_url: image.as_api_value(),
                with_audio: options.with_audio,
            })
            .send()
            .await?;

        let data: VideoGenerationResponse = Self::check_status(response).await?.json().await?;

        let status = data
            .task_status
            .as_deref()
            .map(TaskStatus::from_provider)
            .unwrap_or(TaskStatus::Processing);

        tracing::info!(task_id = %data.id, status = %status, "Video task accepted");

        Ok(GenerationJob {
            task_id: data.id,
            request_id: data.request_id,
            model: data.model,
            status,
        })
    }

    async fn get_video_result(&self, task_id: &str) -> Result<VideoTaskResult, GeneratorError> {
        self.ensure_api_key()?;
        if !is_remote_id(task_id) {
            return Err(GeneratorError::InvalidTaskId(truncate(task_id, 50)));
        }

        let url = format!("{}/async-result/{}", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let data: AsyncResultResponse = Self::check_status(response).await?.json().await?;

        let status = data
            .task_status
            .as_deref()
            .map(TaskStatus::from_provider)
            .unwrap_or(TaskStatus::Failed);

        let videos: Vec<VideoOutput> = data
            .video_result
            .unwrap_or_default()
            .into_iter()
            .map(|item| VideoOutput {
                url: item.url,
                cover_image_url: item.cover_image_url.filter(|u| !u.is_empty()),
            })
            .collect();

        tracing::debug!(
            task_id = %task_id,
            status = %status,
            first_video = %videos.first().map(|v| truncate(&v.url, 50)).unwrap_or_default(),
            "Fetched video task result"
        );

        Ok(VideoTaskResult { status, videos })
    }
}
