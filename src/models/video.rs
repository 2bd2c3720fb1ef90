//! Request/response models for the video generation endpoints

use serde::{Deserialize, Serialize};

use super::job::TaskStatus;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoRequest {
    /// Remote URL, local `/generated/...` path, or base64 data
    #[serde(default)]
    pub image_url: Option<String>,
    /// Provider URL of a previously generated image
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub is_base64: Option<bool>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub with_audio: Option<bool>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    pub success: bool,
    pub task_id: String,
    pub request_id: Option<String>,
    pub model: Option<String>,
    pub task_status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusQuery {
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub success: bool,
    pub task_status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoStatusResponse {
    pub fn processing() -> Self {
        Self {
            success: true,
            task_status: TaskStatus::Processing,
            video_url: None,
            cover_image_url: None,
            original_video_url: None,
            original_cover_url: None,
            message: Some("Video is still being generated".to_string()),
            error: None,
        }
    }

    pub fn failed(status: TaskStatus) -> Self {
        Self {
            success: false,
            task_status: status,
            video_url: None,
            cover_image_url: None,
            original_video_url: None,
            original_cover_url: None,
            message: None,
            error: Some("Video generation failed".to_string()),
        }
    }
}
