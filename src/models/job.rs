//! Generation job types shared by the generator client and the orchestrator

use serde::{Deserialize, Serialize};

/// Status of an asynchronous generation task as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED", alias = "FAIL")]
    Failed,
}

impl TaskStatus {
    /// Map the provider's status string. Anything unrecognised is a failure.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PROCESSING" => TaskStatus::Processing,
            "SUCCESS" => TaskStatus::Success,
            _ => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image handed to the video model, either by reference or inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Publicly reachable URL
    Url(String),
    /// Base64 payload, optionally as a `data:` URL
    Inline(String),
}

impl ImageInput {
    /// Value sent in the provider's `image_url` field, which accepts both forms
    pub fn as_api_value(&self) -> &str {
        match self {
            ImageInput::Url(url) => url,
            ImageInput::Inline(data) => data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_api_value().trim().is_empty()
    }

    /// Short form for log lines; inline payloads are never logged
    pub fn log_label(&self) -> String {
        match self {
            ImageInput::Url(url) => truncate(url, 50),
            ImageInput::Inline(data) => format!("inline image ({} bytes)", data.len()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// e.g. "1024x1024"
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    pub with_audio: bool,
}

/// Result of a synchronous image generation call
#[derive(Debug, Clone)]
pub struct GeneratedImages {
    pub urls: Vec<String>,
    pub created: i64,
}

/// Handle returned when a video task has been accepted by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub task_id: String,
    pub request_id: Option<String>,
    pub model: Option<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutput {
    pub url: String,
    pub cover_image_url: Option<String>,
}

/// Current state of a video task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTaskResult {
    pub status: TaskStatus,
    pub videos: Vec<VideoOutput>,
}

/// Shorten a string for logging without splitting a UTF-8 sequence
pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let cut: String = value.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Whether a provider-issued id (task or order) is safe to place in a URL
/// path: ASCII alphanumerics plus `-`, `_` and `.`, and not a dot segment
pub fn is_remote_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_rejects_path_tricks() {
        assert!(is_remote_id("abc123"));
        assert!(is_remote_id("5O190127TN364715T"));
        assert!(is_remote_id("8107-1700000000.task_1"));
        assert!(!is_remote_id(""));
        assert!(!is_remote_id(".."));
        assert!(!is_remote_id("../../x"));
        assert!(!is_remote_id("a/b"));
        assert!(!is_remote_id("a?b=c"));
        assert!(!is_remote_id("a%2Fb"));
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(TaskStatus::from_provider("PROCESSING"), TaskStatus::Processing);
        assert_eq!(TaskStatus::from_provider("success"), TaskStatus::Success);
        assert_eq!(TaskStatus::from_provider("FAIL"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_provider("EXPIRED"), TaskStatus::Failed);
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_in_upper_case() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        let parsed: TaskStatus = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failed);
    }

    #[test]
    fn test_inline_images_are_not_logged() {
        let input = ImageInput::Inline("data:image/png;base64,AAAA".to_string());
        assert!(!input.log_label().contains("AAAA"));

        let url = ImageInput::Url(format!("https://cdn.example.com/{}", "a".repeat(80)));
        assert!(url.log_label().ends_with("..."));
    }
}
