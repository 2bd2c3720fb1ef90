//! Locally cached media

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Video,
}

impl ArtifactKind {
    /// Classify a file name by extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(ArtifactKind::Image),
            "mp4" | "webm" | "mov" => Some(ArtifactKind::Video),
            _ => None,
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "png",
            ArtifactKind::Video => "mp4",
        }
    }
}

/// A remote file that has been downloaded into the storage directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalArtifact {
    /// Path under the public prefix, e.g. `/generated/video_1700000000000_ab12cd34.mp4`
    pub public_path: String,
    /// Where the bytes came from; `None` for uploads
    pub source_url: Option<String>,
    pub kind: ArtifactKind,
}

/// One file found in the storage directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub filename: String,
    pub public_path: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListResponse {
    pub artifacts: Vec<ArtifactEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListImagesQuery {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub image_url: String,
    pub original_filename: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
}
