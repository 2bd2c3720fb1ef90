use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub success: bool,
    /// Local public path of the saved image
    pub image_url: String,
    /// Provider URL the image was downloaded from
    pub original_url: String,
    pub created: i64,
}
