//! Payment orders and the job parameters bound to them

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Approved,
    Captured,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub order_id: String,
    pub approval_url: String,
    pub status: OrderStatus,
}

/// Video job parameters recorded when the order is created, so the
/// submission after the payment redirect does not depend on client storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub image_url: String,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub is_base64: bool,
    pub prompt: String,
    #[serde(default)]
    pub with_audio: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub job: Option<PendingJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: String,
    pub approval_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureQuery {
    /// PayPal appends the order id as `token` on the return URL
    pub token: Option<String>,
}
