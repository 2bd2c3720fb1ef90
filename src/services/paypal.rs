//! PayPal checkout client
//!
//! Each call authenticates with the client-credentials grant, then creates
//! or captures a v2 checkout order. Video generation is billed as a single
//! USD 0.80 digital-goods line item.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::PayPalConfig;
use crate::models::job::{is_remote_id, truncate};
use crate::models::payment::{OrderStatus, PaymentOrder};

const VIDEO_PRICE_USD: &str = "0.80";
const CURRENCY: &str = "USD";
const ITEM_NAME: &str = "AI Video Generation";
const ITEM_DESCRIPTION: &str = "Generate one AI video from an image";

/// Capture status PayPal reports for a settled payment
pub const CAPTURE_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider credentials are not configured")]
    MissingCredentials,
    #[error("Invalid order id: {0}")]
    InvalidOrderId(String),
    #[error("Payment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Payment provider error {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("Payment provider returned no approval link for order {0}")]
    MissingApprovalLink(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub order_id: String,
    /// Raw PayPal status, `COMPLETED` on success
    pub status: String,
}

impl CaptureResult {
    pub fn is_completed(&self) -> bool {
        self.status == CAPTURE_COMPLETED
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self) -> Result<PaymentOrder, PaymentError>;
    async fn capture_payment(&self, order_id: &str) -> Result<CaptureResult, PaymentError>;
}

#[derive(Clone)]
pub struct PayPalService {
    client: Client,
    client_id: String,
    client_secret: String,
    base_url: String,
    return_base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

impl PayPalService {
    pub fn new(config: &PayPalConfig) -> Self {
        Self {
            client: Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            return_base_url: config.return_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(PaymentError::MissingCredentials);
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let token: TokenResponse = check_status(response).await?.json().await?;
        Ok(token.access_token)
    }

    fn order_body(&self) -> serde_json::Value {
        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": CURRENCY,
                    "value": VIDEO_PRICE_USD,
                    "breakdown": {
                        "item_total": { "currency_code": CURRENCY, "value": VIDEO_PRICE_USD }
                    }
                },
                "description": ITEM_NAME,
                "items": [{
                    "name": ITEM_NAME,
                    "description": ITEM_DESCRIPTION,
                    "quantity": "1",
                    "unit_amount": { "currency_code": CURRENCY, "value": VIDEO_PRICE_USD },
                    "category": "DIGITAL_GOODS"
                }]
            }],
            "application_context": {
                "return_url": format!("{}/api/paypal/capture", self.return_base_url),
                "cancel_url": self.return_base_url,
            }
        })
    }
}

#[async_trait]
impl PaymentGateway for PayPalService {
    async fn create_order(&self) -> Result<PaymentOrder, PaymentError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&self.order_body())
            .send()
            .await?;

        let order: OrderResponse = check_status(response).await?.json().await?;

        let approval_url = order
            .links
            .into_iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href)
            .ok_or_else(|| PaymentError::MissingApprovalLink(order.id.clone()))?;

        tracing::info!(order_id = %order.id, "Created PayPal order");

        Ok(PaymentOrder {
            order_id: order.id,
            approval_url,
            status: OrderStatus::Created,
        })
    }

    async fn capture_payment(&self, order_id: &str) -> Result<CaptureResult, PaymentError> {
        if !is_remote_id(order_id) {
            return Err(PaymentError::InvalidOrderId(truncate(order_id, 50)));
        }
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders/{}/capture", self.base_url, order_id))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await?;

        let order: OrderResponse = check_status(response).await?.json().await?;
        let status = order.status.unwrap_or_default();

        tracing::info!(order_id = %order_id, status = %status, "Captured PayPal order");

        Ok(CaptureResult {
            order_id: order.id,
            status,
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PaymentError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    tracing::error!(status, message = %message, "PayPal API error");
    Err(PaymentError::Upstream { status, message })
}
