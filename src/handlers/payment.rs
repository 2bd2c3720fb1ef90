//! PayPal checkout endpoints
//!
//! create-order starts checkout and records the order (and optionally the
//! job it pays for) in the ledger. capture is the PayPal return URL; it
//! settles the payment and sends the browser back to the app.

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Redirect,
    Json,
};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::job::{is_remote_id, truncate};
use crate::models::payment::{CaptureQuery, CreateOrderRequest, CreateOrderResponse};
use crate::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let request: CreateOrderRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateOrderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
    };

    let order = state.payments.create_order().await.map_err(|e| {
        error!(error = %e, "PayPal create order failed");
        AppError::Upstream("Failed to create PayPal order".to_string())
    })?;

    let response = CreateOrderResponse {
        success: true,
        order_id: order.order_id.clone(),
        approval_url: order.approval_url.clone(),
    };

    state
        .payment_gate
        .ledger()
        .record_created(order, request.job)
        .await;

    Ok(Json(response))
}

pub async fn capture_payment(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
) -> Redirect {
    let Some(order_id) = query.token.filter(|t| !t.trim().is_empty()) else {
        return home_redirect(&[("error", "missing_order_id")]);
    };
    if !is_remote_id(&order_id) {
        warn!(order_id = %truncate(&order_id, 50), "Rejected malformed order id on capture");
        return home_redirect(&[("payment", "failed"), ("reason", "invalid_order_id")]);
    }

    // PayPal only sends the buyer back here after they approved the order
    let ledger = state.payment_gate.ledger();
    ledger.mark_approved(&order_id).await;

    match state.payments.capture_payment(&order_id).await {
        Ok(capture) if capture.is_completed() => {
            ledger.mark_captured(&order_id).await;
            info!(order_id = %order_id, "Payment captured");
            home_redirect(&[("payment", "success"), ("orderId", &order_id)])
        }
        Ok(capture) => {
            ledger.mark_failed(&order_id).await;
            warn!(order_id = %order_id, status = %capture.status, "Payment not completed");
            home_redirect(&[("payment", "failed"), ("reason", "capture_failed")])
        }
        Err(e) => {
            error!(order_id = %order_id, error = %e, "PayPal capture failed");
            home_redirect(&[("payment", "failed"), ("reason", "server_error")])
        }
    }
}

/// Redirect to the app root with the given query parameters
fn home_redirect(params: &[(&str, &str)]) -> Redirect {
    match reqwest::Url::parse_with_params("http://localhost/", params) {
        Ok(url) => Redirect::to(&format!("/?{}", url.query().unwrap_or_default())),
        Err(_) => Redirect::to("/"),
    }
}
