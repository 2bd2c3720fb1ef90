//! Decides whether a video submission has been paid for

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::PaymentGateConfig;
use crate::models::payment::PendingJob;
use crate::services::order_ledger::{LedgerError, OrderLedger};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Payment required for video generation")]
    PaymentRequired,
    #[error(transparent)]
    Order(#[from] LedgerError),
}

/// Why a submission was let through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Caller's IP is on the enabled whitelist
    Whitelisted,
    /// Captured order from the ledger, now consumed
    Paid {
        order_id: String,
        pending_job: Option<PendingJob>,
    },
    /// Ledger checks disabled; an order id was supplied
    OrderPresent { order_id: String },
}

#[derive(Clone)]
pub struct PaymentGate {
    config: PaymentGateConfig,
    ledger: OrderLedger,
}

impl PaymentGate {
    pub fn new(config: PaymentGateConfig, ledger: OrderLedger) -> Self {
        if config.whitelist_enabled {
            tracing::warn!(
                ips = ?config.whitelisted_ips,
                "Payment whitelist is enabled, listed callers skip payment"
            );
        }
        Self { config, ledger }
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.config.whitelist_enabled && self.config.whitelisted_ips.iter().any(|allowed| allowed == ip)
    }

    pub async fn check(
        &self,
        order_id: Option<&str>,
        client_ip: &str,
    ) -> Result<GateDecision, GateError> {
        if self.is_whitelisted(client_ip) {
            tracing::info!(client_ip = %client_ip, "Whitelisted caller, skipping payment check");
            return Ok(GateDecision::Whitelisted);
        }

        let order_id = match order_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => return Err(GateError::PaymentRequired),
        };

        if !self.config.require_captured_order {
            return Ok(GateDecision::OrderPresent {
                order_id: order_id.to_string(),
            });
        }

        let pending_job = self.ledger.authorize(order_id).await?;
        Ok(GateDecision::Paid {
            order_id: order_id.to_string(),
            pending_job,
        })
    }

    /// Undo a consumed order when the paid submission did not go through
    pub async fn refund(&self, decision: &GateDecision) {
        if let GateDecision::Paid { order_id, .. } = decision {
            self.ledger.release(order_id).await;
        }
    }
}

/// Caller IP: first `x-forwarded-for` entry, then `x-real-ip`, else `localhost`
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded.or(real_ip).unwrap_or("localhost").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{OrderStatus, PaymentOrder};
    use std::time::Duration;

    fn gate(config: PaymentGateConfig) -> PaymentGate {
        PaymentGate::new(config, OrderLedger::new(Duration::from_secs(60)))
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "localhost");

        headers.insert("x-real-ip", "10.1.1.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.1.1.1");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_missing_order_requires_payment() {
        let gate = gate(PaymentGateConfig::default());

        let result = gate.check(None, "203.0.113.7").await;
        assert!(matches!(result, Err(GateError::PaymentRequired)));

        let result = gate.check(Some("  "), "203.0.113.7").await;
        assert!(matches!(result, Err(GateError::PaymentRequired)));
    }

    #[tokio::test]
    async fn test_whitelist_is_ignored_unless_enabled() {
        let disabled = gate(PaymentGateConfig::default());
        assert!(!disabled.is_whitelisted("127.0.0.1"));
        assert!(disabled.check(None, "127.0.0.1").await.is_err());

        let enabled = gate(PaymentGateConfig {
            whitelist_enabled: true,
            ..PaymentGateConfig::default()
        });
        assert_eq!(enabled.check(None, "127.0.0.1").await.unwrap(), GateDecision::Whitelisted);
        assert!(enabled.check(None, "203.0.113.7").await.is_err());
    }

    #[tokio::test]
    async fn test_order_presence_is_enough_when_ledger_checks_are_off() {
        let gate = gate(PaymentGateConfig {
            require_captured_order: false,
            ..PaymentGateConfig::default()
        });

        let decision = gate.check(Some("ANY"), "203.0.113.7").await.unwrap();
        assert_eq!(decision, GateDecision::OrderPresent { order_id: "ANY".to_string() });
    }

    #[tokio::test]
    async fn test_captured_order_passes_and_refund_restores_it() {
        let gate = gate(PaymentGateConfig::default());
        gate.ledger()
            .record_created(
                PaymentOrder {
                    order_id: "O-9".to_string(),
                    approval_url: "https://paypal.example/approve".to_string(),
                    status: OrderStatus::Created,
                },
                None,
            )
            .await;

        assert!(matches!(
            gate.check(Some("O-9"), "203.0.113.7").await,
            Err(GateError::Order(LedgerError::NotCaptured(_)))
        ));

        gate.ledger().mark_captured("O-9").await;
        let decision = gate.check(Some("O-9"), "203.0.113.7").await.unwrap();
        assert!(matches!(decision, GateDecision::Paid { .. }));
        assert!(gate.check(Some("O-9"), "203.0.113.7").await.is_err());

        gate.refund(&decision).await;
        assert!(gate.check(Some("O-9"), "203.0.113.7").await.is_ok());
    }
}
