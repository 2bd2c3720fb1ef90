//! In-process ledger of payment orders created by this server
//!
//! Binds each order to its capture state and to the job parameters the
//! client supplied when it started checkout. An order authorizes exactly one
//! video submission.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use thiserror::Error;

use crate::models::payment::{OrderStatus, PaymentOrder, PendingJob};

const LEDGER_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Unknown payment order {0}")]
    UnknownOrder(String),
    #[error("Payment for order {0} has not been completed")]
    NotCaptured(String),
    #[error("Payment order {0} has already been used")]
    AlreadyUsed(String),
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub order: PaymentOrder,
    pub pending_job: Option<PendingJob>,
    pub consumed: bool,
}

#[derive(Clone)]
pub struct OrderLedger {
    entries: Arc<Cache<String, LedgerEntry>>,
}

impl OrderLedger {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(LEDGER_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self {
            entries: Arc::new(entries),
        }
    }

    pub async fn record_created(&self, order: PaymentOrder, pending_job: Option<PendingJob>) {
        tracing::debug!(order_id = %order.order_id, has_job = pending_job.is_some(), "Recording order");
        self.entries
            .insert(
                order.order_id.clone(),
                LedgerEntry {
                    order,
                    pending_job,
                    consumed: false,
                },
            )
            .await;
    }

    pub async fn get(&self, order_id: &str) -> Option<LedgerEntry> {
        self.entries.get(order_id).await
    }

    pub async fn mark_approved(&self, order_id: &str) {
        self.set_status(order_id, OrderStatus::Approved).await;
    }

    pub async fn mark_captured(&self, order_id: &str) {
        self.set_status(order_id, OrderStatus::Captured).await;
    }

    pub async fn mark_failed(&self, order_id: &str) {
        self.set_status(order_id, OrderStatus::Failed).await;
    }

    /// Consume a captured order and hand back the job it was created for
    pub async fn authorize(&self, order_id: &str) -> Result<Option<PendingJob>, LedgerError> {
        let entry = self
            .entries
            .entry(order_id.to_string())
            .and_compute_with(|existing| {
                let op = match existing.map(|e| e.into_value()) {
                    Some(mut entry)
                        if entry.order.status == OrderStatus::Captured && !entry.consumed =>
                    {
                        entry.consumed = true;
                        Op::Put(entry)
                    }
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match entry {
            CompResult::ReplacedWith(e) => Ok(e.into_value().pending_job),
            CompResult::Unchanged(e) => {
                let entry = e.into_value();
                if entry.order.status != OrderStatus::Captured {
                    Err(LedgerError::NotCaptured(order_id.to_string()))
                } else {
                    Err(LedgerError::AlreadyUsed(order_id.to_string()))
                }
            }
            _ => Err(LedgerError::UnknownOrder(order_id.to_string())),
        }
    }

    /// Give a consumed order back after the submission failed upstream
    pub async fn release(&self, order_id: &str) {
        if let Some(mut entry) = self.entries.get(order_id).await {
            entry.consumed = false;
            self.entries.insert(order_id.to_string(), entry).await;
            tracing::info!(order_id = %order_id, "Released payment order for retry");
        }
    }

    async fn set_status(&self, order_id: &str, status: OrderStatus) {
        match self.entries.get(order_id).await {
            Some(mut entry) => {
                entry.order.status = status;
                self.entries.insert(order_id.to_string(), entry).await;
            }
            None => {
                tracing::warn!(order_id = %order_id, ?status, "Status update for an order this server did not create");
            }
        }
    }
}
