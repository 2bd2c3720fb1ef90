// src/lib.rs

use std::sync::Arc;

use config::AppConfig;
use services::{
    artifact_store::{ArtifactStore, StoreError},
    media_generator::MediaGeneratorService,
    orchestrator::JobOrchestrator,
    order_ledger::OrderLedger,
    payment_gate::PaymentGate,
    paypal::{PaymentGateway, PayPalService},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub payments: Arc<dyn PaymentGateway>,
    pub payment_gate: PaymentGate,
    pub store: ArtifactStore,
}

impl AppState {
    /// Wire the real provider clients from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let store = ArtifactStore::new(&config.storage_dir)?;
        let generator = Arc::new(MediaGeneratorService::new(&config.generator));
        let orchestrator = JobOrchestrator::new(generator, Arc::new(store.clone()), config.poll);
        let payment_gate = PaymentGate::new(
            config.payment_gate.clone(),
            OrderLedger::new(config.payment_gate.order_ttl),
        );

        Ok(Self {
            payments: Arc::new(PayPalService::new(&config.paypal)),
            orchestrator: Arc::new(orchestrator),
            payment_gate,
            store,
        })
    }
}

pub mod config;
pub mod error;
pub mod router;

pub mod services {
    pub mod artifact_store;
    pub mod media_generator;
    pub mod orchestrator;
    pub mod order_ledger;
    pub mod payment_gate;
    pub mod paypal;
}

pub mod models {
    pub mod artifact;
    pub mod image;
    pub mod job;
    pub mod payment;
    pub mod video;
}

pub mod handlers {
    pub mod artifacts;
    pub mod health;
    pub mod image;
    pub mod payment;
    pub mod upload;
    pub mod video;
}
