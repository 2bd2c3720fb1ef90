#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Response, routing::get, Router};
use http_body_util::BodyExt;
use serde_json::Value;

use animator_backend::config::{PaymentGateConfig, PollConfig};
use animator_backend::models::job::{
    GeneratedImages, GenerationJob, ImageInput, ImageOptions, TaskStatus, VideoOptions,
    VideoOutput, VideoTaskResult,
};
use animator_backend::models::payment::{OrderStatus, PaymentOrder};
use animator_backend::services::artifact_store::ArtifactStore;
use animator_backend::services::media_generator::{GeneratorError, MediaGenerator};
use animator_backend::services::orchestrator::JobOrchestrator;
use animator_backend::services::order_ledger::OrderLedger;
use animator_backend::services::payment_gate::PaymentGate;
use animator_backend::services::paypal::{CaptureResult, PaymentError, PaymentGateway};
use animator_backend::AppState;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{}", addr)
}

/// Stand-in CDN serving the files the stub generator points at
pub async fn spawn_cdn() -> String {
    let router = Router::new()
        .route("/fox.png", get(|| async { b"PNG-BYTES".to_vec() }))
        .route("/fox.mp4", get(|| async { b"MP4-BYTES".to_vec() }))
        .route("/fox-cover.png", get(|| async { b"COVER-BYTES".to_vec() }));
    spawn_server(router).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Files currently in the storage directory, hidden ones included
pub fn stored_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read storage dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Generator that answers from fixed data and counts calls
pub struct StubGenerator {
    pub cdn: String,
    pub status: Mutex<TaskStatus>,
    pub image_calls: AtomicUsize,
    pub video_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub last_image: Mutex<Option<ImageInput>>,
}

impl StubGenerator {
    pub fn new(cdn: &str, status: TaskStatus) -> Self {
        Self {
            cdn: cdn.to_string(),
            status: Mutex::new(status),
            image_calls: AtomicUsize::new(0),
            video_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            last_image: Mutex::new(None),
        }
    }

    pub fn set_status(&self, status: TaskStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
            + self.video_calls.load(Ordering::SeqCst)
            + self.result_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaGenerator for StubGenerator {
    async fn generate_image(
        &self,
        _prompt: &str,
        _options: &ImageOptions,
    ) -> Result<GeneratedImages, GeneratorError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedImages {
            urls: vec![format!("{}/fox.png", self.cdn)],
            created: 1_700_000_000,
        })
    }

    async fn generate_video(
        &self,
        image: &ImageInput,
        _prompt: &str,
        _options: &VideoOptions,
    ) -> Result<GenerationJob, GeneratorError> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image.lock().unwrap() = Some(image.clone());
        Ok(GenerationJob {
            task_id: "abc123".to_string(),
            request_id: Some("req-abc123".to_string()),
            model: Some("cogvideox-flash".to_string()),
            status: TaskStatus::Processing,
        })
    }

    async fn get_video_result(&self, _task_id: &str) -> Result<VideoTaskResult, GeneratorError> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let status = *self.status.lock().unwrap();
        let videos = if status == TaskStatus::Success {
            vec![VideoOutput {
                url: format!("{}/fox.mp4", self.cdn),
                cover_image_url: Some(format!("{}/fox-cover.png", self.cdn)),
            }]
        } else {
            Vec::new()
        };
        Ok(VideoTaskResult { status, videos })
    }
}

/// Payment provider that approves every order and reports a fixed capture status
pub struct StubPayments {
    pub capture_status: Mutex<String>,
    pub orders: AtomicUsize,
}

impl StubPayments {
    pub fn new(capture_status: &str) -> Self {
        Self {
            capture_status: Mutex::new(capture_status.to_string()),
            orders: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubPayments {
    async fn create_order(&self) -> Result<PaymentOrder, PaymentError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("ORDER{}", n);
        Ok(PaymentOrder {
            approval_url: format!("https://www.sandbox.paypal.com/checkoutnow?token={}", order_id),
            order_id,
            status: OrderStatus::Created,
        })
    }

    async fn capture_payment(&self, order_id: &str) -> Result<CaptureResult, PaymentError> {
        Ok(CaptureResult {
            order_id: order_id.to_string(),
            status: self.capture_status.lock().unwrap().clone(),
        })
    }
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        max_attempts: 5,
        timeout: Duration::from_secs(5),
    }
}

/// App state over a temp storage dir with stubbed providers
pub fn test_state(
    storage: &Path,
    generator: Arc<StubGenerator>,
    payments: Arc<StubPayments>,
    gate: PaymentGateConfig,
) -> AppState {
    let store = ArtifactStore::new(storage).expect("storage dir");
    let orchestrator = JobOrchestrator::new(generator, Arc::new(store.clone()), fast_poll());

    AppState {
        orchestrator: Arc::new(orchestrator),
        payments,
        payment_gate: PaymentGate::new(gate, OrderLedger::new(Duration::from_secs(60))),
        store,
    }
}
