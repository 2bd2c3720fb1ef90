use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::PUBLIC_PREFIX;
use crate::handlers::{artifacts, health, image, payment, upload, video};
use crate::AppState;

/// Largest accepted request body. Covers a 5MB upload plus multipart
/// overhead, and inline base64 images sent to /api/generate-video.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let storage_root = state.store.root().to_path_buf();

    Router::new()
        .route("/health", get(health::health))
        .route("/api/generate-image", post(image::generate_image))
        .route(
            "/api/generate-video",
            post(video::generate_video).get(video::get_video_status),
        )
        .route("/api/upload", post(upload::upload_image))
        .route("/api/list-images", get(artifacts::list_images))
        .route("/api/artifacts", get(artifacts::list_artifacts))
        .route("/api/paypal/create-order", post(payment::create_order))
        .route("/api/paypal/capture", get(payment::capture_payment))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(storage_root))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
