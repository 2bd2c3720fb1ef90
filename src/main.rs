use animator_backend::{config::AppConfig, router::build_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,animator_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        generator = %config.generator.base_url,
        paypal = %config.paypal.base_url,
        poll_interval_secs = config.poll.interval.as_secs(),
        poll_max_attempts = config.poll.max_attempts,
        require_captured_order = config.payment_gate.require_captured_order,
        "Loaded configuration"
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config)?;
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await?;

    Ok(())
}
