//! Animate one image from the command line.
//!
//! Submits a video job straight to the generation provider, polls it until
//! it finishes and saves the result into the storage directory. Ctrl-C
//! stops polling. Payment is not involved; this is an operator tool.

use std::env;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use animator_backend::config::AppConfig;
use animator_backend::models::job::{ImageInput, VideoOptions};
use animator_backend::services::artifact_store::ArtifactStore;
use animator_backend::services::media_generator::MediaGeneratorService;
use animator_backend::services::orchestrator::{cancellation, JobOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <image-url-or-file> <prompt> [--audio]", args[0]);
        eprintln!("Example: {} ./fox.png \"the fox starts running\"", args[0]);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,animator_backend=debug".into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let image = image_input(&args[1]).await?;
    let prompt = &args[2];
    let options = VideoOptions {
        with_audio: args.iter().skip(3).any(|a| a == "--audio"),
    };

    let config = AppConfig::from_env();
    let store = ArtifactStore::new(&config.storage_dir)?;
    let orchestrator = JobOrchestrator::new(
        Arc::new(MediaGeneratorService::new(&config.generator)),
        Arc::new(store),
        config.poll,
    );

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    println!("Submitting {} ...", image.log_label());
    let done = orchestrator.run(&image, prompt, &options, signal).await?;

    println!("Video saved: {}", done.video.public_path);
    if let Some(cover) = done.cover {
        println!("Cover saved: {}", cover.public_path);
    }

    Ok(())
}

/// URLs and data URLs pass through; anything else is read as a local file
async fn image_input(arg: &str) -> Result<ImageInput, Box<dyn std::error::Error>> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(ImageInput::Url(arg.to_string()));
    }
    if arg.starts_with("data:") {
        return Ok(ImageInput::Inline(arg.to_string()));
    }

    let bytes = tokio::fs::read(arg).await?;
    let lower = arg.to_ascii_lowercase();
    let mime = if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "image/png"
    };
    Ok(ImageInput::Inline(format!("data:{};base64,{}", mime, BASE64.encode(bytes))))
}
