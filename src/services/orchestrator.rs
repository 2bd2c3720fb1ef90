//! Job orchestrator
//!
//! Drives one generation job end to end:
//!
//! 1. Validates the prompt and image before anything touches the network
//! 2. Submits the video task to the generator
//! 3. Polls the task at a fixed interval until it reaches a terminal state,
//!    the attempt budget or overall timeout runs out, or the caller cancels
//! 4. Downloads the result into the artifact store, exactly once per task

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::models::artifact::LocalArtifact;
use crate::models::job::{
    is_remote_id, GenerationJob, ImageInput, ImageOptions, TaskStatus, VideoOptions, VideoOutput,
};
use crate::services::artifact_store::{ArtifactSink, StoreError};
use crate::services::media_generator::{GeneratorError, MediaGenerator};

/// Completed tasks are remembered so repeated polls do not download again
const COMPLETED_TTL_SECS: u64 = 3600;
const COMPLETED_CAPACITY: u64 = 1_000;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Storage(Arc<StoreError>),
    #[error("No images generated")]
    NoImages,
    #[error("Task {task_id} reported success without a video")]
    MissingResult { task_id: String },
    #[error("Video generation failed with status {status}")]
    JobFailed { task_id: String, status: TaskStatus },
    #[error("Polling of task {task_id} was cancelled")]
    Cancelled { task_id: String },
    #[error("Task {task_id} did not finish after {attempts} status checks")]
    TimedOut { task_id: String, attempts: u32 },
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::Storage(Arc::new(err))
    }
}

/// Image produced by a prompt and saved locally
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub artifact: LocalArtifact,
    pub original_url: String,
    pub created: i64,
}

/// Downloaded result of a successful video task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedVideo {
    pub task_id: String,
    pub video: LocalArtifact,
    pub cover: Option<LocalArtifact>,
}

/// Result of one status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Completed(CompletedVideo),
    Failed(TaskStatus),
}

/// Sending half of a cancellation pair
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half, handed to [`JobOrchestrator::await_completion`]
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct JobOrchestrator {
    generator: Arc<dyn MediaGenerator>,
    artifacts: Arc<dyn ArtifactSink>,
    poll: PollConfig,
    completed: Cache<String, CompletedVideo>,
}

impl JobOrchestrator {
    pub fn new(
        generator: Arc<dyn MediaGenerator>,
        artifacts: Arc<dyn ArtifactSink>,
        poll: PollConfig,
    ) -> Self {
        let completed = Cache::builder()
            .max_capacity(COMPLETED_CAPACITY)
            .time_to_live(Duration::from_secs(COMPLETED_TTL_SECS))
            .build();

        Self {
            generator,
            artifacts,
            poll,
            completed,
        }
    }

    /// Generate an image from a prompt and save the first result locally
    pub async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<GeneratedImage, OrchestratorError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(OrchestratorError::Validation("Prompt is required".to_string()));
        }

        let generated = self.generator.generate_image(prompt, options).await?;
        let original_url = generated
            .urls
            .into_iter()
            .next()
            .ok_or(OrchestratorError::NoImages)?;

        let artifact = self
            .artifacts
            .save_image(&original_url, "image")
            .await?;

        Ok(GeneratedImage {
            artifact,
            original_url,
            created: generated.created,
        })
    }

    /// Validate and submit a video task. Nothing is sent when validation fails.
    pub async fn submit(
        &self,
        image: Option<&ImageInput>,
        prompt: &str,
        options: &VideoOptions,
    ) -> Result<GenerationJob, OrchestratorError> {
        let prompt = prompt.trim();
        let image = match image {
            Some(image) if !image.is_empty() && !prompt.is_empty() => image,
            _ => {
                return Err(OrchestratorError::Validation(
                    "Image URL and prompt are required".to_string(),
                ));
            }
        };

        let job = self.generator.generate_video(image, prompt, options).await?;
        info!(task_id = %job.task_id, status = %job.status, "Video job submitted");
        Ok(job)
    }

    /// Query a task once. A successful task is downloaded on the first poll
    /// that sees it; later polls return the same artifacts.
    pub async fn poll(&self, task_id: &str) -> Result<PollOutcome, OrchestratorError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(OrchestratorError::Validation("Task ID is required".to_string()));
        }
        if !is_remote_id(task_id) {
            return Err(OrchestratorError::Validation("Invalid task ID".to_string()));
        }

        if let Some(done) = self.completed.get(task_id).await {
            debug!(task_id = %task_id, "Task already completed, returning saved artifacts");
            return Ok(PollOutcome::Completed(done));
        }

        let result = self.generator.get_video_result(task_id).await?;

        if !result.status.is_terminal() {
            return Ok(PollOutcome::Pending);
        }

        match result.status {
            TaskStatus::Success => {
                let output = result.videos.into_iter().next().ok_or_else(|| {
                    OrchestratorError::MissingResult {
                        task_id: task_id.to_string(),
                    }
                })?;

                let done = self
                    .completed
                    .try_get_with(task_id.to_string(), self.download(task_id, output))
                    .await
                    .map_err(OrchestratorError::Storage)?;

                Ok(PollOutcome::Completed(done))
            }
            status => {
                warn!(task_id = %task_id, status = %status, "Video task failed");
                Ok(PollOutcome::Failed(status))
            }
        }
    }

    /// Poll until the task reaches a terminal state.
    ///
    /// Each PROCESSING answer schedules exactly one retry after the fixed
    /// interval. Gives up after `max_attempts` status checks or once the
    /// overall timeout elapses.
    pub async fn await_completion(
        &self,
        task_id: &str,
        mut cancel: CancelSignal,
    ) -> Result<CompletedVideo, OrchestratorError> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut attempts: u32 = 0;

        let cancelled = || OrchestratorError::Cancelled {
            task_id: task_id.to_string(),
        };

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            attempts += 1;
            let timed_out = OrchestratorError::TimedOut {
                task_id: task_id.to_string(),
                attempts,
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = sleep_until(deadline) => return Err(timed_out),
                outcome = self.poll(task_id) => outcome?,
            };

            match outcome {
                PollOutcome::Completed(done) => {
                    info!(task_id = %task_id, attempts, video = %done.video.public_path, "Video job completed");
                    return Ok(done);
                }
                PollOutcome::Failed(status) => {
                    return Err(OrchestratorError::JobFailed {
                        task_id: task_id.to_string(),
                        status,
                    });
                }
                PollOutcome::Pending => {
                    if attempts >= self.poll.max_attempts {
                        warn!(task_id = %task_id, attempts, "Giving up on video task");
                        return Err(timed_out);
                    }

                    debug!(
                        task_id = %task_id,
                        attempt = attempts,
                        retry_in_ms = self.poll.interval.as_millis() as u64,
                        "Video still processing"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = sleep_until(deadline) => return Err(timed_out),
                        _ = sleep(self.poll.interval) => {}
                    }
                }
            }
        }
    }

    /// Submit a job and wait for it
    pub async fn run(
        &self,
        image: &ImageInput,
        prompt: &str,
        options: &VideoOptions,
        cancel: CancelSignal,
    ) -> Result<CompletedVideo, OrchestratorError> {
        let job = self.submit(Some(image), prompt, options).await?;
        self.await_completion(&job.task_id, cancel).await
    }

    async fn download(&self, task_id: &str, output: VideoOutput) -> Result<CompletedVideo, StoreError> {
        info!(task_id = %task_id, "Saving video and cover image");

        let video = self
            .artifacts
            .save_video(&output.url, "video")
            .await?;

        // The video is already on disk; a missing cover must not fail the task
        let cover = match output.cover_image_url.as_deref() {
            Some(url) => match self.artifacts.save_image(url, "cover").await {
                Ok(cover) => Some(cover),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Cover image download failed, continuing without it");
                    None
                }
            },
            None => None,
        };

        Ok(CompletedVideo {
            task_id: task_id.to_string(),
            video,
            cover,
        })
    }
}
