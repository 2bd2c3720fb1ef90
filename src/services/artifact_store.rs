//! Local artifact store
//!
//! Downloads remote media into the public storage directory and hands back
//! the path it is served under. File names are unique per call
//! (`<prefix>_<unix millis>_<8 hex>.<ext>`) and existing files are never
//! overwritten: bytes land in a hidden `.part` file first and are linked
//! into place only once complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use moka::future::Cache;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::PUBLIC_PREFIX;
use crate::models::artifact::{ArtifactEntry, ArtifactKind, LocalArtifact};
use crate::models::job::truncate;

/// How long the public path -> source URL mapping is remembered
const SOURCE_INDEX_TTL_SECS: u64 = 24 * 3600;
const SOURCE_INDEX_CAPACITY: u64 = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("Download of {url} returned status {status}")]
    DownloadStatus { url: String, status: u16 },
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),
    #[error("Artifact not found: {0}")]
    NotFound(String),
}

/// Somewhere downloaded results can be persisted
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Download `source_url` and store it as a new `<prefix>_...` file
    async fn save(
        &self,
        source_url: &str,
        kind: ArtifactKind,
        prefix: &str,
    ) -> Result<LocalArtifact, StoreError>;

    async fn save_image(&self, source_url: &str, prefix: &str) -> Result<LocalArtifact, StoreError> {
        self.save(source_url, ArtifactKind::Image, prefix).await
    }

    async fn save_video(&self, source_url: &str, prefix: &str) -> Result<LocalArtifact, StoreError> {
        self.save(source_url, ArtifactKind::Video, prefix).await
    }
}

#[derive(Clone)]
pub struct ArtifactStore {
    client: Client,
    root: PathBuf,
    sources: Arc<Cache<String, String>>,
}

impl ArtifactStore {
    /// Open the store, creating the storage directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.exists() {
            tracing::info!("Creating storage directory: {}", root.display());
            std::fs::create_dir_all(&root)?;
        }
        sweep_partial_files(&root)?;

        let sources = Cache::builder()
            .max_capacity(SOURCE_INDEX_CAPACITY)
            .time_to_live(Duration::from_secs(SOURCE_INDEX_TTL_SECS))
            .build();

        Ok(Self {
            client: Client::new(),
            root,
            sources: Arc::new(sources),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an uploaded image under a fresh `uploaded_...` name.
    ///
    /// The stored extension is always an image extension, so the file is
    /// served back with an image content type whatever the client named it.
    pub async fn save_upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
        content_type: &str,
    ) -> Result<LocalArtifact, StoreError> {
        let ext = upload_extension(original_filename, content_type);
        let filename = unique_filename("uploaded", &ext);

        let (part, mut file) = PartFile::create(self.part_path(&filename)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        part.publish(&self.root.join(&filename)).await?;

        tracing::info!(size = bytes.len(), "Upload saved as {}", filename);

        Ok(LocalArtifact {
            public_path: public_path(&filename),
            source_url: None,
            kind: ArtifactKind::Image,
        })
    }

    /// Remote URL a downloaded artifact came from, if this process saved it
    pub async fn source_url_for(&self, public_path: &str) -> Option<String> {
        self.sources.get(public_path).await
    }

    /// Read a stored image and return it as a `data:` URL
    pub async fn inline_data_url(&self, public_path: &str) -> Result<String, StoreError> {
        let path = self.resolve(public_path)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(public_path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mime = mime_for(public_path);
        Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
    }

    /// Map a `/generated/<file>` path to the file on disk. Anything that is not
    /// a single plain file name under the prefix is rejected.
    pub fn resolve(&self, public_path: &str) -> Result<PathBuf, StoreError> {
        let invalid = || StoreError::InvalidPath(public_path.to_string());

        let filename = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;

        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(invalid());
        }

        Ok(self.root.join(filename))
    }

    /// Everything in the storage directory that looks like media, newest first
    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if filename.starts_with('.') {
                continue;
            }
            let Some(kind) = ArtifactKind::from_filename(&filename) else {
                continue;
            };

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let created_at: DateTime<Utc> = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(ArtifactEntry {
                public_path: public_path(&filename),
                filename,
                kind,
                created_at,
            });
        }

        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(entries)
    }

    /// File names of stored images only
    pub async fn list_image_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_artifacts()
            .await?
            .into_iter()
            .filter(|a| a.kind == ArtifactKind::Image)
            .map(|a| a.filename)
            .collect())
    }

    fn part_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!(".{}.part", filename))
    }
}

#[async_trait]
impl ArtifactSink for ArtifactStore {
    async fn save(
        &self,
        source_url: &str,
        kind: ArtifactKind,
        prefix: &str,
    ) -> Result<LocalArtifact, StoreError> {
        tracing::info!("Downloading {:?} from: {}", kind, truncate(source_url, 50));

        let response = self.client.get(source_url).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::DownloadStatus {
                url: truncate(source_url, 50),
                status: response.status().as_u16(),
            });
        }

        let filename = unique_filename(prefix, kind.default_extension());
        let (part, mut file) = PartFile::create(self.part_path(&filename)).await?;

        let mut stream = response.bytes_stream();
        let mut size = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tracing::debug!(size, "Download complete");

        part.publish(&self.root.join(&filename)).await?;

        let public = public_path(&filename);
        self.sources
            .insert(public.clone(), source_url.to_string())
            .await;

        tracing::info!("Saved {:?}, public path: {}", kind, public);

        Ok(LocalArtifact {
            public_path: public,
            source_url: Some(source_url.to_string()),
            kind,
        })
    }
}

/// Hidden in-progress file. Removed on drop, including when the saving
/// future is cancelled mid-download.
struct PartFile {
    path: PathBuf,
}

impl PartFile {
    /// Create the file, failing if it already exists
    async fn create(path: PathBuf) -> Result<(Self, fs::File), StoreError> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((Self { path }, file))
    }

    /// Link the completed file to its public name. `hard_link` refuses to
    /// replace an existing file.
    async fn publish(self, target: &Path) -> Result<(), StoreError> {
        fs::hard_link(&self.path, target).await?;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_partial_file(filename: &str) -> bool {
    filename.starts_with('.') && filename.ends_with(".part")
}

/// Remove `.part` files left behind by a process that died mid-write
fn sweep_partial_files(root: &Path) -> Result<(), StoreError> {
    let mut removed = 0usize;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if is_partial_file(&entry.file_name().to_string_lossy()) {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(removed, "Removed partial files from storage directory");
    }
    Ok(())
}

fn public_path(filename: &str) -> String {
    format!("{}/{}", PUBLIC_PREFIX, filename)
}

fn unique_filename(prefix: &str, ext: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        prefix,
        Utc::now().timestamp_millis(),
        &suffix[..8],
        ext
    )
}

/// Extension for an uploaded file: the client's own only when it names an
/// image type, else one derived from the declared content type
fn upload_extension(original_filename: &str, content_type: &str) -> String {
    match ArtifactKind::from_filename(original_filename) {
        Some(ArtifactKind::Image) => original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "png".to_string()),
        _ => extension_for_mime(content_type).to_string(),
    }
}

fn extension_for_mime(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serve fixed bytes at `/media` on a local port
    async fn serve_media(body: &'static [u8]) -> String {
        let router = axum::Router::new().route("/media", axum::routing::get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_repeated_downloads_get_fresh_names() {
        let base = serve_media(b"MEDIA").await;
        let url = format!("{}/media", base);
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let first = store.save_video(&url, "video").await.unwrap();
        let second = store.save_video(&url, "video").await.unwrap();

        assert_ne!(first.public_path, second.public_path);
        assert!(first.public_path.starts_with("/generated/video_"));
        assert!(first.public_path.ends_with(".mp4"));
        assert_eq!(store.source_url_for(&first.public_path).await, Some(url.clone()));

        let on_disk = std::fs::read(store.resolve(&second.public_path).unwrap()).unwrap();
        assert_eq!(on_disk, b"MEDIA");

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with('.'))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_download_error_status_writes_nothing() {
        let base = serve_media(b"MEDIA").await;
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let result = store.save_image(&format!("{}/missing.png", base), "image").await;
        assert!(matches!(result, Err(StoreError::DownloadStatus { status: 404, .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unique_filename_shape() {
        let a = unique_filename("image", "png");
        let b = unique_filename("image", "png");

        assert_ne!(a, b);
        assert!(a.starts_with("image_"));
        assert!(a.ends_with(".png"));
        assert_eq!(a.split('_').count(), 3);
    }

    #[test]
    fn test_upload_extension_is_always_an_image_type() {
        assert_eq!(upload_extension("cat.JPG", "image/jpeg"), "jpg");
        assert_eq!(upload_extension("cat", "image/png"), "png");
        assert_eq!(upload_extension("evil.p/ng", "image/png"), "png");
        assert_eq!(upload_extension("trailing.", "image/gif"), "gif");
        assert_eq!(upload_extension("x.html", "image/png"), "png");
        assert_eq!(upload_extension("x.svg", "image/svg+xml"), "png");
        assert_eq!(upload_extension("clip.mp4", "image/webp; charset=binary"), "webp");
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_no_partial_file() {
        use futures_util::stream;

        // One chunk, then the body never finishes
        let router = axum::Router::new().route(
            "/stalled",
            axum::routing::get(|| async {
                let chunks = stream::iter([Ok::<_, std::io::Error>(axum::body::Bytes::from_static(b"FIRST"))])
                    .chain(stream::pending());
                axum::body::Body::from_stream(chunks)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let url = format!("http://{}/stalled", addr);

        let result = tokio::time::timeout(
            Duration::from_millis(300),
            store.save_video(&url, "video"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_open_sweeps_leftover_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".video_1_aaaaaaaa.mp4.part"), b"partial").unwrap();
        std::fs::write(dir.path().join("video_2_bbbbbbbb.mp4"), b"done").unwrap();

        ArtifactStore::new(dir.path()).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["video_2_bbbbbbbb.mp4".to_string()]);
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        assert!(store.resolve("/generated/image_1.png").is_ok());
        assert!(store.resolve("/generated/../secret.png").is_err());
        assert!(store.resolve("/generated/.hidden.part").is_err());
        assert!(store.resolve("/elsewhere/image_1.png").is_err());
        assert!(store.resolve("/generated/").is_err());
        assert!(store.resolve("/generatedimage.png").is_err());
    }

    #[tokio::test]
    async fn test_uploads_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let first = store.save_upload(b"one", "cat.png", "image/png").await.unwrap();
        let second = store.save_upload(b"one", "cat.png", "image/png").await.unwrap();

        assert_ne!(first.public_path, second.public_path);
        assert!(first.public_path.starts_with("/generated/uploaded_"));
        assert!(first.source_url.is_none());

        let on_disk = std::fs::read(store.resolve(&first.public_path).unwrap()).unwrap();
        assert_eq!(on_disk, b"one");
    }

    #[tokio::test]
    async fn test_list_skips_partial_and_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("image_1_aaaaaaaa.png"), b"png").unwrap();
        std::fs::write(dir.path().join("video_1_bbbbbbbb.mp4"), b"mp4").unwrap();
        std::fs::write(dir.path().join(".video_2_cccccccc.mp4.part"), b"partial").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();

        let artifacts = store.list_artifacts().await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.iter().any(|a| a.kind == ArtifactKind::Video));

        let images = store.list_image_names().await.unwrap();
        assert_eq!(images, vec!["image_1_aaaaaaaa.png".to_string()]);
    }

    #[tokio::test]
    async fn test_inline_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("uploaded_1_aaaaaaaa.jpg"), b"abc").unwrap();

        let data = store
            .inline_data_url("/generated/uploaded_1_aaaaaaaa.jpg")
            .await
            .unwrap();
        assert_eq!(data, "data:image/jpeg;base64,YWJj");

        let missing = store.inline_data_url("/generated/nope.png").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
