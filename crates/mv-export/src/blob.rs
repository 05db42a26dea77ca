//! Blob stream store: the read side of the export pipeline.
//!
//! A [`BlobStore`] hands out byte streams for catalog content by key and
//! kind. Two implementations ship: [`LocalDiskStore`] reads from a directory
//! tree and [`ObjectStore`] fetches over HTTP from an object-store bucket.
//! The engine picks one at wiring time via [`build_blob_store`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mv_core::config::{StorageBackend, StorageConfig};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which family of content a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Video,
    Preview,
    Thumbnail,
}

impl BlobKind {
    /// Directory (or key prefix) the kind lives under.
    pub fn dir(&self) -> &'static str {
        match self {
            BlobKind::Video => "videos",
            BlobKind::Preview => "previews",
            BlobKind::Thumbnail => "thumbnails",
        }
    }

    /// Extension used when neither the file name nor the mime type tell us.
    pub fn default_extension(&self) -> &'static str {
        match self {
            BlobKind::Video | BlobKind::Preview => "mp4",
            BlobKind::Thumbnail => "jpg",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// Metadata reported alongside a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMeta {
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

impl BlobMeta {
    /// Archive file extension for this blob, lowercase and without a dot.
    pub fn extension(&self, kind: BlobKind) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase);

        from_name
            .or_else(|| {
                self.mime_type
                    .as_deref()
                    .and_then(extension_for_mime)
                    .map(String::from)
            })
            .unwrap_or_else(|| kind.default_extension().to_string())
    }
}

/// An open content stream.
pub struct BlobStream {
    pub meta: BlobMeta,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStream")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Errors raised by a [`BlobStore`].
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("{kind} blob not found: {key}")]
    NotFound { kind: BlobKind, key: String },

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob http error: {0}")]
    Http(String),

    #[error("invalid object store url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for BlobError {
    fn from(e: reqwest::Error) -> Self {
        BlobError::Http(e.to_string())
    }
}

/// Source of content streams.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Open the blob stored under `key`.
    async fn get_stream(&self, key: &str, kind: BlobKind) -> Result<BlobStream, BlobError>;
}

/// Reject keys that could escape the store root.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty());
    if bad {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        "video/x-matroska" => Some("mkv"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// LocalDiskStore
// ---------------------------------------------------------------------------

/// Reads blobs from `<root>/<kind-dir>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str, kind: BlobKind) -> PathBuf {
        self.root.join(kind.dir()).join(key)
    }
}

#[async_trait]
impl BlobStore for LocalDiskStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_stream(&self, key: &str, kind: BlobKind) -> Result<BlobStream, BlobError> {
        validate_key(key)?;
        let path = self.path_for(key, kind);

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound {
                    kind,
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .map(String::from);

        Ok(BlobStream {
            meta: BlobMeta {
                size_bytes: Some(size),
                mime_type,
                file_name,
            },
            reader: Box::pin(file),
        })
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Fetches blobs with `GET {base_url}/{kind-dir}/{key}`.
///
/// Key segments are percent-encoded. `timeout` bounds both connecting and
/// each individual body read, so a stalled bucket surfaces as a read error.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ObjectStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BlobError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| BlobError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BlobError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, key: &str, kind: BlobKind) -> Result<reqwest::Url, BlobError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BlobError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(kind.dir())
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for ObjectStore {
    fn name(&self) -> &'static str {
        "object"
    }

    async fn get_stream(&self, key: &str, kind: BlobKind) -> Result<BlobStream, BlobError> {
        validate_key(key)?;
        let url = self.url_for(key, kind)?;

        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound {
                kind,
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(BlobError::Http(format!("GET {url} returned {status}")));
        }

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let meta = BlobMeta {
            size_bytes: resp.content_length(),
            mime_type,
            file_name: key.rsplit('/').next().map(String::from),
        };

        let body = resp.bytes_stream().map_err(std::io::Error::other);

        Ok(BlobStream {
            meta,
            reader: Box::pin(StreamReader::new(body)),
        })
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build the configured store.
pub fn build_blob_store(config: &StorageConfig) -> mv_core::Result<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalDiskStore::new(&config.local_root))),
        StorageBackend::Object => {
            let base = config
                .object_base_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    mv_core::Error::Validation(
                        "storage.object_base_url is required for the object backend".into(),
                    )
                })?;
            let store = ObjectStore::new(base, Duration::from_secs(config.object_timeout_secs))
                .map_err(|e| mv_core::Error::Internal(e.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn key_validation() {
        assert!(validate_key("set/track-1.mp4").is_ok());
        assert!(validate_key("track.mp4").is_ok());
        for bad in ["", "/etc/passwd", "../secret", "a/../b", "a//b", "a\\b", "./a"] {
            assert!(validate_key(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn extension_prefers_file_name() {
        let meta = BlobMeta {
            size_bytes: None,
            mime_type: Some("video/webm".into()),
            file_name: Some("clip.MOV".into()),
        };
        assert_eq!(meta.extension(BlobKind::Video), "mov");
    }

    #[test]
    fn extension_falls_back_to_mime_then_default() {
        let meta = BlobMeta {
            size_bytes: None,
            mime_type: Some("image/png; charset=binary".into()),
            file_name: Some("no-extension".into()),
        };
        assert_eq!(meta.extension(BlobKind::Thumbnail), "png");
        assert_eq!(BlobMeta::default().extension(BlobKind::Thumbnail), "jpg");
        assert_eq!(BlobMeta::default().extension(BlobKind::Video), "mp4");
    }

    #[tokio::test]
    async fn local_store_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("videos")).unwrap();
        std::fs::write(dir.path().join("videos/a.mp4"), b"video-bytes").unwrap();

        let store = LocalDiskStore::new(dir.path());
        let mut stream = store.get_stream("a.mp4", BlobKind::Video).await.unwrap();
        assert_eq!(stream.meta.size_bytes, Some(11));
        assert_eq!(stream.meta.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(stream.meta.file_name.as_deref(), Some("a.mp4"));

        let mut buf = Vec::new();
        stream.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"video-bytes");
    }

    #[tokio::test]
    async fn local_store_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path());
        let err = store.get_stream("nope.jpg", BlobKind::Thumbnail).await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { kind: BlobKind::Thumbnail, .. }));
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path());
        let err = store.get_stream("../x.mp4", BlobKind::Video).await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidKey(_)));
    }

    #[test]
    fn object_backend_requires_url() {
        let config = StorageConfig {
            backend: StorageBackend::Object,
            ..StorageConfig::default()
        };
        assert!(build_blob_store(&config).is_err());

        let config = StorageConfig {
            backend: StorageBackend::Object,
            object_base_url: Some("https://cdn.example.com/media/".into()),
            ..StorageConfig::default()
        };
        let store = build_blob_store(&config).unwrap();
        assert_eq!(store.name(), "object");
    }

    /// Serve a tiny bucket on a random local port.
    async fn bucket() -> String {
        use axum::http::{header, StatusCode};
        use axum::routing::get;

        let app = axum::Router::new()
            .route(
                "/media/videos/set/a.webm",
                get(|| async { ([(header::CONTENT_TYPE, "video/webm")], "remote-video") }),
            )
            .route(
                "/media/thumbnails/broken.jpg",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}/media")
    }

    #[tokio::test]
    async fn object_store_streams_body() {
        let store = ObjectStore::new(&bucket().await, Duration::from_secs(5)).unwrap();
        let mut stream = store.get_stream("set/a.webm", BlobKind::Video).await.unwrap();
        assert_eq!(stream.meta.mime_type.as_deref(), Some("video/webm"));
        assert_eq!(stream.meta.file_name.as_deref(), Some("a.webm"));
        assert_eq!(stream.meta.extension(BlobKind::Video), "webm");

        let mut buf = Vec::new();
        stream.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"remote-video");
    }

    #[tokio::test]
    async fn object_store_maps_statuses() {
        let store = ObjectStore::new(&bucket().await, Duration::from_secs(5)).unwrap();
        let err = store.get_stream("missing.mp4", BlobKind::Video).await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { .. }));
        let err = store.get_stream("broken.jpg", BlobKind::Thumbnail).await.unwrap_err();
        assert!(matches!(err, BlobError::Http(_)));
    }

    #[test]
    fn object_url_layout() {
        let store = ObjectStore::new("https://cdn.example.com/media/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.url_for("k/v.mp4", BlobKind::Video).unwrap().as_str(),
            "https://cdn.example.com/media/videos/k/v.mp4"
        );
        let store = ObjectStore::new("https://cdn.example.com/media", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.url_for("v.mp4", BlobKind::Thumbnail).unwrap().as_str(),
            "https://cdn.example.com/media/thumbnails/v.mp4"
        );
    }

    #[test]
    fn object_url_encodes_reserved_characters() {
        let store = ObjectStore::new("https://cdn.example.com/media/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.url_for("set/a#1?x=2 b.mp4", BlobKind::Video).unwrap().as_str(),
            "https://cdn.example.com/media/videos/set/a%231%3Fx=2%20b.mp4"
        );
    }

    #[test]
    fn object_store_rejects_bad_base_url() {
        for bad in ["not a url", "mailto:media@example.com"] {
            assert!(matches!(
                ObjectStore::new(bad, Duration::from_secs(5)),
                Err(BlobError::InvalidUrl(_))
            ));
        }
    }
}
