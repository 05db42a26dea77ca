//! Export artifact lifecycle: creation, download, disposal and retention.
//!
//! Archives are built as `<name>.zip.partial` inside the scoped export
//! directory and renamed to `<name>.zip` only once the build closure
//! returns successfully, so a visible artifact is always complete. A
//! failed build removes its partial file. Finished artifacts stay until they
//! are disposed explicitly or age out past the retention TTL.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use mv_core::{Error, ExportArtifact, Result};
use uuid::Uuid;

const ARTIFACT_SUFFIX: &str = ".zip";
const PARTIAL_SUFFIX: &str = ".partial";

/// Route prefix under which artifacts are downloadable.
pub const DOWNLOAD_PREFIX: &str = "/api/exports";

/// Result of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub artifacts_removed: usize,
    pub partials_removed: usize,
}

/// Collision-free artifact name: `<slug>-<12 hex chars>.zip`.
pub fn artifact_name(slug: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{slug}-{}{ARTIFACT_SUFFIX}", &suffix[..12])
}

/// Artifact names are plain file names we generated ourselves.
fn validate_name(file_name: &str) -> Result<()> {
    let ok = file_name.ends_with(ARTIFACT_SUFFIX)
        && file_name.len() > ARTIFACT_SUFFIX.len()
        && !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !file_name.contains("..");
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid artifact name: {file_name}")))
    }
}

/// Scoped directory holding export artifacts.
#[derive(Debug, Clone)]
pub struct ExportStore {
    dir: PathBuf,
    ttl: Duration,
}

impl ExportStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the export directory if needed. Safe to call repeatedly.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Absolute path of a finished artifact.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        validate_name(file_name)?;
        Ok(self.dir.join(file_name))
    }

    /// Build a new artifact.
    ///
    /// `build` receives the freshly created partial file and must finish
    /// writing before it resolves. On success the file is published under
    /// its final name; on failure it is removed.
    pub async fn finalize<T, F, Fut>(&self, slug: &str, build: F) -> Result<(ExportArtifact, T)>
    where
        F: FnOnce(std::fs::File) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_dir().await?;

        let file_name = artifact_name(slug);
        let final_path = self.dir.join(&file_name);
        let partial_path = self.dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .await?
            .into_std()
            .await;

        let value = match build(file).await {
            Ok(value) => value,
            Err(e) => {
                remove_quietly(&partial_path).await;
                tracing::debug!(file_name = %file_name, "Discarded partial artifact");
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            remove_quietly(&partial_path).await;
            return Err(e.into());
        }
        let size_bytes = tokio::fs::metadata(&final_path).await?.len();

        tracing::info!(file_name = %file_name, size_bytes, "Export artifact ready");

        let artifact = ExportArtifact {
            download_path: format!("{DOWNLOAD_PREFIX}/{file_name}"),
            file_name,
            temp_file_path: final_path,
            size_bytes,
        };
        Ok((artifact, value))
    }

    /// Open a finished artifact for streaming. Returns the file and its size.
    pub async fn open_for_download(&self, file_name: &str) -> Result<(tokio::fs::File, u64)> {
        let path = self
            .path_for(file_name)
            .map_err(|_| Error::ArtifactNotFound(file_name.to_string()))?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ArtifactNotFound(file_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    /// Delete an artifact. Missing artifacts are not an error; returns whether
    /// a file was removed.
    pub async fn dispose(&self, file_name: &str) -> Result<bool> {
        let path = self.path_for(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(file_name, "Disposed export artifact");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete artifacts and stale partial files older than the TTL.
    ///
    /// A zero TTL disables retention.
    pub async fn sweep_expired(&self, now: SystemTime) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        if self.ttl.is_zero() {
            return Ok(stats);
        }

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let partial = name.ends_with(&format!("{ARTIFACT_SUFFIX}{PARTIAL_SUFFIX}"));
            if !partial && !name.ends_with(ARTIFACT_SUFFIX) {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < self.ttl {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) if partial => stats.partials_removed += 1,
                Ok(()) => stats.artifacts_removed += 1,
                Err(e) => {
                    tracing::warn!(file_name = %name, error = %e, "Failed to sweep artifact");
                }
            }
        }

        if stats != SweepStats::default() {
            tracing::info!(
                artifacts = stats.artifacts_removed,
                partials = stats.partials_removed,
                "Swept expired exports"
            );
        }
        Ok(stats)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial artifact");
        }
    }
}
