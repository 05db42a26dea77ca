//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, auth, blob storage and exports. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        match self.storage.backend {
            StorageBackend::Local => {
                if !self.storage.local_root.exists() {
                    warnings.push(format!(
                        "storage.local_root {} does not exist",
                        self.storage.local_root.display()
                    ));
                }
            }
            StorageBackend::Object => match self.storage.object_base_url.as_deref() {
                None | Some("") => {
                    warnings.push(
                        "storage.backend is 'object' but object_base_url is not set".into(),
                    );
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    warnings.push(format!(
                        "storage.object_base_url '{url}' is not an http(s) URL"
                    ));
                }
                Some(_) => {}
            },
        }

        if self.export.prefetch == 0 {
            warnings.push("export.prefetch is 0; streams will be opened one at a time".into());
        }

        if self.export.buffer_size < 4 * 1024 {
            warnings.push(format!(
                "export.buffer_size {} is very small; copies will be slow",
                self.export.buffer_size
            ));
        }

        if self.export.artifact_ttl_secs == 0 {
            warnings.push("export.artifact_ttl_secs is 0; artifacts are never swept".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/mixvault.db"),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of tokens issued from the CLI.
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24 * 30,
        }
    }
}

/// Which blob store implementation to wire at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Object,
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory holding `videos/`, `previews/` and `thumbnails/`.
    pub local_root: PathBuf,
    /// Base URL of the object store bucket (e.g. `https://cdn.example.com/media`).
    pub object_base_url: Option<String>,
    #[serde(default = "default_object_timeout")]
    pub object_timeout_secs: u64,
}

fn default_object_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: PathBuf::from("./data/media"),
            object_base_url: None,
            object_timeout_secs: default_object_timeout(),
        }
    }
}

/// Export engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Scoped directory for finished and in-progress artifacts.
    pub temp_dir: PathBuf,
    /// Artifacts older than this are deleted by the sweeper.
    pub artifact_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Chunk size used when piping sources into the archive.
    pub buffer_size: usize,
    /// Number of source streams opened ahead of the archive writer.
    pub prefetch: usize,
    /// Upper bound on `videoIds` per request.
    pub max_tracks: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./data/exports"),
            artifact_ttl_secs: 60 * 60,
            sweep_interval_secs: 5 * 60,
            buffer_size: 64 * 1024,
            prefetch: 1,
            max_tracks: 100,
        }
    }
}
