//! Application context shared across route handlers via Axum state.

use std::sync::Arc;

use mv_core::config::Config;
use mv_db::pool::DbPool;
use mv_export::{BlobStore, ExportEngine};

/// Immutable infrastructure handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub engine: ExportEngine,
}

impl AppContext {
    pub fn new(db: DbPool, config: Config, blobs: Arc<dyn BlobStore>) -> Self {
        let engine = ExportEngine::new(db.clone(), blobs, &config.export);
        Self {
            db,
            config: Arc::new(config),
            engine,
        }
    }
}
