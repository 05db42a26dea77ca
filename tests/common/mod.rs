//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temp export
//! directory, an in-memory blob store and a full [`AppContext`]. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mv_core::config::Config;
use mv_core::{UserId, VideoAsset, VideoId};
use mv_db::pool::{init_memory_pool, DbPool};
use mv_export::testing::MemoryBlobStore;
use mv_export::BlobKind;
use mv_server::context::AppContext;
use mv_server::router::build_router;
use tempfile::TempDir;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub store: Arc<MemoryBlobStore>,
    pub tmp: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new harness with a custom configuration. The export
    /// directory always points into a fresh temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        config.export.temp_dir = tmp.path().join("exports");
        config.export.buffer_size = 1024;

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let store = Arc::new(MemoryBlobStore::new());
        let ctx = AppContext::new(db.clone(), config, store.clone());

        Self {
            ctx,
            db,
            store,
            tmp,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> mv_db::pool::PooledConnection {
        mv_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Create a user with an optional plan and return its id and a bearer token.
    pub fn seed_user(
        &self,
        username: &str,
        limit: Option<u32>,
        membership: Option<&str>,
    ) -> (UserId, String) {
        let conn = self.conn();
        let user = mv_db::queries::users::create_user(&conn, username, "member").unwrap();
        if let Some(limit) = limit {
            mv_db::queries::entitlements::grant_membership(&conn, user.id, membership, None, limit)
                .unwrap();
        }
        let token = format!("token-{username}");
        let expires = (Utc::now() + Duration::hours(1)).to_rfc3339();
        mv_db::queries::auth::create_token(&conn, user.id, &token, &expires).unwrap();
        (user.id, token)
    }

    /// Add a catalog video and its blobs.
    pub fn add_video(&self, id: i64, title: &str, duration_secs: f64, premium: bool) -> VideoAsset {
        let asset = VideoAsset {
            id: VideoId(id),
            title: title.to_string(),
            description: Some(format!("{title} (live)")),
            duration_secs,
            content_key: format!("video-{id}.mp4"),
            thumbnail_key: Some(format!("thumb-{id}.jpg")),
            is_premium: premium,
        };
        mv_db::queries::videos::upsert_video(&self.conn(), &asset).unwrap();
        self.store.insert(
            BlobKind::Video,
            &asset.content_key,
            vec![b'v'; 4096 + id as usize],
        );
        if let Some(thumb) = &asset.thumbnail_key {
            self.store
                .insert(BlobKind::Thumbnail, thumb, vec![b't'; 512]);
        }
        asset
    }

    /// Files currently present in the export directory.
    pub fn export_files(&self) -> Vec<String> {
        match std::fs::read_dir(self.ctx.engine.artifacts().dir()) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
