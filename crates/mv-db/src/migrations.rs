//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use mv_core::{Error, Result};

/// V1: initial schema -- users, tokens and the catalog snapshot.
const V1_INITIAL: &str = r#"
-- Users and auth
CREATE TABLE users (
    id         TEXT PRIMARY KEY,
    username   TEXT UNIQUE NOT NULL,
    role       TEXT NOT NULL DEFAULT 'member',
    created_at TEXT NOT NULL
);

CREATE TABLE auth_tokens (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token      TEXT UNIQUE NOT NULL,
    expires_at TEXT NOT NULL
);

-- Catalog videos (read-only from the export engine's point of view)
CREATE TABLE videos (
    id            INTEGER PRIMARY KEY,
    title         TEXT NOT NULL,
    description   TEXT,
    duration_secs REAL NOT NULL DEFAULT 0.0,
    content_key   TEXT NOT NULL,
    thumbnail_key TEXT,
    is_premium    INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE INDEX idx_auth_tokens_user ON auth_tokens(user_id);
"#;

/// V2: entitlements, held reservations and download history.
const V2_ENTITLEMENTS: &str = r#"
CREATE TABLE entitlements (
    user_id             TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    membership_id       TEXT,
    membership_end_date TEXT,
    download_limit      INTEGER NOT NULL DEFAULT 0,
    downloads_used      INTEGER NOT NULL DEFAULT 0,
    downloads_reserved  INTEGER NOT NULL DEFAULT 0,
    updated_at          TEXT NOT NULL,
    CHECK (downloads_used >= 0 AND downloads_reserved >= 0)
);

CREATE TABLE credit_reservations (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    credits    INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE download_history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    video_id      INTEGER NOT NULL,
    export_name   TEXT NOT NULL,
    downloaded_at TEXT NOT NULL
);

CREATE INDEX idx_reservations_user ON credit_reservations(user_id);
CREATE INDEX idx_download_history_user ON download_history(user_id);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_ENTITLEMENTS)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit()
            .map_err(|e| Error::database(format!("Migration V{version} commit failed: {e}")))?;

        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}
