//! SQLite connection pooling.
//!
//! Credit reservations are claimed with `BEGIN IMMEDIATE`, so concurrent
//! exports contend on the database write lock. Every connection therefore
//! waits up to [`BUSY_TIMEOUT_MS`] for the lock instead of failing with
//! `SQLITE_BUSY`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mv_core::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// How long a connection waits on the write lock.
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

const FILE_POOL_SIZE: u32 = 8;
const MEMORY_POOL_SIZE: u32 = 4;

fn configure(conn: &mut Connection, wal: bool) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    if wal {
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    }
    Ok(())
}

/// Build a pool over `manager` and bring its schema up to date.
fn open(manager: SqliteConnectionManager, max_size: u32, what: &str) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create {what} pool: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    tracing::debug!(what, max_size, "Database pool ready");

    Ok(pool)
}

/// Open (creating if needed) the database file at `db_path`.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager =
        SqliteConnectionManager::file(db_path).with_init(|conn| configure(conn, true));
    open(manager, FILE_POOL_SIZE, "file")
}

/// Open a private in-memory database.
///
/// Each call gets its own shared-cache database, so parallel tests stay
/// isolated while connections of one pool see the same data.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let uri = format!(
        "file:mixvault_{}?mode=memory&cache=shared",
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    let manager = SqliteConnectionManager::file(uri).with_init(|conn| configure(conn, false));
    open(manager, MEMORY_POOL_SIZE, "in-memory")
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}
