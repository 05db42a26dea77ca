//! Rust structs mapping to database tables.
//!
//! Local models implement `from_row`. Catalog videos and entitlements map
//! straight onto the `mv_core` domain types through free row mappers.

use chrono::{DateTime, Utc};
use mv_core::{Entitlement, ReservationId, SessionId, UserId, VideoAsset, VideoId};
use rusqlite::types::Type;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
    Ok(T::from(uuid))
}

fn parse_opt_datetime(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let dt = DateTime::parse_from_rfc3339(&v)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
            Ok(Some(dt.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: String,
    pub created_at: String,
}

impl User {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            username: row.get(1)?,
            role: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: String,
}

impl AuthToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            token: row.get(2)?,
            expires_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// CreditReservation
// ---------------------------------------------------------------------------

/// Credits held for one in-flight export.
#[derive(Debug, Clone)]
pub struct CreditReservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub credits: u32,
    pub created_at: String,
}

impl CreditReservation {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            credits: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// DownloadRecord
// ---------------------------------------------------------------------------

/// One credit spent on one video inside a completed export.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub id: i64,
    pub user_id: UserId,
    pub video_id: VideoId,
    pub export_name: String,
    pub downloaded_at: String,
}

impl DownloadRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: parse_id(row, 1)?,
            video_id: VideoId(row.get(2)?),
            export_name: row.get(3)?,
            downloaded_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Domain row mappers
// ---------------------------------------------------------------------------

/// Map a `videos` row (`id, title, description, duration_secs, content_key,
/// thumbnail_key, is_premium`) onto a [`VideoAsset`].
pub fn video_from_row(row: &rusqlite::Row) -> rusqlite::Result<VideoAsset> {
    Ok(VideoAsset {
        id: VideoId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        duration_secs: row.get(3)?,
        content_key: row.get(4)?,
        thumbnail_key: row.get(5)?,
        is_premium: row.get(6)?,
    })
}

/// Map an `entitlements` row onto an [`Entitlement`].
pub fn entitlement_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entitlement> {
    Ok(Entitlement {
        user_id: parse_id(row, 0)?,
        membership_id: row.get(1)?,
        membership_end_date: parse_opt_datetime(row, 2)?,
        download_limit: row.get(3)?,
        downloads_used: row.get(4)?,
        downloads_reserved: row.get(5)?,
    })
}
