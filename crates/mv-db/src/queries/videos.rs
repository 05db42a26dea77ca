//! Catalog video snapshot queries.

use std::collections::HashMap;

use chrono::Utc;
use mv_core::{Error, Result, VideoAsset, VideoId};
use rusqlite::Connection;

use crate::models::video_from_row;

const COLS: &str = "id, title, description, duration_secs, content_key, thumbnail_key, is_premium";

/// Insert or replace a catalog video.
pub fn upsert_video(conn: &Connection, video: &VideoAsset) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO videos (id, title, description, duration_secs, content_key,
                             thumbnail_key, is_premium, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             description = excluded.description,
             duration_secs = excluded.duration_secs,
             content_key = excluded.content_key,
             thumbnail_key = excluded.thumbnail_key,
             is_premium = excluded.is_premium",
        rusqlite::params![
            video.id.0,
            video.title,
            video.description,
            video.duration_secs,
            video.content_key,
            video.thumbnail_key,
            video.is_premium,
            now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get a single video by ID.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<VideoAsset>> {
    let q = format!("SELECT {COLS} FROM videos WHERE id = ?1");
    match conn.query_row(&q, [id.0], video_from_row) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Load every known video among `ids`, keyed by ID.
///
/// Unknown IDs are simply absent from the map; ordering is left to the caller.
pub fn get_videos_by_ids(conn: &Connection, ids: &[VideoId]) -> Result<HashMap<VideoId, VideoAsset>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; ids.len()].join(",");
    let q = format!("SELECT {COLS} FROM videos WHERE id IN ({placeholders})");

    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter().map(|id| id.0)), video_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows.into_iter().map(|v| (v.id, v)).collect())
}

/// List the catalog ordered by ID.
pub fn list_videos(conn: &Connection) -> Result<Vec<VideoAsset>> {
    let q = format!("SELECT {COLS} FROM videos ORDER BY id ASC");
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], video_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
