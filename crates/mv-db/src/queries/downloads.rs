//! Download history queries.

use mv_core::{Error, Result, UserId};
use rusqlite::Connection;

use crate::models::DownloadRecord;

const COLS: &str = "id, user_id, video_id, export_name, downloaded_at";

/// Most recent downloads for a user, newest first.
pub fn list_downloads(conn: &Connection, user_id: UserId, limit: u32) -> Result<Vec<DownloadRecord>> {
    let q = format!(
        "SELECT {COLS} FROM download_history WHERE user_id = ?1
         ORDER BY id DESC LIMIT ?2"
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![user_id.to_string(), limit], DownloadRecord::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Total number of credits ever charged to a user.
pub fn count_downloads(conn: &Connection, user_id: UserId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM download_history WHERE user_id = ?1",
        [user_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::{entitlements, users};
    use mv_core::VideoId;

    #[test]
    fn newest_first_with_limit() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = users::create_user(&conn, "hist", "member").unwrap();
        entitlements::grant_membership(&conn, user.id, Some("pro"), None, 10).unwrap();

        let res = entitlements::reserve_credits(&conn, user.id, 3).unwrap().unwrap();
        entitlements::commit_reservation(
            &conn,
            res.id,
            &[VideoId(7), VideoId(8), VideoId(9)],
            "set-one",
        )
        .unwrap();

        let recent = list_downloads(&conn, user.id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].video_id, VideoId(9));
        assert_eq!(recent[0].export_name, "set-one");
        assert_eq!(count_downloads(&conn, user.id).unwrap(), 3);
    }
}
