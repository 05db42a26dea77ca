//! Entitlements and the download-credit ledger.
//!
//! Credits move through three columns on `entitlements`:
//! `download_limit`, `downloads_used` and `downloads_reserved`. A reservation
//! row in `credit_reservations` records each in-flight hold so it can be
//! committed or released exactly once. Every transition is a single guarded
//! UPDATE, so concurrent exports for the same user can never push
//! `downloads_used + downloads_reserved` past `download_limit`.

use chrono::{DateTime, Utc};
use mv_core::{Entitlement, Error, ReservationId, Result, UserId, VideoId};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::models::{entitlement_from_row, CreditReservation};

const COLS: &str = "user_id, membership_id, membership_end_date, download_limit, \
                    downloads_used, downloads_reserved";

const RES_COLS: &str = "id, user_id, credits, created_at";

/// Ledger transitions take the write lock up front so a concurrent writer
/// cannot invalidate the snapshot between the read and the guarded UPDATE.
fn begin_immediate(conn: &Connection) -> Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))
}

/// Get the entitlement row for a user, if one was ever granted.
pub fn get_entitlement(conn: &Connection, user_id: UserId) -> Result<Option<Entitlement>> {
    let q = format!("SELECT {COLS} FROM entitlements WHERE user_id = ?1");
    match conn.query_row(&q, [user_id.to_string()], entitlement_from_row) {
        Ok(e) => Ok(Some(e)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Create or update a user's plan. Usage counters are preserved.
pub fn grant_membership(
    conn: &Connection,
    user_id: UserId,
    membership_id: Option<&str>,
    membership_end_date: Option<DateTime<Utc>>,
    download_limit: u32,
) -> Result<Entitlement> {
    let now = Utc::now().to_rfc3339();
    let end = membership_end_date.map(|d| d.to_rfc3339());

    conn.execute(
        "INSERT INTO entitlements (user_id, membership_id, membership_end_date,
                                   download_limit, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             membership_id = excluded.membership_id,
             membership_end_date = excluded.membership_end_date,
             download_limit = excluded.download_limit,
             updated_at = excluded.updated_at",
        rusqlite::params![user_id.to_string(), membership_id, end, download_limit, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_entitlement(conn, user_id)?.ok_or_else(|| Error::not_found("entitlement", user_id))
}

/// Start a new billing period: `downloads_used` goes back to zero.
pub fn reset_usage(conn: &Connection, user_id: UserId) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE entitlements SET downloads_used = 0, updated_at = ?1 WHERE user_id = ?2",
            rusqlite::params![now, user_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Atomically hold `credits` for one export.
///
/// Returns `None` when the user lacks an entitlement row or when the hold
/// would exceed `download_limit`.
pub fn reserve_credits(
    conn: &Connection,
    user_id: UserId,
    credits: u32,
) -> Result<Option<CreditReservation>> {
    let now = Utc::now().to_rfc3339();
    let tx = begin_immediate(conn)?;

    let n = tx
        .execute(
            "UPDATE entitlements
             SET downloads_reserved = downloads_reserved + ?1, updated_at = ?2
             WHERE user_id = ?3
               AND downloads_used + downloads_reserved + ?1 <= download_limit",
            rusqlite::params![credits, now, user_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if n == 0 {
        return Ok(None);
    }

    let id = ReservationId::new();
    tx.execute(
        "INSERT INTO credit_reservations (id, user_id, credits, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), user_id.to_string(), credits, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Some(CreditReservation {
        id,
        user_id,
        credits,
        created_at: now,
    }))
}

/// Look up a held reservation.
pub fn get_reservation(conn: &Connection, id: ReservationId) -> Result<Option<CreditReservation>> {
    let q = format!("SELECT {RES_COLS} FROM credit_reservations WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], CreditReservation::from_row) {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Convert a hold into spent credits and record the download history.
///
/// Exactly one credit is charged per entry in `charged`, which may be
/// smaller than the reservation when some tracks were skipped. The unused
/// part of the hold is released in the same transaction.
pub fn commit_reservation(
    conn: &Connection,
    id: ReservationId,
    charged: &[VideoId],
    export_name: &str,
) -> Result<u32> {
    let now = Utc::now().to_rfc3339();
    let tx = begin_immediate(conn)?;

    let reservation = get_reservation(&tx, id)?
        .ok_or_else(|| Error::not_found("credit reservation", id))?;

    let actual = u32::try_from(charged.len())
        .map_err(|_| Error::Internal("charged track count overflows u32".into()))?;
    if actual > reservation.credits {
        return Err(Error::Internal(format!(
            "cannot charge {actual} credits against a hold of {}",
            reservation.credits
        )));
    }

    let n = tx
        .execute(
            "UPDATE entitlements
             SET downloads_reserved = downloads_reserved - ?1,
                 downloads_used = downloads_used + ?2,
                 updated_at = ?3
             WHERE user_id = ?4
               AND downloads_used + ?2 <= download_limit",
            rusqlite::params![
                reservation.credits,
                actual,
                now,
                reservation.user_id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if n == 0 {
        let remaining = get_entitlement(&tx, reservation.user_id)?
            .map(|e| e.downloads_remaining())
            .unwrap_or(0);
        return Err(Error::InsufficientCredits {
            required: actual,
            remaining,
        });
    }

    for video_id in charged {
        tx.execute(
            "INSERT INTO download_history (user_id, video_id, export_name, downloaded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![reservation.user_id.to_string(), video_id.0, export_name, now],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    }

    tx.execute(
        "DELETE FROM credit_reservations WHERE id = ?1",
        [id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(actual)
}

/// Drop a hold without charging anything. Returns false if it was already
/// committed or released.
pub fn release_reservation(conn: &Connection, id: ReservationId) -> Result<bool> {
    let tx = begin_immediate(conn)?;

    let Some(reservation) = get_reservation(&tx, id)? else {
        return Ok(false);
    };

    tx.execute(
        "UPDATE entitlements
         SET downloads_reserved = MAX(downloads_reserved - ?1, 0), updated_at = ?2
         WHERE user_id = ?3",
        rusqlite::params![
            reservation.credits,
            Utc::now().to_rfc3339(),
            reservation.user_id.to_string()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "DELETE FROM credit_reservations WHERE id = ?1",
        [id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(true)
}

/// Release every outstanding hold.
///
/// Called at startup: any reservation that survived a restart belongs to an
/// export that can no longer finish.
pub fn release_orphaned_reservations(conn: &Connection) -> Result<usize> {
    let tx = begin_immediate(conn)?;

    tx.execute(
        "UPDATE entitlements SET downloads_reserved = 0 WHERE downloads_reserved != 0",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let n = tx
        .execute("DELETE FROM credit_reservations", [])
        .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(n)
}
