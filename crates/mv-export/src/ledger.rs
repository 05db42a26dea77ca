//! Async facade over the credit ledger and the catalog snapshot.
//!
//! The SQLite work runs on the blocking pool; every transition is a single
//! guarded statement in `mv_db::queries::entitlements`.

use std::collections::HashMap;

use mv_core::{Entitlement, Error, ReservationId, Result, UserId, VideoAsset, VideoId};
use mv_db::pool::{get_conn, DbPool};
use mv_db::queries::{entitlements, videos};
use rusqlite::Connection;

/// Credits held for one in-flight export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub credits: u32,
}

/// Run a closure against a pooled connection on the blocking pool.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = get_conn(&pool)?;
        f(&*conn)
    })
    .await
    .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))?
}

/// Reserve, commit and roll back download credits.
#[derive(Clone)]
pub struct CreditLedger {
    pool: DbPool,
}

impl CreditLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn entitlement(&self, user_id: UserId) -> Result<Option<Entitlement>> {
        with_conn(&self.pool, move |conn| entitlements::get_entitlement(conn, user_id)).await
    }

    /// Hold `credits` for `user_id`.
    ///
    /// Fails with `MembershipRequired` when the user has no plan and with
    /// `InsufficientCredits` when the hold does not fit.
    pub async fn reserve(&self, user_id: UserId, credits: u32) -> Result<Reservation> {
        with_conn(&self.pool, move |conn| {
            if let Some(held) = entitlements::reserve_credits(conn, user_id, credits)? {
                return Ok(Reservation {
                    id: held.id,
                    user_id,
                    credits: held.credits,
                });
            }
            let ent = entitlements::get_entitlement(conn, user_id)?
                .ok_or(Error::MembershipRequired)?;
            Err(Error::InsufficientCredits {
                required: credits,
                remaining: ent.downloads_available(),
            })
        })
        .await
    }

    /// Charge one credit per included track and release the rest of the hold.
    pub async fn commit(
        &self,
        reservation: Reservation,
        included: Vec<VideoId>,
        export_name: String,
    ) -> Result<u32> {
        with_conn(&self.pool, move |conn| {
            entitlements::commit_reservation(conn, reservation.id, &included, &export_name)
        })
        .await
    }

    /// Release the hold without charging.
    pub async fn rollback(&self, reservation: Reservation) -> Result<bool> {
        with_conn(&self.pool, move |conn| {
            entitlements::release_reservation(conn, reservation.id)
        })
        .await
    }

    /// Release holds left behind by a previous process.
    pub async fn release_orphans(&self) -> Result<usize> {
        with_conn(&self.pool, entitlements::release_orphaned_reservations).await
    }

    /// Catalog snapshot for the requested IDs.
    pub async fn load_assets(&self, ids: Vec<VideoId>) -> Result<HashMap<VideoId, VideoAsset>> {
        with_conn(&self.pool, move |conn| videos::get_videos_by_ids(conn, &ids)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mv_db::pool::init_memory_pool;
    use mv_db::queries::users;

    fn setup(limit: u32) -> (CreditLedger, DbPool, UserId) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = users::create_user(&conn, "ledger", "member").unwrap();
        entitlements::grant_membership(&conn, user.id, Some("pro"), None, limit).unwrap();
        (CreditLedger::new(pool.clone()), pool, user.id)
    }

    #[tokio::test]
    async fn reserve_and_commit() {
        let (ledger, _pool, user) = setup(5);
        let res = ledger.reserve(user, 3).await.unwrap();
        assert_eq!(res.credits, 3);

        let charged = ledger
            .commit(res, vec![VideoId(1), VideoId(2)], "mix.zip".into())
            .await
            .unwrap();
        assert_eq!(charged, 2);

        let ent = ledger.entitlement(user).await.unwrap().unwrap();
        assert_eq!(ent.downloads_used, 2);
        assert_eq!(ent.downloads_reserved, 0);
    }

    #[tokio::test]
    async fn insufficient_reports_available() {
        let (ledger, _pool, user) = setup(2);
        let err = ledger.reserve(user, 3).await.unwrap_err();
        match err {
            Error::InsufficientCredits {
                required,
                remaining,
            } => {
                assert_eq!(required, 3);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        let ent = ledger.entitlement(user).await.unwrap().unwrap();
        assert_eq!(ent.downloads_reserved, 0);
    }

    #[tokio::test]
    async fn held_credits_count_against_second_export() {
        let (ledger, _pool, user) = setup(4);
        let _first = ledger.reserve(user, 3).await.unwrap();
        let err = ledger.reserve(user, 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCredits {
                required: 2,
                remaining: 1
            }
        ));
    }

    #[tokio::test]
    async fn no_plan_is_membership_required() {
        let pool = init_memory_pool().unwrap();
        let user = {
            let conn = pool.get().unwrap();
            users::create_user(&conn, "free", "member").unwrap().id
        };
        let ledger = CreditLedger::new(pool);
        let err = ledger.reserve(user, 1).await.unwrap_err();
        assert!(matches!(err, Error::MembershipRequired));
    }

    #[tokio::test]
    async fn rollback_releases_hold() {
        let (ledger, _pool, user) = setup(3);
        let res = ledger.reserve(user, 3).await.unwrap();
        assert!(ledger.rollback(res).await.unwrap());
        assert!(!ledger.rollback(res).await.unwrap());
        assert!(ledger.reserve(user, 3).await.is_ok());
    }
}
