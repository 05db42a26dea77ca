//! Entitlement summary for the calling user.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use mv_core::UserId;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct EntitlementParams {
    /// How many recent downloads to include.
    #[serde(default = "default_history")]
    pub history: u32,
}

fn default_history() -> u32 {
    20
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadEntry {
    pub video_id: i64,
    pub export_name: String,
    pub downloaded_at: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EntitlementResponse {
    pub membership_id: Option<String>,
    pub membership_end_date: Option<String>,
    pub active_membership: bool,
    pub download_limit: u32,
    pub downloads_used: u32,
    pub downloads_reserved: u32,
    /// Credits a new export can reserve right now.
    pub downloads_available: u32,
    pub total_downloads: i64,
    pub recent_downloads: Vec<DownloadEntry>,
}

/// GET /api/entitlement
#[utoipa::path(
    get,
    path = "/api/entitlement",
    params(EntitlementParams),
    responses(
        (status = 200, description = "Entitlement summary", body = EntitlementResponse),
        (status = 402, description = "No download plan")
    )
)]
pub async fn get_entitlement(
    State(ctx): State<AppContext>,
    Extension(user_id): Extension<UserId>,
    Query(params): Query<EntitlementParams>,
) -> Result<Json<EntitlementResponse>, AppError> {
    let ent = ctx
        .engine
        .ledger()
        .entitlement(user_id)
        .await?
        .ok_or(mv_core::Error::MembershipRequired)?;

    let db = ctx.db.clone();
    let limit = params.history.min(500);
    let (total, recent) = tokio::task::spawn_blocking(move || -> mv_core::Result<_> {
        let conn = mv_db::pool::get_conn(&db)?;
        let total = mv_db::queries::downloads::count_downloads(&conn, user_id)?;
        let recent = mv_db::queries::downloads::list_downloads(&conn, user_id, limit)?;
        Ok((total, recent))
    })
    .await
    .map_err(|e| mv_core::Error::Internal(format!("spawn_blocking join error: {e}")))??;

    Ok(Json(EntitlementResponse {
        active_membership: ent.has_active_membership(Utc::now()),
        membership_id: ent.membership_id.clone(),
        membership_end_date: ent.membership_end_date.map(|d| d.to_rfc3339()),
        download_limit: ent.download_limit,
        downloads_used: ent.downloads_used,
        downloads_reserved: ent.downloads_reserved,
        downloads_available: ent.downloads_available(),
        total_downloads: total,
        recent_downloads: recent
            .into_iter()
            .map(|d| DownloadEntry {
                video_id: d.video_id.0,
                export_name: d.export_name,
                downloaded_at: d.downloaded_at,
            })
            .collect(),
    }))
}
