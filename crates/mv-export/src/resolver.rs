//! Track list resolution: turn requested IDs into the ordered list of
//! assets the caller may export.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mv_core::{Entitlement, Error, ResolvedTrackList, Result, VideoAsset, VideoId};

/// Resolve `requested` against a catalog snapshot.
///
/// Unknown IDs and premium assets the caller cannot access are dropped
/// silently; repeated IDs keep their first position. Survivors stay in
/// request order with dense 0-based indices.
pub fn resolve(
    requested: &[VideoId],
    catalog: &HashMap<VideoId, VideoAsset>,
    entitlement: &Entitlement,
    now: DateTime<Utc>,
) -> Result<ResolvedTrackList> {
    let premium_ok = entitlement.has_active_membership(now);
    let mut seen = HashSet::with_capacity(requested.len());
    let mut assets = Vec::with_capacity(requested.len());

    for id in requested {
        if !seen.insert(*id) {
            tracing::debug!(video_id = %id, "Dropping duplicate video id");
            continue;
        }
        let Some(asset) = catalog.get(id) else {
            tracing::debug!(video_id = %id, "Dropping unknown video id");
            continue;
        };
        if asset.is_premium && !premium_ok {
            tracing::debug!(video_id = %id, "Dropping premium video without active membership");
            continue;
        }
        assets.push(asset.clone());
    }

    if assets.is_empty() {
        return Err(Error::NoAccessibleVideos);
    }

    Ok(ResolvedTrackList::from_assets(assets))
}
