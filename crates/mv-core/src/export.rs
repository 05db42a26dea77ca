//! Export domain model: requests, options, catalog snapshots, entitlements
//! and the artifacts produced by one export job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::ids::{UserId, VideoId};

/// Longest slug produced by [`slugify`].
const MAX_SLUG_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which binary content goes into the package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    VideoOnly,
    ArtworkOnly,
    #[default]
    Both,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::VideoOnly => "video_only",
            VideoFormat::ArtworkOnly => "artwork_only",
            VideoFormat::Both => "both",
        }
    }
}

/// Closed set of per-export switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_cuesheet: bool,
    pub include_metadata: bool,
    pub include_artwork: bool,
    pub video_format: VideoFormat,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_cuesheet: true,
            include_metadata: true,
            include_artwork: true,
            video_format: VideoFormat::Both,
        }
    }
}

impl ExportOptions {
    /// Whether video files are written under `videos/`.
    pub fn includes_videos(&self) -> bool {
        self.video_format != VideoFormat::ArtworkOnly
    }

    /// Whether thumbnails are written under `artwork/`.
    ///
    /// `VideoOnly` wins over `include_artwork`.
    pub fn includes_artwork(&self) -> bool {
        self.include_artwork && self.video_format != VideoFormat::VideoOnly
    }

    /// Reject combinations that would produce a package without tracks.
    pub fn validate(&self) -> Result<()> {
        if self.video_format == VideoFormat::ArtworkOnly && !self.include_artwork {
            return Err(Error::Validation(
                "artwork_only format requires include_artwork".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Optional descriptive fields rendered into the cue sheet and documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixDescriptors {
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub genre: Option<String>,
    pub notes: Option<String>,
}

/// A user's request to package an ordered selection of videos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub name: String,
    pub video_ids: Vec<VideoId>,
    #[serde(default)]
    pub options: ExportOptions,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExportRequest {
    /// Check the request shape before any I/O happens.
    pub fn validate(&self, max_tracks: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name is required".into()));
        }
        if self.video_ids.is_empty() {
            return Err(Error::Validation("video_ids must not be empty".into()));
        }
        if self.video_ids.len() > max_tracks {
            return Err(Error::Validation(format!(
                "at most {max_tracks} videos can be exported at once"
            )));
        }
        if let Some(bpm) = self.bpm {
            if !bpm.is_finite() || bpm <= 0.0 {
                return Err(Error::Validation("bpm must be a positive number".into()));
            }
        }
        self.options.validate()
    }

    /// Filesystem-safe slug of the mix name.
    pub fn slug(&self) -> String {
        slugify(&self.name, "mix")
    }

    pub fn descriptors(&self) -> MixDescriptors {
        MixDescriptors {
            bpm: self.bpm,
            key: non_blank(&self.key),
            genre: non_blank(&self.genre),
            notes: non_blank(&self.notes),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Reduce `input` to lowercase ASCII alphanumerics separated by single dashes.
///
/// Returns `fallback` when nothing usable is left.
pub fn slugify(input: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug.to_string()
    }
}

// ---------------------------------------------------------------------------
// Catalog and entitlement snapshots
// ---------------------------------------------------------------------------

/// Immutable snapshot of a catalog video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: VideoId,
    pub title: String,
    pub description: Option<String>,
    pub duration_secs: f64,
    pub content_key: String,
    pub thumbnail_key: Option<String>,
    pub is_premium: bool,
}

/// A user's membership state and download-credit budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,
    pub membership_id: Option<String>,
    pub membership_end_date: Option<DateTime<Utc>>,
    pub download_limit: u32,
    pub downloads_used: u32,
    /// Credits held by in-flight exports.
    pub downloads_reserved: u32,
}

impl Entitlement {
    /// A membership is active when it is set and has not ended before `now`.
    pub fn has_active_membership(&self, now: DateTime<Utc>) -> bool {
        match (&self.membership_id, self.membership_end_date) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(end)) => end >= now,
        }
    }

    /// `downloadLimit - downloadsUsed`.
    pub fn downloads_remaining(&self) -> u32 {
        self.download_limit.saturating_sub(self.downloads_used)
    }

    /// Remaining credits not held by other in-flight exports.
    pub fn downloads_available(&self) -> u32 {
        self.downloads_remaining()
            .saturating_sub(self.downloads_reserved)
    }
}

// ---------------------------------------------------------------------------
// Resolved tracks and cue entries
// ---------------------------------------------------------------------------

/// One asset at its resolved playback position.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub asset: VideoAsset,
    pub sequence_index: usize,
}

/// Ordered, densely indexed list of accessible tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTrackList {
    tracks: Vec<ResolvedTrack>,
}

impl ResolvedTrackList {
    /// Assign dense 0-based indices in the given order.
    pub fn from_assets(assets: Vec<VideoAsset>) -> Self {
        let tracks = assets
            .into_iter()
            .enumerate()
            .map(|(sequence_index, asset)| ResolvedTrack {
                asset,
                sequence_index,
            })
            .collect();
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedTrack> {
        self.tracks.iter()
    }

    pub fn ids(&self) -> Vec<VideoId> {
        self.tracks.iter().map(|t| t.asset.id).collect()
    }

    pub fn into_tracks(self) -> Vec<ResolvedTrack> {
        self.tracks
    }
}

/// Timing record for one track included in the package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueSheetEntry {
    /// 1-based track number within the package.
    pub index: usize,
    pub video_id: VideoId,
    pub title: String,
    pub description: Option<String>,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
    /// Catalog duration, zero when missing or invalid.
    pub duration_secs: f64,
    /// Archive path of the track's primary entry.
    pub file_name: String,
}

// ---------------------------------------------------------------------------
// Artifact and templates
// ---------------------------------------------------------------------------

/// The finished package descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub file_name: String,
    pub download_path: String,
    pub temp_file_path: PathBuf,
    pub size_bytes: u64,
}

/// Named preset of export options.
#[derive(Debug, Clone, Serialize)]
pub struct ExportTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub include_cuesheet: bool,
    pub include_metadata: bool,
    pub include_artwork: bool,
    pub format: VideoFormat,
}

impl ExportTemplate {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            include_cuesheet: self.include_cuesheet,
            include_metadata: self.include_metadata,
            include_artwork: self.include_artwork,
            video_format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(ids: &[i64]) -> ExportRequest {
        ExportRequest {
            name: "Friday Warmup".into(),
            video_ids: ids.iter().copied().map(VideoId).collect(),
            options: ExportOptions::default(),
            bpm: None,
            key: None,
            genre: None,
            notes: None,
        }
    }

    fn entitlement(limit: u32, used: u32) -> Entitlement {
        Entitlement {
            user_id: UserId::new(),
            membership_id: Some("pro".into()),
            membership_end_date: None,
            download_limit: limit,
            downloads_used: used,
            downloads_reserved: 0,
        }
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Friday Warmup!! Vol. 2", "mix"), "friday-warmup-vol-2");
        assert_eq!(slugify("  --Deep__House--  ", "mix"), "deep-house");
    }

    #[test]
    fn slugify_falls_back_when_empty() {
        assert_eq!(slugify("???", "mix"), "mix");
        assert_eq!(slugify("", "track"), "track");
    }

    #[test]
    fn slugify_strips_path_characters() {
        let slug = slugify("../../etc/passwd", "mix");
        assert_eq!(slug, "etc-passwd");
        assert!(!slug.contains('/'));
    }

    #[test]
    fn slugify_truncates_long_names() {
        let long = "a".repeat(200);
        assert_eq!(slugify(&long, "mix").len(), MAX_SLUG_LEN);
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = request(&[]).validate(100).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut req = request(&[1]);
        req.name = "   ".into();
        assert!(matches!(req.validate(100), Err(Error::Validation(_))));
    }

    #[test]
    fn too_many_tracks_is_rejected() {
        assert!(matches!(
            request(&[1, 2, 3]).validate(2),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn artwork_only_without_artwork_is_rejected() {
        let mut req = request(&[1]);
        req.options.video_format = VideoFormat::ArtworkOnly;
        req.options.include_artwork = false;
        assert!(matches!(req.validate(100), Err(Error::Validation(_))));
    }

    #[test]
    fn video_only_ignores_artwork_flag() {
        let opts = ExportOptions {
            video_format: VideoFormat::VideoOnly,
            include_artwork: true,
            ..ExportOptions::default()
        };
        assert!(opts.includes_videos());
        assert!(!opts.includes_artwork());
    }

    #[test]
    fn descriptors_drop_blank_fields() {
        let mut req = request(&[1]);
        req.key = Some("  ".into());
        req.genre = Some(" Techno ".into());
        let d = req.descriptors();
        assert_eq!(d.key, None);
        assert_eq!(d.genre.as_deref(), Some("Techno"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ExportOptions =
            serde_json::from_str(r#"{"video_format": "video_only"}"#).unwrap();
        assert_eq!(opts.video_format, VideoFormat::VideoOnly);
        assert!(opts.include_cuesheet);
    }

    #[test]
    fn membership_activity() {
        let now = Utc::now();
        let mut ent = entitlement(10, 0);
        assert!(ent.has_active_membership(now));

        ent.membership_end_date = Some(now - Duration::days(1));
        assert!(!ent.has_active_membership(now));

        ent.membership_end_date = Some(now + Duration::days(1));
        assert!(ent.has_active_membership(now));

        ent.membership_id = None;
        assert!(!ent.has_active_membership(now));
    }

    #[test]
    fn remaining_and_available_credits() {
        let mut ent = entitlement(10, 7);
        assert_eq!(ent.downloads_remaining(), 3);
        ent.downloads_reserved = 2;
        assert_eq!(ent.downloads_available(), 1);
        ent.downloads_used = 12;
        assert_eq!(ent.downloads_remaining(), 0);
    }

    #[test]
    fn resolved_list_indices_are_dense() {
        let assets = [5, 9, 2]
            .into_iter()
            .map(|id| VideoAsset {
                id: VideoId(id),
                title: format!("v{id}"),
                description: None,
                duration_secs: 10.0,
                content_key: format!("{id}.mp4"),
                thumbnail_key: None,
                is_premium: false,
            })
            .collect();
        let list = ResolvedTrackList::from_assets(assets);
        let indices: Vec<usize> = list.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(list.ids(), vec![VideoId(5), VideoId(9), VideoId(2)]);
    }
}
