//! Built-in export presets.

use mv_core::{ExportTemplate, VideoFormat};

static TEMPLATES: [ExportTemplate; 4] = [
    ExportTemplate {
        id: "complete",
        name: "Complete Package",
        description: "Videos, artwork, cue sheet and full metadata",
        include_cuesheet: true,
        include_metadata: true,
        include_artwork: true,
        format: VideoFormat::Both,
    },
    ExportTemplate {
        id: "video-only",
        name: "Videos Only",
        description: "Just the video files in mix order, with a cue sheet",
        include_cuesheet: true,
        include_metadata: false,
        include_artwork: false,
        format: VideoFormat::VideoOnly,
    },
    ExportTemplate {
        id: "artwork-pack",
        name: "Artwork Pack",
        description: "Thumbnail artwork for every track plus the track list",
        include_cuesheet: false,
        include_metadata: true,
        include_artwork: true,
        format: VideoFormat::ArtworkOnly,
    },
    ExportTemplate {
        id: "quick-share",
        name: "Quick Share",
        description: "Videos and a cue sheet, no extra documents",
        include_cuesheet: true,
        include_metadata: false,
        include_artwork: false,
        format: VideoFormat::Both,
    },
];

/// All presets, in display order.
pub fn list_templates() -> &'static [ExportTemplate] {
    &TEMPLATES
}

pub fn find_template(id: &str) -> Option<&'static ExportTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}
