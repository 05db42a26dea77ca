//! Text documents bundled with the package: `metadata.json`,
//! `mix-details.html` and `README.txt`.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use mv_core::{CueSheetEntry, Error, ExportOptions, MixDescriptors, Result, VideoFormat, VideoId};
use serde::Serialize;

use crate::cuesheet;

pub const METADATA_FILE: &str = "metadata.json";
pub const DETAILS_FILE: &str = "mix-details.html";
pub const README_FILE: &str = "README.txt";

/// Everything the documents are derived from.
#[derive(Debug, Clone)]
pub struct DocumentInput<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub entries: &'a [CueSheetEntry],
    pub excluded: &'a [VideoId],
    pub options: ExportOptions,
    pub descriptors: &'a MixDescriptors,
    pub created_at: DateTime<Utc>,
}

impl DocumentInput<'_> {
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_secs).sum()
    }

    pub fn cue_file_name(&self) -> String {
        format!("{}.cue", self.slug)
    }
}

/// One text file to write into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDocument {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    name: &'a str,
    slug: &'a str,
    created_at: String,
    format: VideoFormat,
    total_duration: f64,
    track_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bpm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    genre: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    tracks: Vec<ManifestTrack<'a>>,
    excluded_video_ids: &'a [VideoId],
}

#[derive(Debug, Serialize)]
struct ManifestTrack<'a> {
    index: usize,
    video_id: VideoId,
    title: &'a str,
    description: Option<&'a str>,
    start_time: f64,
    end_time: f64,
    duration: f64,
    filename: &'a str,
}

/// `metadata.json`: totals plus one record per included track.
pub fn manifest_json(input: &DocumentInput<'_>) -> Result<String> {
    let manifest = Manifest {
        name: input.name,
        slug: input.slug,
        created_at: input.created_at.to_rfc3339(),
        format: input.options.video_format,
        total_duration: input.total_duration(),
        track_count: input.entries.len(),
        bpm: input.descriptors.bpm,
        key: input.descriptors.key.as_deref(),
        genre: input.descriptors.genre.as_deref(),
        notes: input.descriptors.notes.as_deref(),
        tracks: input
            .entries
            .iter()
            .map(|e| ManifestTrack {
                index: e.index,
                video_id: e.video_id,
                title: &e.title,
                description: e.description.as_deref(),
                start_time: e.start_time_secs,
                end_time: e.end_time_secs,
                duration: e.duration_secs,
                filename: &e.file_name,
            })
            .collect(),
        excluded_video_ids: input.excluded,
    };
    serde_json::to_string_pretty(&manifest)
        .map_err(|e| Error::Internal(format!("manifest serialization failed: {e}")))
}

/// Escape text for HTML element and attribute content.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Human clock: `m:ss` below an hour, `h:mm:ss` above.
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// `mix-details.html`: a standalone page listing the same data as the manifest.
pub fn details_html(input: &DocumentInput<'_>) -> String {
    let d = input.descriptors;
    let title = html_escape(input.name);
    let mut html = String::new();

    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang=\"en\">");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "<meta charset=\"utf-8\">");
    let _ = writeln!(html, "<title>{title}</title>");
    let _ = writeln!(
        html,
        "<style>body{{font-family:sans-serif;max-width:48rem;margin:2rem auto}}\
         table{{border-collapse:collapse;width:100%}}\
         th,td{{text-align:left;padding:.25rem .5rem;border-bottom:1px solid #ddd}}</style>"
    );
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "<h1>{title}</h1>");

    let _ = writeln!(html, "<ul class=\"details\">");
    let _ = writeln!(html, "<li>Tracks: {}</li>", input.entries.len());
    let _ = writeln!(
        html,
        "<li>Total duration: {}</li>",
        format_clock(input.total_duration())
    );
    if let Some(genre) = &d.genre {
        let _ = writeln!(html, "<li>Genre: {}</li>", html_escape(genre));
    }
    if let Some(bpm) = d.bpm {
        let _ = writeln!(html, "<li>BPM: {bpm}</li>");
    }
    if let Some(key) = &d.key {
        let _ = writeln!(html, "<li>Key: {}</li>", html_escape(key));
    }
    let _ = writeln!(html, "</ul>");

    if let Some(notes) = &d.notes {
        let _ = writeln!(html, "<p class=\"notes\">{}</p>", html_escape(notes));
    }

    let _ = writeln!(html, "<table>");
    let _ = writeln!(
        html,
        "<tr><th>#</th><th>Title</th><th>Start</th><th>Duration</th><th>File</th></tr>"
    );
    for e in input.entries {
        let _ = writeln!(
            html,
            "<tr><td>{:02}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            e.index,
            html_escape(&e.title),
            format_clock(e.start_time_secs),
            format_clock(e.duration_secs),
            html_escape(&e.file_name),
        );
    }
    let _ = writeln!(html, "</table>");

    if !input.excluded.is_empty() {
        let _ = writeln!(
            html,
            "<p class=\"skipped\">{} selected video(s) could not be retrieved and were not included.</p>",
            input.excluded.len()
        );
    }

    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    html
}

/// `README.txt`: what is in the package and how to use it.
pub fn readme(input: &DocumentInput<'_>) -> String {
    let opts = input.options;
    let mut out = String::new();

    let _ = writeln!(out, "{}", input.name);
    let _ = writeln!(out, "{}", "=".repeat(input.name.chars().count().max(3)));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Exported {} - {} track(s), total running time {}.",
        input.created_at.format("%Y-%m-%d %H:%M UTC"),
        input.entries.len(),
        format_clock(input.total_duration())
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Contents");
    let _ = writeln!(out, "--------");
    if opts.includes_videos() {
        let _ = writeln!(out, "videos/            Video files, numbered in mix order.");
    }
    if opts.includes_artwork() {
        let _ = writeln!(out, "artwork/           Thumbnail artwork for each track.");
    }
    if opts.include_cuesheet {
        let _ = writeln!(
            out,
            "{:<18} Cue sheet with the start time of every track.",
            input.cue_file_name()
        );
    }
    if opts.include_metadata {
        let _ = writeln!(out, "{METADATA_FILE:<18} Machine-readable track list and timings.");
        let _ = writeln!(out, "{DETAILS_FILE:<18} Printable track list; open in any browser.");
    }
    let _ = writeln!(out, "{README_FILE:<18} This file.");

    if opts.include_cuesheet {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Load the cue sheet in your DJ software or media player to jump between tracks."
        );
    }

    if !input.excluded.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Note: {} selected video(s) could not be retrieved and were skipped. \
             You were not charged for them.",
            input.excluded.len()
        );
    }

    out
}

/// Every text document for the package, respecting the options.
pub fn render(input: &DocumentInput<'_>) -> Result<Vec<PackageDocument>> {
    let mut docs = Vec::with_capacity(4);

    if input.options.include_cuesheet {
        let media_file = format!("{}.mp4", input.slug);
        docs.push(PackageDocument {
            path: input.cue_file_name(),
            contents: cuesheet::render(input.name, &media_file, input.entries, input.descriptors),
        });
    }
    if input.options.include_metadata {
        docs.push(PackageDocument {
            path: METADATA_FILE.to_string(),
            contents: manifest_json(input)?,
        });
        docs.push(PackageDocument {
            path: DETAILS_FILE.to_string(),
            contents: details_html(input),
        });
    }
    docs.push(PackageDocument {
        path: README_FILE.to_string(),
        contents: readme(input),
    });

    Ok(docs)
}
