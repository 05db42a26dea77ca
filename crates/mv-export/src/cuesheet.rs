//! CUE sheet rendering.
//!
//! Timestamps use the CD frame clock of 75 frames per second. Rendering is a
//! pure function of its inputs, so the same entries always yield the same
//! bytes.

use std::fmt::Write as _;

use mv_core::{CueSheetEntry, MixDescriptors};

/// Frames per second of the `mm:ss:ff` clock.
pub const FRAMES_PER_SECOND: f64 = 75.0;

/// Format seconds as `mm:ss:ff`.
pub fn format_timestamp(secs: f64) -> String {
    let t = if secs.is_finite() && secs > 0.0 { secs } else { 0.0 };
    let minutes = (t / 60.0).floor() as u64;
    let seconds = (t % 60.0).floor() as u64;
    let frames = ((t % 1.0) * FRAMES_PER_SECOND).floor() as u64;
    format!("{minutes:02}:{seconds:02}:{frames:02}")
}

/// Double quotes would end the quoted CUE field early.
fn quoted(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect();
    format!("\"{cleaned}\"")
}

/// Render the cue sheet for `entries`.
///
/// `media_file` is the name written on the `FILE` line.
pub fn render(
    title: &str,
    media_file: &str,
    entries: &[CueSheetEntry],
    descriptors: &MixDescriptors,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "TITLE {}", quoted(title));
    if let Some(genre) = &descriptors.genre {
        let _ = writeln!(out, "GENRE {}", quoted(genre));
    }
    if let Some(bpm) = descriptors.bpm {
        let _ = writeln!(out, "COMMENT {}", quoted(&format!("BPM: {bpm}")));
    }
    if let Some(key) = &descriptors.key {
        let _ = writeln!(out, "COMMENT {}", quoted(&format!("Key: {key}")));
    }
    let _ = writeln!(out, "FILE {} MP4", quoted(media_file));

    for entry in entries {
        let _ = writeln!(out, "  TRACK {:02} AUDIO", entry.index);
        let _ = writeln!(out, "    TITLE {}", quoted(&entry.title));
        let _ = writeln!(
            out,
            "    INDEX 01 {}",
            format_timestamp(entry.start_time_secs)
        );
    }

    out
}
