//! Streaming archive assembly.
//!
//! A producer task opens source streams in track order, at most `prefetch`
//! ahead of the writer, and hands them over a bounded channel. The writer
//! runs on the blocking pool, owns the [`ArchiveWriter`], and copies each
//! stream into its entry through a [`SyncIoBridge`]. Entries therefore land
//! in the original track order no matter how fast each source opens.
//!
//! Sources are wrapped so a read that is still waiting on the network fails
//! the moment the job is cancelled, rather than pinning the blocking thread.

use std::collections::HashSet;
use std::io::{self, Seek, Write};
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;

use mv_core::{
    slugify, CueSheetEntry, Error, ExportOptions, ResolvedTrack, ResolvedTrackList, Result,
    VideoId,
};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveWriter, EntryError};
use crate::blob::{BlobError, BlobKind, BlobStore, BlobStream};

/// What made it into the package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyOutcome {
    /// Cue entries for the tracks whose primary stream was written.
    pub included: Vec<CueSheetEntry>,
    /// Tracks skipped because their primary stream failed.
    pub excluded: Vec<VideoId>,
    pub bytes_written: u64,
}

impl AssemblyOutcome {
    pub fn included_ids(&self) -> Vec<VideoId> {
        self.included.iter().map(|e| e.video_id).collect()
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.included.iter().map(|e| e.duration_secs).sum()
    }
}

/// Streams opened for one track, in the order the writer needs them.
struct Fetched {
    track: ResolvedTrack,
    primary: std::result::Result<BlobStream, BlobError>,
    artwork: Option<std::result::Result<BlobStream, BlobError>>,
}

/// Archive path of a track's video entry: `videos/<NN>_<slug>.<ext>`.
pub fn video_entry_path(number: usize, title: &str, ext: &str) -> String {
    format!("videos/{number:02}_{}.{ext}", slugify(title, "track"))
}

/// Claim a free `artwork/<slug>.<ext>` path, suffixing `-2`, `-3`, ... on
/// title collisions.
fn claim_artwork_path(taken: &mut HashSet<String>, title: &str, ext: &str) -> String {
    let slug = slugify(title, "track");
    let mut path = format!("artwork/{slug}.{ext}");
    let mut n = 2;
    while taken.contains(&path) {
        path = format!("artwork/{slug}-{n}.{ext}");
        n += 1;
    }
    taken.insert(path.clone());
    path
}

/// Cue timing treats missing or nonsensical durations as zero-length.
fn playable_duration(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

/// Wrap `reader` so a pending read errors out once `cancel` fires.
fn cancel_aware(
    reader: Pin<Box<dyn AsyncRead + Send>>,
    cancel: CancellationToken,
    capacity: usize,
) -> Pin<Box<dyn AsyncRead + Send>> {
    let chunks = futures::stream::unfold(
        (ReaderStream::with_capacity(reader, capacity), cancel),
        |(mut body, cancel)| async move {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(Err(io::Error::other("export cancelled"))),
                chunk = body.next() => chunk,
            };
            next.map(|chunk| (chunk, (body, cancel)))
        },
    );
    Box::pin(StreamReader::new(chunks))
}

/// Pipes resolved tracks from a [`BlobStore`] into an [`ArchiveWriter`].
#[derive(Clone)]
pub struct Assembler {
    store: Arc<dyn BlobStore>,
    buffer_size: usize,
    prefetch: usize,
}

impl Assembler {
    pub fn new(store: Arc<dyn BlobStore>, buffer_size: usize, prefetch: usize) -> Self {
        Self {
            store,
            buffer_size: buffer_size.max(1),
            prefetch: prefetch.max(1),
        }
    }

    /// Write every track's entries into `writer`.
    ///
    /// A failing primary stream excludes its track and assembly carries on;
    /// a failing thumbnail only drops the artwork entry. Sink failures and
    /// cancellation abort the whole job.
    pub async fn assemble<W>(
        &self,
        tracks: ResolvedTrackList,
        options: ExportOptions,
        mut writer: ArchiveWriter<W>,
        cancel: CancellationToken,
    ) -> Result<(ArchiveWriter<W>, AssemblyOutcome)>
    where
        W: Write + Seek + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Fetched>(self.prefetch);

        let store = Arc::clone(&self.store);
        let producer_cancel = cancel.clone();
        let producer = tokio::spawn(async move {
            for track in tracks.into_tracks() {
                let fetched = tokio::select! {
                    _ = producer_cancel.cancelled() => break,
                    fetched = fetch(store.as_ref(), track, options) => fetched,
                };
                if tx.send(fetched).await.is_err() {
                    break;
                }
            }
        });

        let handle = tokio::runtime::Handle::current();
        let buffer_size = self.buffer_size;
        let artwork_only = !options.includes_videos();

        let result = tokio::task::spawn_blocking(move || -> Result<(ArchiveWriter<W>, AssemblyOutcome)> {
            let mut buf = vec![0u8; buffer_size];
            let mut outcome = AssemblyOutcome::default();
            let mut artwork_paths = HashSet::new();
            let mut clock = 0.0f64;

            while let Some(item) = rx.blocking_recv() {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let asset = &item.track.asset;

                let stream = match item.primary {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(video_id = %asset.id, error = %e, "Skipping track: source unavailable");
                        outcome.excluded.push(asset.id);
                        continue;
                    }
                };

                let number = outcome.included.len() + 1;
                let path = if artwork_only {
                    let ext = stream.meta.extension(BlobKind::Thumbnail);
                    claim_artwork_path(&mut artwork_paths, &asset.title, &ext)
                } else {
                    video_entry_path(number, &asset.title, &stream.meta.extension(BlobKind::Video))
                };

                let source = cancel_aware(stream.reader, cancel.clone(), buffer_size);
                let mut reader = SyncIoBridge::new_with_handle(source, handle.clone());
                match writer.copy_entry(&path, &mut reader, &mut buf, &cancel) {
                    Ok(bytes) => outcome.bytes_written += bytes,
                    Err(EntryError::Source(e)) => {
                        tracing::warn!(video_id = %asset.id, error = %e, "Skipping track: source read failed");
                        artwork_paths.remove(&path);
                        outcome.excluded.push(asset.id);
                        continue;
                    }
                    Err(EntryError::Sink(e)) => return Err(Error::sink(e)),
                    Err(EntryError::Cancelled) => return Err(Error::Cancelled),
                }

                match item.artwork {
                    Some(Ok(art)) => {
                        let ext = art.meta.extension(BlobKind::Thumbnail);
                        let art_path = claim_artwork_path(&mut artwork_paths, &asset.title, &ext);
                        let source = cancel_aware(art.reader, cancel.clone(), buffer_size);
                        let mut reader = SyncIoBridge::new_with_handle(source, handle.clone());
                        match writer.copy_entry(&art_path, &mut reader, &mut buf, &cancel) {
                            Ok(bytes) => outcome.bytes_written += bytes,
                            Err(EntryError::Source(e)) => {
                                tracing::warn!(video_id = %asset.id, error = %e, "Omitting artwork: read failed");
                                artwork_paths.remove(&art_path);
                            }
                            Err(EntryError::Sink(e)) => return Err(Error::sink(e)),
                            Err(EntryError::Cancelled) => return Err(Error::Cancelled),
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(video_id = %asset.id, error = %e, "Omitting artwork: thumbnail unavailable");
                    }
                    None => {}
                }

                let duration = playable_duration(asset.duration_secs);
                outcome.included.push(CueSheetEntry {
                    index: number,
                    video_id: asset.id,
                    title: asset.title.clone(),
                    description: asset.description.clone(),
                    start_time_secs: clock,
                    end_time_secs: clock + duration,
                    duration_secs: duration,
                    file_name: path,
                });
                clock += duration;
            }

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok((writer, outcome))
        })
        .await
        .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")));

        producer.abort();
        let _ = producer.await;

        let (writer, outcome) = result??;
        tracing::info!(
            included = outcome.included.len(),
            excluded = outcome.excluded.len(),
            bytes = outcome.bytes_written,
            "Assembled archive entries"
        );
        Ok((writer, outcome))
    }
}

/// Open the streams one track needs.
///
/// In artwork-only mode the thumbnail is the primary stream. The separate
/// artwork stream is only opened once the primary one is available.
async fn fetch(store: &dyn BlobStore, track: ResolvedTrack, options: ExportOptions) -> Fetched {
    let asset = &track.asset;

    let primary = if options.includes_videos() {
        store.get_stream(&asset.content_key, BlobKind::Video).await
    } else {
        match asset.thumbnail_key.as_deref() {
            Some(key) => store.get_stream(key, BlobKind::Thumbnail).await,
            None => Err(BlobError::NotFound {
                kind: BlobKind::Thumbnail,
                key: format!("<none for video {}>", asset.id),
            }),
        }
    };

    let artwork = match asset.thumbnail_key.as_deref() {
        Some(key) if options.includes_videos() && options.includes_artwork() && primary.is_ok() => {
            Some(store.get_stream(key, BlobKind::Thumbnail).await)
        }
        _ => None,
    };

    Fetched {
        track,
        primary,
        artwork,
    }
}
