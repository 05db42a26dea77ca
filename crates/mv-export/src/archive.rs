//! Zip sink for the assembled package.
//!
//! Media entries are stored uncompressed and copied chunk by chunk from the
//! source reader, so memory stays bounded by the copy buffer. Source read
//! failures and sink write failures are reported separately: the first only
//! drops the current entry, the second ruins the whole archive.

use std::fmt;
use std::io::{self, Read, Seek, Write};

use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Why copying one entry stopped early.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// Reading the source failed; the partial entry was removed.
    #[error("source read failed: {0}")]
    Source(io::Error),

    /// Writing the archive failed; the archive is unusable.
    #[error("archive write failed: {0}")]
    Sink(io::Error),

    #[error("cancelled")]
    Cancelled,
}

fn zip_err(e: zip::result::ZipError) -> io::Error {
    io::Error::other(e)
}

fn media_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true)
        .unix_permissions(0o644)
}

fn text_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Streaming zip writer over any seekable sink.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    entries: usize,
}

impl<W: Write + Seek> fmt::Debug for ArchiveWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            entries: 0,
        }
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Copy `reader` into a new stored entry at `path`.
    ///
    /// `cancel` is checked between chunks. A read error seen after
    /// cancellation is reported as [`EntryError::Cancelled`].
    pub fn copy_entry<R: Read>(
        &mut self,
        path: &str,
        reader: &mut R,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<u64, EntryError> {
        self.zip
            .start_file(path, media_options())
            .map_err(|e| EntryError::Sink(zip_err(e)))?;

        let mut total = 0u64;
        loop {
            if cancel.is_cancelled() {
                self.abort_entry()?;
                return Err(EntryError::Cancelled);
            }
            let n = match reader.read(buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.abort_entry()?;
                    if cancel.is_cancelled() {
                        return Err(EntryError::Cancelled);
                    }
                    return Err(EntryError::Source(e));
                }
            };
            self.zip.write_all(&buf[..n]).map_err(EntryError::Sink)?;
            total += n as u64;
        }

        self.entries += 1;
        Ok(total)
    }

    /// Write a small deflated text entry.
    pub fn add_text(&mut self, path: &str, contents: &str) -> io::Result<()> {
        self.zip.start_file(path, text_options()).map_err(zip_err)?;
        self.zip.write_all(contents.as_bytes())?;
        self.entries += 1;
        Ok(())
    }

    /// Write the central directory and hand back the sink.
    pub fn finish(self) -> io::Result<W> {
        self.zip.finish().map_err(zip_err)
    }

    fn abort_entry(&mut self) -> Result<(), EntryError> {
        self.zip
            .abort_file()
            .map_err(|e| EntryError::Sink(zip_err(e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that yields `data` and then fails.
    pub(crate) struct BrokenReader {
        data: Cursor<Vec<u8>>,
    }

    impl BrokenReader {
        pub(crate) fn new(data: &[u8]) -> Self {
            Self {
                data: Cursor::new(data.to_vec()),
            }
        }
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
                n => Ok(n),
            }
        }
    }

    /// Seekable sink that refuses writes once `limit` bytes have been taken.
    pub(crate) struct FullDisk {
        inner: Cursor<Vec<u8>>,
        limit: u64,
    }

    impl FullDisk {
        pub(crate) fn new(limit: u64) -> Self {
            Self {
                inner: Cursor::new(Vec::new()),
                limit,
            }
        }
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.inner.position() + buf.len() as u64 > self.limit {
                return Err(io::Error::other("no space left on device"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FullDisk {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(String::from).collect::<Vec<_>>()
    }

    #[test]
    fn copies_entries_and_text() {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 4];
        let cancel = CancellationToken::new();

        let n = w
            .copy_entry("videos/01_a.mp4", &mut Cursor::new(b"0123456789".to_vec()), &mut buf, &cancel)
            .unwrap();
        assert_eq!(n, 10);
        w.add_text("README.txt", "hello").unwrap();
        assert_eq!(w.entries(), 2);

        let bytes = w.finish().unwrap().into_inner();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("videos/01_a.mp4").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
        let mut out = Vec::new();
        entry.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn source_failure_drops_only_that_entry() {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 3];
        let cancel = CancellationToken::new();

        w.copy_entry("videos/01_a.mp4", &mut Cursor::new(b"aaa".to_vec()), &mut buf, &cancel)
            .unwrap();
        let err = w
            .copy_entry("videos/02_b.mp4", &mut BrokenReader::new(b"bbbbbb"), &mut buf, &cancel)
            .unwrap_err();
        assert!(matches!(err, EntryError::Source(_)));
        w.copy_entry("videos/02_c.mp4", &mut Cursor::new(b"ccc".to_vec()), &mut buf, &cancel)
            .unwrap();

        let bytes = w.finish().unwrap().into_inner();
        assert_eq!(names(bytes), vec!["videos/01_a.mp4", "videos/02_c.mp4"]);
    }

    #[test]
    fn sink_failure_is_fatal() {
        let mut w = ArchiveWriter::new(FullDisk::new(64));
        let mut buf = [0u8; 16];
        let cancel = CancellationToken::new();

        let err = w
            .copy_entry("videos/01_a.mp4", &mut Cursor::new(vec![7u8; 1024]), &mut buf, &cancel)
            .unwrap_err();
        assert!(matches!(err, EntryError::Sink(_)));
    }

    #[test]
    fn cancellation_stops_copy() {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 4];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = w
            .copy_entry("videos/01_a.mp4", &mut Cursor::new(vec![1u8; 32]), &mut buf, &cancel)
            .unwrap_err();
        assert!(matches!(err, EntryError::Cancelled));
        assert_eq!(w.entries(), 0);
    }

    /// Reader that trips the token on its first read and then fails.
    struct CancellingReader(CancellationToken);

    impl Read for CancellingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.cancel();
            Err(io::Error::other("stream closed"))
        }
    }

    #[test]
    fn read_error_after_cancel_is_cancellation() {
        let mut w = ArchiveWriter::new(Cursor::new(Vec::new()));
        let mut buf = [0u8; 4];
        let cancel = CancellationToken::new();

        let err = w
            .copy_entry("videos/01_a.mp4", &mut CancellingReader(cancel.clone()), &mut buf, &cancel)
            .unwrap_err();
        assert!(matches!(err, EntryError::Cancelled));
        assert_eq!(format!("{w:?}"), "ArchiveWriter { entries: 0, .. }");
    }
}
