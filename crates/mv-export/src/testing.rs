//! In-memory [`BlobStore`] for tests.
//!
//! Blobs are registered per `(kind, key)`. Individual keys can be made to
//! fail on open, fail partway through the read, or stall forever after the
//! first chunk. Every `get_stream` call is counted so tests can assert that
//! no I/O happened.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::blob::{BlobError, BlobKind, BlobMeta, BlobStore, BlobStream};

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(BlobKind, String), Vec<u8>>>,
    fail_open: Mutex<HashSet<String>>,
    fail_read: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob.
    pub fn insert(&self, kind: BlobKind, key: &str, data: impl Into<Vec<u8>>) {
        self.blobs.lock().insert((kind, key.to_string()), data.into());
    }

    /// Make `get_stream(key)` fail before returning a stream.
    pub fn fail_open(&self, key: &str) {
        self.fail_open.lock().insert(key.to_string());
    }

    /// Make the stream for `key` error after its first chunk.
    pub fn fail_read(&self, key: &str) {
        self.fail_read.lock().insert(key.to_string());
    }

    /// Make the stream for `key` hang after its first chunk.
    pub fn stall(&self, key: &str) {
        self.stalled.lock().insert(key.to_string());
    }

    /// Number of `get_stream` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_stream(&self, key: &str, kind: BlobKind) -> Result<BlobStream, BlobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_open.lock().contains(key) {
            return Err(BlobError::Http(format!("simulated outage for {key}")));
        }

        let data = self
            .blobs
            .lock()
            .get(&(kind, key.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                kind,
                key: key.to_string(),
            })?;
        let failing_read = self.fail_read.lock().contains(key);
        let stalled = self.stalled.lock().contains(key);

        let meta = BlobMeta {
            size_bytes: Some(data.len() as u64),
            mime_type: None,
            file_name: Some(key.to_string()),
        };

        let half = data.len() / 2;
        let mut chunks: Vec<std::io::Result<Bytes>> = if failing_read || stalled {
            vec![Ok(Bytes::copy_from_slice(&data[..half]))]
        } else {
            vec![Ok(Bytes::from(data))]
        };
        if failing_read {
            chunks.push(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "simulated read failure",
            )));
        }

        let body = futures::stream::iter(chunks);
        let reader: Pin<Box<dyn AsyncRead + Send>> = if stalled {
            Box::pin(StreamReader::new(body.chain(futures::stream::pending())))
        } else {
            Box::pin(StreamReader::new(body))
        };

        Ok(BlobStream { meta, reader })
    }
}
