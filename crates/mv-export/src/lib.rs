//! mv-export: the mix export engine.
//!
//! Resolves a requested track list against the catalog and the caller's
//! entitlement, holds download credits, streams every track from a
//! [`blob::BlobStore`] into a zip archive, adds a cue sheet and metadata
//! documents, and publishes the finished artifact.

pub mod archive;
pub mod assembler;
pub mod blob;
pub mod cuesheet;
pub mod documents;
pub mod engine;
pub mod ledger;
pub mod lifecycle;
pub mod resolver;
pub mod templates;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use blob::{build_blob_store, BlobKind, BlobStore};
pub use engine::{ExportEngine, ExportReport};
pub use lifecycle::{ExportStore, SweepStats};
