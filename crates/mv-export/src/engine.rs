//! The export pipeline: validate, resolve, reserve, assemble, document,
//! finalize, commit.
//!
//! A job either succeeds completely (possibly with a reduced track list and
//! an exact charge for it) or fails leaving no artifact and no charge.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use mv_core::config::ExportConfig;
use mv_core::{
    CueSheetEntry, Entitlement, Error, ExportArtifact, ExportId, ExportRequest, ExportTemplate,
    ResolvedTrackList, Result, UserId, VideoId,
};
use mv_db::pool::DbPool;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::archive::ArchiveWriter;
use crate::assembler::{Assembler, AssemblyOutcome};
use crate::blob::BlobStore;
use crate::documents::{self, DocumentInput};
use crate::ledger::{CreditLedger, Reservation};
use crate::lifecycle::{ExportStore, SweepStats};
use crate::resolver;
use crate::templates;

/// What a successful export produced and cost.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub export_id: ExportId,
    pub artifact: ExportArtifact,
    pub included: Vec<CueSheetEntry>,
    pub excluded: Vec<VideoId>,
    pub credits_charged: u32,
    pub downloads_remaining: u32,
    pub total_duration_secs: f64,
}

/// Orchestrates one export per call; cheap to clone and share.
#[derive(Clone)]
pub struct ExportEngine {
    ledger: CreditLedger,
    assembler: Assembler,
    artifacts: ExportStore,
    max_tracks: usize,
}

impl ExportEngine {
    pub fn new(pool: DbPool, blobs: Arc<dyn BlobStore>, config: &ExportConfig) -> Self {
        Self {
            ledger: CreditLedger::new(pool),
            assembler: Assembler::new(blobs, config.buffer_size, config.prefetch),
            artifacts: ExportStore::new(
                config.temp_dir.clone(),
                Duration::from_secs(config.artifact_ttl_secs),
            ),
            max_tracks: config.max_tracks,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn artifacts(&self) -> &ExportStore {
        &self.artifacts
    }

    pub fn list_templates(&self) -> &'static [ExportTemplate] {
        templates::list_templates()
    }

    /// Package `request` for `user_id`.
    ///
    /// Nothing touches the blob store until the request is valid, the user
    /// holds a plan, at least one track is accessible and its credits are
    /// reserved.
    pub async fn create_export(
        &self,
        request: ExportRequest,
        user_id: UserId,
        cancel: CancellationToken,
    ) -> Result<ExportReport> {
        request.validate(self.max_tracks)?;

        let export_id = ExportId::new();
        let span = tracing::info_span!("export", %export_id, %user_id);
        let result = self
            .run(export_id, request, user_id, cancel)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(report) => tracing::info!(
                parent: &span,
                file_name = %report.artifact.file_name,
                tracks = report.included.len(),
                skipped = report.excluded.len(),
                charged = report.credits_charged,
                "Export complete"
            ),
            Err(Error::Cancelled) => tracing::info!(parent: &span, "Export cancelled"),
            Err(e) if e.http_status() >= 500 => {
                tracing::error!(parent: &span, error = %e, "Export failed")
            }
            Err(e) => tracing::info!(parent: &span, error = %e, "Export rejected"),
        }
        result
    }

    async fn run(
        &self,
        export_id: ExportId,
        request: ExportRequest,
        user_id: UserId,
        cancel: CancellationToken,
    ) -> Result<ExportReport> {
        let entitlement = self
            .ledger
            .entitlement(user_id)
            .await?
            .ok_or(Error::MembershipRequired)?;

        let catalog = self.ledger.load_assets(request.video_ids.clone()).await?;
        let tracks = resolver::resolve(&request.video_ids, &catalog, &entitlement, Utc::now())?;
        tracing::debug!(
            requested = request.video_ids.len(),
            accessible = tracks.len(),
            "Resolved track list"
        );

        let required = u32::try_from(tracks.len())
            .map_err(|_| Error::Validation("too many videos".into()))?;
        let reservation = self.ledger.reserve(user_id, required).await?;

        let slug = request.slug();
        let built = self
            .artifacts
            .finalize(&slug, |file| self.build(file, &request, &slug, tracks, &cancel))
            .await;

        let (artifact, outcome) = match built {
            Ok(done) => done,
            Err(e) => {
                self.release(reservation).await;
                return Err(e);
            }
        };

        self.settle(export_id, user_id, &entitlement, reservation, artifact, outcome, &cancel)
            .await
    }

    /// Charge for a finalized artifact, or discard it if the job was
    /// cancelled while it was being written.
    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        export_id: ExportId,
        user_id: UserId,
        entitlement: &Entitlement,
        reservation: Reservation,
        artifact: ExportArtifact,
        outcome: AssemblyOutcome,
        cancel: &CancellationToken,
    ) -> Result<ExportReport> {
        if cancel.is_cancelled() {
            self.abandon(reservation, &artifact).await;
            return Err(Error::Cancelled);
        }

        let charged = match self
            .ledger
            .commit(reservation, outcome.included_ids(), artifact.file_name.clone())
            .await
        {
            Ok(n) => n,
            Err(e) => {
                self.abandon(reservation, &artifact).await;
                return Err(e);
            }
        };

        let downloads_remaining = match self.ledger.entitlement(user_id).await {
            Ok(Some(ent)) => ent.downloads_remaining(),
            _ => entitlement.downloads_remaining().saturating_sub(charged),
        };

        let total_duration_secs = outcome.total_duration_secs();
        Ok(ExportReport {
            export_id,
            artifact,
            included: outcome.included,
            excluded: outcome.excluded,
            credits_charged: charged,
            downloads_remaining,
            total_duration_secs,
        })
    }

    /// Assemble tracks and documents into `file`.
    async fn build(
        &self,
        file: std::fs::File,
        request: &ExportRequest,
        slug: &str,
        tracks: ResolvedTrackList,
        cancel: &CancellationToken,
    ) -> Result<AssemblyOutcome> {
        let (mut writer, outcome) = self
            .assembler
            .assemble(tracks, request.options, ArchiveWriter::new(file), cancel.clone())
            .await?;

        if outcome.included.is_empty() {
            return Err(Error::source_unavailable(
                slug,
                format!("none of the {} selected videos could be read", outcome.excluded.len()),
            ));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let descriptors = request.descriptors();
        let docs = documents::render(&DocumentInput {
            name: request.name.trim(),
            slug,
            entries: &outcome.included,
            excluded: &outcome.excluded,
            options: request.options,
            descriptors: &descriptors,
            created_at: Utc::now(),
        })?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            for doc in &docs {
                writer.add_text(&doc.path, &doc.contents).map_err(Error::sink)?;
            }
            let file = writer.finish().map_err(Error::sink)?;
            file.sync_all().map_err(Error::sink)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))??;

        Ok(outcome)
    }

    async fn release(&self, reservation: Reservation) {
        if let Err(e) = self.ledger.rollback(reservation).await {
            tracing::error!(reservation_id = %reservation.id, error = %e, "Failed to release credit hold");
        }
    }

    /// Release the hold and delete an artifact that will never be handed out.
    async fn abandon(&self, reservation: Reservation, artifact: &ExportArtifact) {
        self.release(reservation).await;
        if let Err(e) = self.artifacts.dispose(&artifact.file_name).await {
            tracing::warn!(file_name = %artifact.file_name, error = %e, "Failed to dispose uncommitted artifact");
        }
    }

    /// Open a finished artifact for download.
    pub async fn open_download(&self, file_name: &str) -> Result<(tokio::fs::File, u64)> {
        self.artifacts.open_for_download(file_name).await
    }

    /// Delete an artifact; repeated calls succeed.
    pub async fn dispose(&self, file_name: &str) -> Result<bool> {
        self.artifacts.dispose(file_name).await
    }

    /// Apply the retention policy once.
    pub async fn sweep(&self) -> Result<SweepStats> {
        self.artifacts.sweep_expired(SystemTime::now()).await
    }
}
