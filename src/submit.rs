//! Submission Orchestrator: the end-to-end review flow.
//!
//! ## States
//!
//! ```text
//! Created ─▶ Uploading ─▶ Converting ─▶ PersistingProvisional
//!         ─▶ Analyzing ─▶ Normalizing ─▶ PersistingFinal ─▶ Complete
//! ```
//!
//! Any stage can end in `Failed { stage, reason }`. Nothing is rolled back
//! on failure: an uploaded document, its raster image and the provisional
//! record all stay in place so the submission can be inspected or
//! re-analysed with [`Orchestrator::reanalyze`].
//!
//! The orchestrator itself never retries. Retries exist only inside the
//! [`ModelFallbackDirector`].

use crate::config::ReviewConfig;
use crate::error::{RasterError, ReviewError};
use crate::feedback::FeedbackReport;
use crate::pipeline::backend::{AnalysisRequest, InferenceBackend};
use crate::pipeline::director::{InvocationMethod, ModelAttempt, ModelFallbackDirector};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::normalize::normalize;
use crate::pipeline::render::Rasterizer;
use crate::progress::{ProgressCallback, SubmissionProgressCallback, SubmissionState};
use crate::prompts::prepare_instructions;
use crate::record::{JobContext, RecordRepository, SubmissionRecord};
use crate::store::{KvStore, ObjectStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stored bytes of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionArtifacts {
    pub document: Option<Vec<u8>>,
    pub raster_image: Option<Vec<u8>>,
}

/// Result of [`Orchestrator::wipe`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WipeSummary {
    pub objects_deleted: usize,
    /// Objects that could not be deleted; the wipe carries on past them.
    pub objects_failed: Vec<String>,
    pub records_flushed: usize,
}

/// Owns the pipeline components and the two stores.
///
/// Built once and shared; every method takes `&self`.
pub struct Orchestrator {
    objects: Arc<dyn ObjectStore>,
    records: RecordRepository,
    rasterizer: Rasterizer,
    backends: Vec<Arc<dyn InferenceBackend>>,
    director: ModelFallbackDirector,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    pub fn new(
        config: &ReviewConfig,
        objects: Arc<dyn ObjectStore>,
        kv: Arc<dyn KvStore>,
        rasterizer: Rasterizer,
        backends: Vec<Arc<dyn InferenceBackend>>,
    ) -> Self {
        Self {
            objects,
            records: RecordRepository::new(kv),
            rasterizer,
            backends,
            director: ModelFallbackDirector::from_config(config),
            progress: config.progress_callback.clone(),
        }
    }

    pub fn backends(&self) -> &[Arc<dyn InferenceBackend>] {
        &self.backends
    }

    /// Run a full submission.
    ///
    /// On success the returned record carries feedback and has been
    /// persisted. Failures after the provisional write carry the submission
    /// id ([`ReviewError::submission_id`]).
    pub async fn submit(
        &self,
        document: SourceDocument,
        context: JobContext,
    ) -> Result<SubmissionRecord, ReviewError> {
        let id = Uuid::new_v4().to_string();
        self.enter(&id, SubmissionState::Created);
        info!(
            "Submission {}: '{}' for {} at {}",
            id, document.name, context.job_title, context.company_name
        );

        match self.run_submission(&id, &document, &context).await {
            Ok(record) => {
                self.enter(&id, SubmissionState::Complete);
                Ok(record)
            }
            Err(e) => Err(self.fail(&id, e)),
        }
    }

    async fn run_submission(
        &self,
        id: &str,
        document: &SourceDocument,
        context: &JobContext,
    ) -> Result<SubmissionRecord, ReviewError> {
        // ── Validation: no store writes before this passes ───────────────
        self.rasterizer
            .validate(document)
            .map_err(|source| ReviewError::Validation {
                name: document.name.clone(),
                source,
            })?;

        // ── Upload raw document ──────────────────────────────────────────
        self.enter(id, SubmissionState::Uploading);
        let stored_document = self
            .objects
            .upload(&document.name, &document.bytes)
            .await
            .map_err(|e| ReviewError::UploadFailed {
                artifact: "document",
                reason: e.to_string(),
            })?;

        // ── Rasterise page 1 and upload it ───────────────────────────────
        self.enter(id, SubmissionState::Converting);
        let raster = self
            .rasterizer
            .rasterize(document)
            .await
            .map_err(|source| match source {
                RasterError::EngineInit(reason) => ReviewError::FatalInit(reason),
                source => ReviewError::ConversionFailed { source },
            })?;

        self.report(id, &SubmissionState::Converting, "Uploading the image...");
        let stored_raster = self
            .objects
            .upload(&raster.file_name, &raster.image_bytes)
            .await
            .map_err(|e| ReviewError::UploadFailed {
                artifact: "raster image",
                reason: e.to_string(),
            })?;

        // ── Provisional record ───────────────────────────────────────────
        self.enter(id, SubmissionState::PersistingProvisional);
        if self.records.exists(id).await? {
            return Err(ReviewError::Internal(format!(
                "submission id '{id}' is already taken"
            )));
        }
        let mut record =
            SubmissionRecord::provisional(id, stored_document.path, stored_raster.path, context);
        self.records.save(&record).await?;

        // ── Analyse, normalise, persist final ────────────────────────────
        let report = self.analyze(&record).await?;
        self.persist_final(&mut record, report).await?;
        Ok(record)
    }

    /// Re-run analysis for a pending submission.
    ///
    /// Uses the stored raster image and job context. Feedback is written at
    /// most once, so a record that already has it is refused before any
    /// backend is called. On failure the record is left exactly as it was.
    pub async fn reanalyze(&self, id: &str) -> Result<SubmissionRecord, ReviewError> {
        let mut record = self
            .records
            .load(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound { id: id.to_string() })?;
        if !record.is_pending() {
            return Err(self.fail(id, ReviewError::AlreadyAnalyzed { id: id.to_string() }));
        }
        if record.raster_image_ref.is_empty() {
            return Err(self.fail(
                id,
                ReviewError::Internal(format!("submission '{id}' has no raster image")),
            ));
        }
        info!("Re-analysing submission {}", id);

        let outcome = async {
            let report = self.analyze(&record).await?;
            self.persist_final(&mut record, report).await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.enter(id, SubmissionState::Complete);
                Ok(record)
            }
            Err(e) => Err(self.fail(id, e)),
        }
    }

    async fn analyze(&self, record: &SubmissionRecord) -> Result<FeedbackReport, ReviewError> {
        let id = record.id.as_str();
        self.enter(id, SubmissionState::Analyzing);
        let request = AnalysisRequest::new(
            prepare_instructions(&record.job_title, &record.job_description),
            record.raster_image_ref.as_str(),
        );

        let relay: Option<ProgressCallback> = self.progress.as_ref().map(|inner| {
            Arc::new(AttemptStatus {
                submission_id: id.to_string(),
                inner: Arc::clone(inner),
            }) as ProgressCallback
        });
        let success = self
            .director
            .analyze(&request, &self.backends, relay.as_ref())
            .await
            .map_err(|failure| ReviewError::AnalysisFailed {
                submission_id: id.to_string(),
                attempts: failure.attempts.len(),
                last_error: failure.last_error,
            })?;
        debug!(
            "Submission {}: answer from {} ({} call, attempt {})",
            id,
            success.backend,
            success.method,
            success.attempts.len()
        );

        self.enter(id, SubmissionState::Normalizing);
        normalize(&success.raw).map_err(|source| {
            if let crate::error::NormalizeError::MalformedResponse { raw, .. } = &source {
                debug!("Unparsable response for {}: {}", id, raw);
            }
            ReviewError::NormalizationFailed {
                submission_id: id.to_string(),
                source,
            }
        })
    }

    async fn persist_final(
        &self,
        record: &mut SubmissionRecord,
        report: FeedbackReport,
    ) -> Result<(), ReviewError> {
        self.enter(&record.id, SubmissionState::PersistingFinal);
        let mut updated = record.clone();
        updated.attach_feedback(report)?;
        self.records
            .save(&updated)
            .await
            .map_err(|source| ReviewError::PersistFailed {
                submission_id: record.id.clone(),
                source,
            })?;
        *record = updated;
        Ok(())
    }

    // ── Retrieval and maintenance ────────────────────────────────────────

    pub async fn get(&self, id: &str) -> Result<Option<SubmissionRecord>, ReviewError> {
        Ok(self.records.load(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<SubmissionRecord>, ReviewError> {
        Ok(self.records.list().await?)
    }

    /// Read both stored artifacts of a submission back.
    pub async fn load_artifacts(&self, id: &str) -> Result<SubmissionArtifacts, ReviewError> {
        let record = self
            .records
            .load(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound { id: id.to_string() })?;
        Ok(SubmissionArtifacts {
            document: self.read_object(&record.raw_document_ref).await?,
            raster_image: self.read_object(&record.raster_image_ref).await?,
        })
    }

    async fn read_object(&self, path: &str) -> Result<Option<Vec<u8>>, ReviewError> {
        if path.is_empty() {
            return Ok(None);
        }
        Ok(self.objects.read(path).await?)
    }

    /// Delete every stored object, then flush the key-value store.
    pub async fn wipe(&self) -> Result<WipeSummary, ReviewError> {
        let mut summary = WipeSummary {
            records_flushed: self.records.list().await?.len(),
            ..Default::default()
        };
        for path in self.objects.list().await? {
            match self.objects.delete(&path).await {
                Ok(()) => summary.objects_deleted += 1,
                Err(e) => {
                    warn!("Could not delete {}: {}", path, e);
                    summary.objects_failed.push(path);
                }
            }
        }
        self.records.flush().await?;
        info!(
            "Wiped {} objects and {} records",
            summary.objects_deleted, summary.records_flushed
        );
        Ok(summary)
    }

    // ── Status reporting ─────────────────────────────────────────────────

    fn enter(&self, id: &str, state: SubmissionState) {
        let status = state.status_text();
        debug!("Submission {}: {}", id, status);
        self.report(id, &state, &status);
    }

    fn report(&self, id: &str, state: &SubmissionState, status: &str) {
        if let Some(ref cb) = self.progress {
            cb.on_state(id, state, status);
        }
    }

    fn fail(&self, id: &str, error: ReviewError) -> ReviewError {
        warn!("Submission {} failed at {}: {}", id, error.stage(), error);
        self.enter(
            id,
            SubmissionState::Failed {
                stage: error.stage(),
                reason: error.to_string(),
            },
        );
        error
    }
}

/// Forwards model-attempt events and turns each attempt start into an
/// `Analyzing... (i/N)` status line.
struct AttemptStatus {
    submission_id: String,
    inner: ProgressCallback,
}

impl SubmissionProgressCallback for AttemptStatus {
    fn on_state(&self, submission_id: &str, state: &SubmissionState, status: &str) {
        self.inner.on_state(submission_id, state, status);
    }

    fn on_attempt_start(&self, backend: &str, method: InvocationMethod, index: usize, total: usize) {
        self.inner.on_state(
            &self.submission_id,
            &SubmissionState::Analyzing,
            &format!("Analyzing... ({index}/{total})"),
        );
        self.inner.on_attempt_start(backend, method, index, total);
    }

    fn on_attempt_complete(&self, attempt: &ModelAttempt) {
        self.inner.on_attempt_complete(attempt);
    }
}
