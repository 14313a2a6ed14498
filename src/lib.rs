//! # rescheck
//!
//! Review a résumé against a job description with vision LLMs and keep the
//! structured feedback.
//!
//! ## Pipeline Overview
//!
//! ```text
//! résumé PDF + job context
//!  │
//!  ├─ 1. Validate   PDF type and size bound, before any write
//!  ├─ 2. Upload     raw document → object store
//!  ├─ 3. Rasterise  page 1 via pdfium (spawn_blocking) → PNG → object store
//!  ├─ 4. Persist    provisional record `resume:<id>` with empty feedback
//!  ├─ 5. Analyse    ordered backends, primary then fallback call, each
//!  │                under its own deadline, 2 s backoff between backends
//!  ├─ 6. Normalise  extract the answer text, parse JSON → FeedbackReport
//!  └─ 7. Persist    final record, overwriting the provisional one
//! ```
//!
//! A failure at any step stops the submission with a stage-tagged
//! [`ReviewError`]; whatever was already stored stays in place.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rescheck::{
//!     build_backends, load_document, JobContext, MemoryKvStore, MemoryObjectStore,
//!     Orchestrator, Rasterizer, ReviewConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API keys come from ANTHROPIC_API_KEY / OPENAI_API_KEY
//!     let config = ReviewConfig::default();
//!     let objects = Arc::new(MemoryObjectStore::new());
//!     let kv = Arc::new(MemoryKvStore::new());
//!
//!     let rasterizer = Rasterizer::with_pdfium(&config)?;
//!     let backends = build_backends(&config, objects.clone())?;
//!     let orchestrator = Orchestrator::new(&config, objects, kv, rasterizer, backends);
//!
//!     let document = load_document(
//!         "resume.pdf",
//!         config.download_timeout_secs,
//!         config.max_document_bytes,
//!     )
//!     .await?;
//!     let record = orchestrator
//!         .submit(document, JobContext::new("Acme", "Engineer", "Rust services"))
//!         .await?;
//!     if let Some(score) = record.feedback.as_ref().and_then(|f| f.overall_score()) {
//!         println!("{}: {}", score, score.band().label());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rescheck` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;
pub mod submit;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{default_backends, BackendSpec, ReviewConfig, ReviewConfigBuilder};
pub use error::{
    BackendError, FailureStage, NormalizeError, RasterError, ReviewError, StoreError,
};
pub use feedback::{
    AtsFeedback, Category, CategoryFeedback, FeedbackReport, Score, ScoreBand, Tip, TipKind,
};
pub use pipeline::backend::{build_backends, AnalysisRequest, InferenceBackend, LlmBackend};
pub use pipeline::director::{
    AnalysisFailure, AnalysisSuccess, AttemptOutcome, InvocationMethod, ModelAttempt,
    ModelFallbackDirector,
};
pub use pipeline::input::{load_document, SourceDocument};
pub use pipeline::normalize::normalize;
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RasterResult, Rasterizer};
pub use progress::{
    NoopProgressCallback, ProgressCallback, SubmissionProgressCallback, SubmissionState,
};
pub use record::{JobContext, RecordRepository, SubmissionRecord};
pub use store::{
    DirKvStore, DirObjectStore, KvStore, MemoryKvStore, MemoryObjectStore, ObjectStore,
};
pub use submit::{Orchestrator, SubmissionArtifacts, WipeSummary};
