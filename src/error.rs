//! Error types for the rescheck library.
//!
//! Component errors stay small and local:
//!
//! * [`RasterError`]: the Document Rasterizer could not produce an image.
//! * [`BackendError`]: one inference attempt failed or timed out. These are
//!   absorbed by the fallback loop and only surface as the *last* message.
//! * [`NormalizeError`]: the model answered, but not with usable JSON.
//! * [`StoreError`]: object or key-value store I/O.
//!
//! [`ReviewError`] is what public operations return. Every variant maps to a
//! [`FailureStage`] so a caller can report *where* a submission stopped
//! without string-matching on messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The stage tag attached to a terminal submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    /// Bad input type or size; nothing was written anywhere.
    Validation,
    UploadFailure,
    ConversionFailure,
    /// Every backend/method combination failed.
    AnalysisFailure,
    NormalizationFailure,
    /// The rendering engine could not be loaded.
    FatalInitFailure,
    PersistenceFailure,
    NotFound,
    Config,
    Internal,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Validation => "validation",
            FailureStage::UploadFailure => "upload-failure",
            FailureStage::ConversionFailure => "conversion-failure",
            FailureStage::AnalysisFailure => "analysis-failure",
            FailureStage::NormalizationFailure => "normalization-failure",
            FailureStage::FatalInitFailure => "fatal-init-failure",
            FailureStage::PersistenceFailure => "persistence-failure",
            FailureStage::NotFound => "not-found",
            FailureStage::Config => "config",
            FailureStage::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the rescheck library.
#[derive(Debug, Error)]
pub enum ReviewError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document was rejected before any external call was made.
    #[error("Invalid document '{name}': {source}")]
    Validation {
        name: String,
        #[source]
        source: RasterError,
    },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'")]
    FileNotFound { path: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The object store refused an artifact.
    #[error("Failed to upload {artifact}: {reason}")]
    UploadFailed {
        artifact: &'static str,
        reason: String,
    },

    /// Rasterisation of page 1 failed.
    #[error("Failed to convert document to image: {source}")]
    ConversionFailed {
        #[source]
        source: RasterError,
    },

    /// The rendering engine could not be bound.
    #[error("Rendering engine unavailable: {0}")]
    FatalInit(String),

    /// All inference backends were exhausted.
    #[error(
        "All AI models failed after {attempts} attempts for submission '{submission_id}'. Last error: {last_error}"
    )]
    AnalysisFailed {
        submission_id: String,
        attempts: usize,
        last_error: String,
    },

    /// The model answered but the answer could not be turned into feedback.
    #[error("Failed to parse AI response for submission '{submission_id}': {source}")]
    NormalizationFailed {
        submission_id: String,
        #[source]
        source: NormalizeError,
    },

    /// Writing a record to the key-value store failed.
    #[error("Failed to persist submission '{submission_id}': {source}")]
    PersistFailed {
        submission_id: String,
        #[source]
        source: StoreError,
    },

    /// No record exists under `resume:<id>`.
    #[error("Submission '{id}' not found")]
    NotFound { id: String },

    /// Re-analysis was requested for a record that already has feedback.
    #[error("Submission '{id}' already has feedback; only pending submissions can be re-analysed")]
    AlreadyAnalyzed { id: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// None of the configured backends could be constructed.
    #[error("No inference backend is configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    /// The stage this error terminates a submission at.
    pub fn stage(&self) -> FailureStage {
        match self {
            ReviewError::Validation { .. }
            | ReviewError::FileNotFound { .. }
            | ReviewError::DownloadFailed { .. }
            | ReviewError::DownloadTimeout { .. }
            | ReviewError::AlreadyAnalyzed { .. } => FailureStage::Validation,
            ReviewError::UploadFailed { .. } => FailureStage::UploadFailure,
            ReviewError::ConversionFailed { .. } => FailureStage::ConversionFailure,
            ReviewError::FatalInit(_) => FailureStage::FatalInitFailure,
            ReviewError::AnalysisFailed { .. } => FailureStage::AnalysisFailure,
            ReviewError::NormalizationFailed { .. } => FailureStage::NormalizationFailure,
            ReviewError::PersistFailed { .. } | ReviewError::Store(_) => {
                FailureStage::PersistenceFailure
            }
            ReviewError::NotFound { .. } => FailureStage::NotFound,
            ReviewError::InvalidConfig(_) | ReviewError::ProviderNotConfigured { .. } => {
                FailureStage::Config
            }
            ReviewError::Internal(_) => FailureStage::Internal,
        }
    }

    /// Id of the provisional record left behind, if the failure happened
    /// after it was written.
    pub fn submission_id(&self) -> Option<&str> {
        match self {
            ReviewError::AnalysisFailed { submission_id, .. }
            | ReviewError::NormalizationFailed { submission_id, .. }
            | ReviewError::PersistFailed { submission_id, .. } => Some(submission_id),
            _ => None,
        }
    }
}

/// Why the Document Rasterizer refused or failed a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("unsupported document type: {detail}")]
    UnsupportedType { detail: String },

    #[error("document is too large ({size} bytes, max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("rendering engine failed to load: {0}")]
    EngineInit(String),

    #[error("could not parse document: {0}")]
    MalformedDocument(String),

    #[error("rendered page is empty ({width}x{height} px)")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("failed to encode page image: {0}")]
    Encode(String),
}

impl RasterError {
    /// Stable reason code, suitable for status lines and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RasterError::UnsupportedType { .. } => "unsupported-type",
            RasterError::TooLarge { .. } => "too-large",
            RasterError::EngineInit(_) => "engine-init",
            RasterError::MalformedDocument(_) => "malformed-document",
            RasterError::EmptyCanvas { .. } => "empty-canvas",
            RasterError::Encode(_) => "encode-failed",
        }
    }

    /// Validation failures are detected before any rendering work.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RasterError::UnsupportedType { .. } | RasterError::TooLarge { .. }
        )
    }
}

/// One failed invocation of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{method} request timed out after {secs}s")]
    Timeout { method: &'static str, secs: u64 },

    #[error("{0}")]
    Failed(String),
}

/// The model answered but produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("empty AI response")]
    EmptyResponse,

    /// `raw` holds the text that failed to parse.
    #[error("malformed AI response: {detail}")]
    MalformedResponse { detail: String, raw: String },
}

impl NormalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::EmptyResponse => "empty-response",
            NormalizeError::MalformedResponse { .. } => "malformed-response",
        }
    }
}

/// Object or key-value store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialisation error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid object path '{0}'")]
    InvalidPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_codes_are_kebab_case() {
        assert_eq!(FailureStage::AnalysisFailure.to_string(), "analysis-failure");
        assert_eq!(FailureStage::FatalInitFailure.as_str(), "fatal-init-failure");
        let json = serde_json::to_string(&FailureStage::NormalizationFailure).unwrap();
        assert_eq!(json, "\"normalization-failure\"");
    }

    #[test]
    fn validation_error_maps_to_validation_stage() {
        let e = ReviewError::Validation {
            name: "cv.pdf".into(),
            source: RasterError::TooLarge {
                size: 30,
                max: 20,
            },
        };
        assert_eq!(e.stage(), FailureStage::Validation);
        assert!(e.to_string().contains("cv.pdf"));
        assert!(e.submission_id().is_none());
    }

    #[test]
    fn analysis_failure_display_carries_last_error() {
        let e = ReviewError::AnalysisFailed {
            submission_id: "abc".into(),
            attempts: 14,
            last_error: "fallback request timed out after 45s".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("14 attempts"), "got: {msg}");
        assert!(msg.contains("45s"), "got: {msg}");
        assert!(msg.contains("'abc'"), "got: {msg}");
        assert_eq!(e.submission_id(), Some("abc"));
        assert_eq!(e.stage(), FailureStage::AnalysisFailure);
    }

    #[test]
    fn post_provisional_failures_name_the_submission() {
        let normalization = ReviewError::NormalizationFailed {
            submission_id: "f00d".into(),
            source: NormalizeError::EmptyResponse,
        };
        assert!(normalization.to_string().contains("'f00d'"));

        let persist = ReviewError::PersistFailed {
            submission_id: "f00d".into(),
            source: StoreError::InvalidPath("../x".into()),
        };
        assert!(persist.to_string().contains("'f00d'"));
    }

    #[test]
    fn already_analyzed_is_a_validation_error() {
        let e = ReviewError::AlreadyAnalyzed { id: "abc".into() };
        assert_eq!(e.stage(), FailureStage::Validation);
        assert!(e.to_string().contains("'abc'"));
        assert!(e.submission_id().is_none());
    }

    #[test]
    fn raster_error_codes() {
        assert_eq!(
            RasterError::UnsupportedType {
                detail: "x".into()
            }
            .code(),
            "unsupported-type"
        );
        assert_eq!(RasterError::EngineInit("gone".into()).code(), "engine-init");
        assert_eq!(
            RasterError::EmptyCanvas {
                width: 0,
                height: 10
            }
            .code(),
            "empty-canvas"
        );
        assert!(RasterError::TooLarge { size: 2, max: 1 }.is_validation());
        assert!(!RasterError::MalformedDocument("bad xref".into()).is_validation());
    }

    #[test]
    fn normalize_error_codes() {
        assert_eq!(NormalizeError::EmptyResponse.code(), "empty-response");
        let e = NormalizeError::MalformedResponse {
            detail: "expected value at line 1".into(),
            raw: "not json".into(),
        };
        assert_eq!(e.code(), "malformed-response");
    }
}
