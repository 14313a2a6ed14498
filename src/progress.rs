//! Submission states and the progress-callback trait.
//!
//! Inject an [`Arc<dyn SubmissionProgressCallback>`] via
//! [`crate::config::ReviewConfigBuilder::progress_callback`] to receive a
//! human-readable status line at every stage and an event per model attempt.
//! The CLI forwards these to a spinner; a web front end could forward them
//! to a WebSocket.
//!
//! # Example
//!
//! ```rust
//! use rescheck::{ReviewConfig, SubmissionProgressCallback, SubmissionState};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl SubmissionProgressCallback for Printer {
//!     fn on_state(&self, _id: &str, _state: &SubmissionState, status: &str) {
//!         eprintln!("{status}");
//!     }
//! }
//!
//! let config = ReviewConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FailureStage;
use crate::pipeline::director::{InvocationMethod, ModelAttempt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a submission currently is. Transitions are strictly sequential;
/// `Failed` is terminal and reachable from any other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SubmissionState {
    Created,
    Uploading,
    Converting,
    PersistingProvisional,
    Analyzing,
    Normalizing,
    PersistingFinal,
    Complete,
    Failed { stage: FailureStage, reason: String },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Complete | SubmissionState::Failed { .. })
    }

    /// Default status line for the state.
    pub fn status_text(&self) -> String {
        match self {
            SubmissionState::Created => "Preparing submission...".into(),
            SubmissionState::Uploading => "Uploading the file...".into(),
            SubmissionState::Converting => "Converting to image...".into(),
            SubmissionState::PersistingProvisional => "Preparing data...".into(),
            SubmissionState::Analyzing => "Analyzing with AI...".into(),
            SubmissionState::Normalizing => "Reading AI feedback...".into(),
            SubmissionState::PersistingFinal => "Saving feedback...".into(),
            SubmissionState::Complete => "Analysis complete!".into(),
            SubmissionState::Failed { stage, reason } => format!("Error ({stage}): {reason}"),
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_text())
    }
}

/// Called by the pipeline as a submission advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait SubmissionProgressCallback: Send + Sync {
    /// A state was entered, or a sub-step inside it began.
    ///
    /// # Arguments
    /// * `submission_id`: id of the record being produced
    /// * `state`        : current state
    /// * `status`       : human-readable status line
    fn on_state(&self, submission_id: &str, state: &SubmissionState, status: &str) {
        let _ = (submission_id, state, status);
    }

    /// A model attempt is about to be sent.
    ///
    /// # Arguments
    /// * `backend`: backend display name
    /// * `method` : invocation method
    /// * `index`  : 1-indexed position of the backend in the list
    /// * `total`  : number of backends
    fn on_attempt_start(&self, backend: &str, method: InvocationMethod, index: usize, total: usize) {
        let _ = (backend, method, index, total);
    }

    /// A model attempt settled (success, timeout or error).
    fn on_attempt_complete(&self, attempt: &ModelAttempt) {
        let _ = attempt;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SubmissionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReviewConfig`].
pub type ProgressCallback = Arc<dyn SubmissionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::director::AttemptOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct TrackingCallback {
        states: AtomicUsize,
        attempts: AtomicUsize,
        failures: AtomicUsize,
    }

    impl SubmissionProgressCallback for TrackingCallback {
        fn on_state(&self, _id: &str, state: &SubmissionState, _status: &str) {
            self.states.fetch_add(1, Ordering::SeqCst);
            if matches!(state, SubmissionState::Failed { .. }) {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_attempt_complete(&self, _attempt: &ModelAttempt) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_state("id", &SubmissionState::Created, "starting");
        cb.on_attempt_start("openai/gpt-4o", InvocationMethod::Primary, 1, 7);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            states: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        };
        tracker.on_state("id", &SubmissionState::Uploading, "up");
        tracker.on_state(
            "id",
            &SubmissionState::Failed {
                stage: FailureStage::UploadFailure,
                reason: "disk full".into(),
            },
            "failed",
        );
        tracker.on_attempt_complete(&ModelAttempt {
            backend: "openai/gpt-4o".into(),
            method: InvocationMethod::Fallback,
            deadline: Duration::from_secs(45),
            outcome: AttemptOutcome::Timeout,
            message: Some("fallback request timed out after 45s".into()),
        });
        assert_eq!(tracker.states.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_status_names_stage_and_reason() {
        let state = SubmissionState::Failed {
            stage: FailureStage::AnalysisFailure,
            reason: "All AI models failed".into(),
        };
        assert!(state.is_terminal());
        assert_eq!(
            state.to_string(),
            "Error (analysis-failure): All AI models failed"
        );
        assert!(!SubmissionState::Analyzing.is_terminal());
    }
}
