//! Model Fallback Director: walk the backend list until one answers.
//!
//! ## Attempt order
//!
//! For each backend, in list order:
//!
//! 1. primary call (`chat`) under the primary deadline (60 s by default)
//! 2. on timeout or error, fallback call (`feedback`) under the fallback
//!    deadline (45 s by default)
//! 3. on a second failure, sleep for the backoff (2 s) and move to the
//!    next backend; no backoff after the last one
//!
//! The first non-empty result wins and nothing after it is attempted. A
//! `null` or empty-string result counts as an error.
//!
//! ## Deadlines
//!
//! Each call runs in its own spawned task and the director waits on the
//! task's `JoinHandle` under `tokio::time::timeout`. When the deadline
//! fires the handle is dropped, which detaches the task: the call may still
//! complete in the background but its result is never observed.
//!
//! ## Error reporting
//!
//! Every failed attempt overwrites the remembered error, so the error
//! reported on exhaustion is the one from the very last attempt made.

use crate::config::ReviewConfig;
use crate::error::BackendError;
use crate::pipeline::backend::{AnalysisRequest, InferenceBackend};
use crate::progress::ProgressCallback;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Which of a backend's two calls an attempt used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMethod {
    Primary,
    Fallback,
}

impl InvocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMethod::Primary => "primary",
            InvocationMethod::Fallback => "fallback",
        }
    }
}

impl fmt::Display for InvocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error,
}

/// Record of one settled call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAttempt {
    pub backend: String,
    pub method: InvocationMethod,
    #[serde(with = "duration_secs")]
    pub deadline: Duration,
    pub outcome: AttemptOutcome,
    /// Error text for failed attempts.
    pub message: Option<String>,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

/// A backend produced a result.
#[derive(Debug, Clone)]
pub struct AnalysisSuccess {
    /// Raw result, before normalisation.
    pub raw: Value,
    pub backend: String,
    pub method: InvocationMethod,
    /// Every attempt made, the successful one last.
    pub attempts: Vec<ModelAttempt>,
}

/// Every backend failed both calls.
#[derive(Debug, Clone)]
pub struct AnalysisFailure {
    /// Message of the last failed attempt.
    pub last_error: String,
    pub attempts: Vec<ModelAttempt>,
}

/// Drives the ordered fallback over a list of [`InferenceBackend`]s.
#[derive(Debug, Clone)]
pub struct ModelFallbackDirector {
    primary_timeout: Duration,
    fallback_timeout: Duration,
    backoff: Duration,
}

impl ModelFallbackDirector {
    pub fn new(primary_timeout: Duration, fallback_timeout: Duration, backoff: Duration) -> Self {
        Self {
            primary_timeout,
            fallback_timeout,
            backoff,
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(
            config.primary_timeout(),
            config.fallback_timeout(),
            config.backoff(),
        )
    }

    /// Run the fallback sequence.
    ///
    /// An empty backend list fails immediately with no attempts.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        backends: &[Arc<dyn InferenceBackend>],
        progress: Option<&ProgressCallback>,
    ) -> Result<AnalysisSuccess, AnalysisFailure> {
        let total = backends.len();
        let mut attempts = Vec::with_capacity(total * 2);
        let mut last_error = String::from("no inference backends configured");

        for (i, backend) in backends.iter().enumerate() {
            for method in [InvocationMethod::Primary, InvocationMethod::Fallback] {
                if let Some(cb) = progress {
                    cb.on_attempt_start(backend.name(), method, i + 1, total);
                }
                let attempt = self.attempt(backend, method, request).await;
                let (record, result) = match attempt {
                    Ok(raw) => (
                        self.record(backend.name(), method, AttemptOutcome::Success, None),
                        Some(raw),
                    ),
                    Err(e) => {
                        let outcome = match e {
                            BackendError::Timeout { .. } => AttemptOutcome::Timeout,
                            BackendError::Failed(_) => AttemptOutcome::Error,
                        };
                        let message = e.to_string();
                        warn!("{} {} attempt failed: {}", backend.name(), method, message);
                        last_error = message.clone();
                        (self.record(backend.name(), method, outcome, Some(message)), None)
                    }
                };
                if let Some(cb) = progress {
                    cb.on_attempt_complete(&record);
                }
                attempts.push(record);

                if let Some(raw) = result {
                    info!("{} answered via {} call", backend.name(), method);
                    return Ok(AnalysisSuccess {
                        raw,
                        backend: backend.name().to_string(),
                        method,
                        attempts,
                    });
                }
            }

            if i + 1 < total {
                debug!("Backing off {:?} before next backend", self.backoff);
                sleep(self.backoff).await;
            }
        }

        Err(AnalysisFailure {
            last_error,
            attempts,
        })
    }

    async fn attempt(
        &self,
        backend: &Arc<dyn InferenceBackend>,
        method: InvocationMethod,
        request: &AnalysisRequest,
    ) -> Result<Value, BackendError> {
        let deadline = self.deadline(method);
        let backend = Arc::clone(backend);
        let request = request.clone();
        let call = tokio::spawn(async move {
            match method {
                InvocationMethod::Primary => backend.chat(&request).await,
                InvocationMethod::Fallback => {
                    backend
                        .feedback(&request.document_ref, &request.instructions)
                        .await
                }
            }
        });

        let value = match timeout(deadline, call).await {
            Err(_elapsed) => {
                return Err(BackendError::Timeout {
                    method: method.as_str(),
                    secs: deadline.as_secs(),
                })
            }
            Ok(Err(join)) => return Err(BackendError::Failed(format!("call aborted: {join}"))),
            Ok(Ok(result)) => result?,
        };

        match &value {
            Value::Null => Err(BackendError::Failed("empty result".into())),
            Value::String(s) if s.trim().is_empty() => {
                Err(BackendError::Failed("empty result".into()))
            }
            _ => Ok(value),
        }
    }

    fn deadline(&self, method: InvocationMethod) -> Duration {
        match method {
            InvocationMethod::Primary => self.primary_timeout,
            InvocationMethod::Fallback => self.fallback_timeout,
        }
    }

    fn record(
        &self,
        backend: &str,
        method: InvocationMethod,
        outcome: AttemptOutcome,
        message: Option<String>,
    ) -> ModelAttempt {
        ModelAttempt {
            backend: backend.to_string(),
            method,
            deadline: self.deadline(method),
            outcome,
            message,
        }
    }
}
