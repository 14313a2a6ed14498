//! Configuration types for résumé review submissions.
//!
//! Every knob lives in [`ReviewConfig`], built through
//! [`ReviewConfigBuilder`]. One struct is easy to clone into spawned tasks,
//! print in debug logs, and diff between two runs.

use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Largest accepted document: 20 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 20 * 1024 * 1024;

/// One inference backend: a provider name understood by
/// [`edgequake_llm::ProviderFactory`] plus a model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub provider: String,
    pub model: String,
}

impl BackendSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Display name used in logs and status lines, e.g. `openai/gpt-4o`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

impl FromStr for BackendSpec {
    type Err = ReviewError;

    /// Parses `provider:model`, e.g. `anthropic:claude-3-haiku-20240307`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((provider, model)) if !provider.trim().is_empty() && !model.trim().is_empty() => {
                Ok(BackendSpec::new(provider.trim(), model.trim()))
            }
            _ => Err(ReviewError::InvalidConfig(format!(
                "backend must be 'provider:model', got '{s}'"
            ))),
        }
    }
}

/// Preference order used when no backend list is configured: three Claude
/// models, then four GPT models. Order is policy, not correctness.
pub fn default_backends() -> Vec<BackendSpec> {
    vec![
        BackendSpec::new("anthropic", "claude-3-5-sonnet-20241022"),
        BackendSpec::new("anthropic", "claude-3-sonnet-20240229"),
        BackendSpec::new("anthropic", "claude-3-haiku-20240307"),
        BackendSpec::new("openai", "gpt-4o"),
        BackendSpec::new("openai", "gpt-4o-mini"),
        BackendSpec::new("openai", "gpt-4-turbo"),
        BackendSpec::new("openai", "gpt-4.1-nano"),
    ]
}

/// Configuration for the review pipeline.
///
/// # Example
/// ```rust
/// use rescheck::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .primary_timeout_secs(30)
///     .backoff_ms(500)
///     .build()
///     .unwrap();
/// assert_eq!(config.fallback_timeout_secs, 45);
/// ```
#[derive(Clone)]
pub struct ReviewConfig {
    /// Upper bound on the uploaded document size in bytes. Default: 20 MiB.
    pub max_document_bytes: u64,

    /// Upscaling factor applied when rasterising page 1. Range: 0.5–4.0. Default: 2.0.
    ///
    /// 2× keeps body text legible for a vision model while the PNG stays a few
    /// hundred kilobytes.
    pub render_scale: f32,

    /// Cap on either edge of the raster, in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// Backends tried in order. Default: [`default_backends`].
    pub backends: Vec<BackendSpec>,

    /// Pre-constructed provider. When set it is the only backend used.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Time bound for the primary (structured chat) method. Default: 60.
    pub primary_timeout_secs: u64,

    /// Time bound for the fallback (simplified) method. Default: 45.
    pub fallback_timeout_secs: u64,

    /// Pause before moving on to the next backend. Default: 2000.
    pub backoff_ms: u64,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Completion cap per call. Default: 4096.
    pub max_tokens: usize,

    /// Custom reviewer system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives stage transitions and model attempts.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            render_scale: 2.0,
            max_rendered_pixels: 2400,
            backends: default_backends(),
            provider: None,
            primary_timeout_secs: 60,
            fallback_timeout_secs: 45,
            backoff_ms: 2000,
            temperature: 0.2,
            max_tokens: 4096,
            system_prompt: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("max_document_bytes", &self.max_document_bytes)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("backends", &self.backends)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("primary_timeout_secs", &self.primary_timeout_secs)
            .field("fallback_timeout_secs", &self.fallback_timeout_secs)
            .field("backoff_ms", &self.backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SubmissionProgressCallback>"),
            )
            .finish()
    }
}

impl ReviewConfig {
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Builder for [`ReviewConfig`].
#[derive(Debug)]
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl ReviewConfigBuilder {
    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn backends(mut self, backends: Vec<BackendSpec>) -> Self {
        self.config.backends = backends;
        self
    }

    pub fn backend(mut self, backend: BackendSpec) -> Self {
        self.config.backends.push(backend);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn primary_timeout_secs(mut self, secs: u64) -> Self {
        self.config.primary_timeout_secs = secs;
        self
    }

    pub fn fallback_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fallback_timeout_secs = secs;
        self
    }

    pub fn backoff_ms(mut self, ms: u64) -> Self {
        self.config.backoff_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if c.max_document_bytes == 0 {
            return Err(ReviewError::InvalidConfig(
                "max_document_bytes must be > 0".into(),
            ));
        }
        if c.primary_timeout_secs == 0 || c.fallback_timeout_secs == 0 {
            return Err(ReviewError::InvalidConfig(
                "model timeouts must be at least 1s".into(),
            ));
        }
        if c.backends.is_empty() && c.provider.is_none() {
            return Err(ReviewError::InvalidConfig(
                "at least one backend is required".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ReviewConfig::default();
        assert_eq!(c.max_document_bytes, 20 * 1024 * 1024);
        assert_eq!(c.primary_timeout(), Duration::from_secs(60));
        assert_eq!(c.fallback_timeout(), Duration::from_secs(45));
        assert_eq!(c.backoff(), Duration::from_secs(2));
        assert_eq!(c.backends.len(), 7);
        assert_eq!(c.backends[0].provider, "anthropic");
        assert_eq!(c.backends[6].provider, "openai");
    }

    #[test]
    fn builder_clamps_scale() {
        let c = ReviewConfig::builder().render_scale(9.0).build().unwrap();
        assert_eq!(c.render_scale, 4.0);
    }

    #[test]
    fn builder_rejects_empty_backend_list() {
        let err = ReviewConfig::builder().backends(vec![]).build().unwrap_err();
        assert!(err.to_string().contains("backend"));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ReviewConfig::builder()
            .fallback_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn backend_spec_parses_provider_and_model() {
        let spec: BackendSpec = "openai:gpt-4o-mini".parse().unwrap();
        assert_eq!(spec, BackendSpec::new("openai", "gpt-4o-mini"));
        assert_eq!(spec.name(), "openai/gpt-4o-mini");
        assert!("gpt-4o".parse::<BackendSpec>().is_err());
        assert!(":gpt-4o".parse::<BackendSpec>().is_err());
    }
}
