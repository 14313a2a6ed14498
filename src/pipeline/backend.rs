//! Inference backends: one vision model reachable two ways.
//!
//! Every backend exposes a *primary* call (system prompt, instructions and
//! the page image, full completion options) and a lighter *fallback* call
//! (a single user turn carrying the image and the instructions). The
//! [`crate::pipeline::director::ModelFallbackDirector`] decides which call
//! to make and when; this module only knows how to make them.
//!
//! Backends receive the *stored* raster reference, not the bytes. The image
//! is read back from the [`ObjectStore`] at call time, so the model sees
//! exactly what was persisted for the record.

use crate::config::ReviewConfig;
use crate::error::{BackendError, ReviewError};
use crate::pipeline::encode::{image_data, sniff_image_mime};
use crate::prompts::REVIEWER_SYSTEM_PROMPT;
use crate::store::ObjectStore;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a backend is asked to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Full instruction text (job context plus response format).
    pub instructions: String,
    /// Object-store path of the page image.
    pub document_ref: String,
}

impl AnalysisRequest {
    pub fn new(instructions: impl Into<String>, document_ref: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            document_ref: document_ref.into(),
        }
    }
}

/// One named inference backend.
///
/// Both methods return the provider's raw result; interpreting it is the
/// normaliser's job. A call may run past the director's deadline, in which
/// case its result is discarded.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Display name, e.g. `anthropic/claude-3-haiku-20240307`.
    fn name(&self) -> &str;

    /// Primary invocation.
    async fn chat(&self, request: &AnalysisRequest) -> Result<Value, BackendError>;

    /// Fallback invocation: document reference plus instructions only.
    async fn feedback(&self, document_ref: &str, instructions: &str)
        -> Result<Value, BackendError>;
}

/// [`InferenceBackend`] over an `edgequake-llm` provider.
pub struct LlmBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
    objects: Arc<dyn ObjectStore>,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmBackend {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        objects: Arc<dyn ObjectStore>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            objects,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| REVIEWER_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }

    async fn load_image(&self, document_ref: &str) -> Result<ImageData, BackendError> {
        let bytes = self
            .objects
            .read(document_ref)
            .await
            .map_err(|e| BackendError::Failed(format!("cannot read '{document_ref}': {e}")))?
            .ok_or_else(|| BackendError::Failed(format!("no stored image at '{document_ref}'")))?;
        let mime = sniff_image_mime(&bytes).ok_or_else(|| {
            BackendError::Failed(format!("'{document_ref}' is not a PNG or JPEG image"))
        })?;
        Ok(image_data(&bytes, mime))
    }

    async fn send(
        &self,
        messages: Vec<ChatMessage>,
        options: Option<&CompletionOptions>,
    ) -> Result<Value, BackendError> {
        let response = self
            .provider
            .chat(&messages, options)
            .await
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );
        Ok(Value::String(response.content))
    }
}

#[async_trait]
impl InferenceBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &AnalysisRequest) -> Result<Value, BackendError> {
        let image = self.load_image(&request.document_ref).await?;
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(&request.instructions, vec![image]),
        ];
        self.send(messages, Some(&self.options)).await
    }

    async fn feedback(
        &self,
        document_ref: &str,
        instructions: &str,
    ) -> Result<Value, BackendError> {
        let image = self.load_image(document_ref).await?;
        let messages = vec![ChatMessage::user_with_images(instructions, vec![image])];
        self.send(messages, None).await
    }
}

fn build_options(config: &ReviewConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Build the ordered backend list.
///
/// A pre-built `config.provider` replaces the whole list with a single
/// backend. Otherwise each [`crate::config::BackendSpec`] goes through
/// [`ProviderFactory::create_llm_provider`]; specs whose provider cannot be
/// created (typically a missing API key) are skipped with a warning.
pub fn build_backends(
    config: &ReviewConfig,
    objects: Arc<dyn ObjectStore>,
) -> Result<Vec<Arc<dyn InferenceBackend>>, ReviewError> {
    if let Some(ref provider) = config.provider {
        let backend = LlmBackend::new("custom", Arc::clone(provider), objects, config);
        return Ok(vec![Arc::new(backend)]);
    }

    let mut backends: Vec<Arc<dyn InferenceBackend>> = Vec::with_capacity(config.backends.len());
    let mut skipped = Vec::new();
    for spec in &config.backends {
        match ProviderFactory::create_llm_provider(&spec.provider, &spec.model) {
            Ok(provider) => {
                backends.push(Arc::new(LlmBackend::new(
                    spec.name(),
                    provider,
                    Arc::clone(&objects),
                    config,
                )));
            }
            Err(e) => {
                warn!("Skipping backend {}: {}", spec.name(), e);
                skipped.push(format!("{}: {}", spec.name(), e));
            }
        }
    }

    if backends.is_empty() {
        return Err(ReviewError::ProviderNotConfigured {
            hint: format!(
                "Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or pass --backend provider:model.\n{}",
                skipped.join("\n")
            ),
        });
    }
    debug!("{} of {} backends available", backends.len(), config.backends.len());
    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSpec;
    use crate::store::MemoryObjectStore;

    #[test]
    fn build_options_follow_config() {
        let config = ReviewConfig::builder()
            .temperature(0.5)
            .max_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.5));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn unknown_providers_are_not_configured() {
        let config = ReviewConfig::builder()
            .backends(vec![BackendSpec::new("no-such-provider", "model-x")])
            .build()
            .unwrap();
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let err = build_backends(&config, objects).err().unwrap();
        assert!(matches!(err, ReviewError::ProviderNotConfigured { .. }));
        assert!(err.to_string().contains("no-such-provider/model-x"));
    }
}
