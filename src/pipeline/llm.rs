//! Model interaction: send the rendered prompt and return one completion.
//!
//! The call is a single blocking round trip: no retries, no streaming, and no
//! timeout beyond what the underlying client applies. On failure the first
//! 500 characters of the OCR text are logged and carried in the error so the
//! request can be reproduced by hand.
//!
//! The model client sits behind [`CompletionBackend`]. [`ProviderBackend`]
//! is the default implementation over `edgequake-llm`, which talks to a local
//! Ollama server unless another provider name is configured.

use crate::config::ExtractionConfig;
use crate::error::ModelError;
use crate::prompts::RenderedPrompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Characters of OCR text echoed back when the model call fails.
pub const PREVIEW_CHARS: usize = 500;

/// Error type returned by [`CompletionBackend::complete`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// One model completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// A client for a model-serving process.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn model(&self) -> &str;

    /// Send the two prompt messages and return the completion.
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion, BackendError>;
}

/// [`CompletionBackend`] over an `edgequake-llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    model: String,
    options: CompletionOptions,
}

impl ProviderBackend {
    /// Build the provider named in `config` (default: Ollama).
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, BackendError> {
        let provider = ProviderFactory::create_llm_provider(
            config.provider_name.as_str(),
            config.model.as_str(),
        )
        .map_err(|e| -> BackendError { e.to_string().into() })?;
        Ok(Self {
            provider,
            model: config.model.clone(),
            options: build_options(config),
        })
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<Completion, BackendError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.human.as_str()),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| -> BackendError { e.to_string().into() })?;

        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}

/// Build `CompletionOptions` from the config. Unset values are left to the
/// provider's defaults.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

/// Resolve the backend for a run: the injected one, else a provider built
/// from the config.
///
/// Called only after OCR succeeded, so a failed OCR never touches the model.
pub fn resolve_backend(
    config: &ExtractionConfig,
    ocr_text: &str,
) -> Result<Arc<dyn CompletionBackend>, ModelError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    match ProviderBackend::from_config(config) {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(e) => {
            let text_preview = preview(ocr_text, PREVIEW_CHARS);
            error!(
                "LLM provider '{}' could not be created: {}",
                config.provider_name, e
            );
            error!("--- Text that was to be sent ---\n{}", text_preview);
            Err(ModelError::Unavailable {
                provider: config.provider_name.clone(),
                model: config.model.clone(),
                detail: e.to_string(),
                text_preview,
            })
        }
    }
}

/// Render the prompt for `ocr_text` and obtain one completion.
pub async fn invoke(
    backend: &dyn CompletionBackend,
    prompt: &RenderedPrompt,
    ocr_text: &str,
) -> Result<Completion, ModelError> {
    let start = Instant::now();
    info!(
        "Sending {} chars to model '{}'",
        prompt.human.chars().count(),
        backend.model()
    );

    match backend.complete(prompt).await {
        Ok(completion) => {
            debug!(
                "Model '{}': {} prompt tokens, {} completion tokens, {:?}",
                backend.model(),
                completion.prompt_tokens,
                completion.completion_tokens,
                start.elapsed()
            );
            Ok(completion)
        }
        Err(e) => {
            let text_preview = preview(ocr_text, PREVIEW_CHARS);
            error!("LLM call to '{}' failed: {}", backend.model(), e);
            error!("--- Text that was sent ---\n{}", text_preview);
            Err(ModelError::InvocationFailed {
                model: backend.model().to_string(),
                detail: e.to_string(),
                text_preview,
            })
        }
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
