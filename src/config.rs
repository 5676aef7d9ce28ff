//! Configuration for a receipt extraction run.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. The prompt template is part of the config, so
//! a run never reads process-wide prompt state.

use crate::error::ScanError;
use crate::pipeline::llm::CompletionBackend;
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::progress::ProgressCallback;
use crate::prompts::PromptTemplate;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Lowest accepted render DPI.
pub const MIN_DPI: u32 = 72;
/// Highest accepted render DPI.
pub const MAX_DPI: u32 = 600;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use receipt2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .language("eng")
///     .model("llama3")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 300);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Tesseract language code(s), e.g. `tur` or `tur+eng`. Default: `tur`.
    pub language: String,

    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// Tesseract is tuned for ~300 DPI input; lower values lose small print
    /// on thermal receipts.
    pub dpi: u32,

    /// Model name passed to the provider. Default: `llama2`.
    pub model: String,

    /// `edgequake-llm` provider name. Default: `ollama`.
    pub provider_name: String,

    /// Sampling temperature. Default: unset (provider default).
    pub temperature: Option<f32>,

    /// Maximum completion tokens. Default: unset (provider default).
    pub max_tokens: Option<usize>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// System + human prompt template.
    pub prompt: PromptTemplate,

    /// Path or name of the `tesseract` executable. Default: `tesseract`.
    pub tesseract_command: PathBuf,

    /// Pre-constructed OCR engine. Takes precedence over `tesseract_command`.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-constructed model client. Takes precedence over
    /// `provider_name`/`model`.
    pub backend: Option<Arc<dyn CompletionBackend>>,

    /// Stage event observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            language: "tur".to_string(),
            dpi: 300,
            model: "llama2".to_string(),
            provider_name: "ollama".to_string(),
            temperature: None,
            max_tokens: None,
            password: None,
            prompt: PromptTemplate::default(),
            tesseract_command: PathBuf::from("tesseract"),
            ocr_engine: None,
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("language", &self.language)
            .field("dpi", &self.dpi)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tesseract_command", &self.tesseract_command)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|e| e.name().to_string()))
            .field("backend", &self.backend.as_ref().map(|b| b.model().to_string()))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The OCR engine for this run.
    pub fn resolve_ocr_engine(&self) -> Arc<dyn OcrEngine> {
        match self.ocr_engine {
            Some(ref engine) => Arc::clone(engine),
            None => Arc::new(TesseractEngine::new(&self.tesseract_command)),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.config.prompt = prompt;
        self
    }

    pub fn tesseract_command(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_command = cmd.into();
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ScanError> {
        let c = &self.config;
        if c.language.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ScanError::InvalidConfig("Model must not be empty".into()));
        }
        if c.provider_name.trim().is_empty() {
            return Err(ScanError::InvalidConfig(
                "Provider must not be empty".into(),
            ));
        }
        if c.dpi < MIN_DPI || c.dpi > MAX_DPI {
            return Err(ScanError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}
