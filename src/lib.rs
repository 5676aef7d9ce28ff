//! # receipt2json
//!
//! Turn a receipt or invoice scan (image or PDF) into a structured JSON record
//! with Tesseract OCR and a locally hosted LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Input   validate the path, detect image vs. PDF
//!  ├─ 2. Render  rasterise PDF pages at 300 DPI via pdfium
//!  ├─ 3. OCR     tesseract per page, joined under "--- Page N ---" headers
//!  ├─ 4. Prompt  system + human template, one {invoice_text} slot
//!  ├─ 5. LLM     one completion from the local model server (Ollama)
//!  └─ 6. JSON    first '{' to last '}' span, parsed as-is
//! ```
//!
//! The run is a single sequential pass. The first failing stage ends it and
//! is identified by its error type ([`OcrError`], [`ModelError`],
//! [`JsonExtractError`]). The parsed object is returned exactly as the model
//! wrote it; [`ExtractionOutput::typed_record`] offers an optional typed view.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt2json::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Requires `tesseract` with Turkish data and `ollama serve` running llama2.
//!     let config = ExtractionConfig::default();
//!     let output = extract("fatura.jpg", &config).await?;
//!     println!("{}", output.record_pretty());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{JsonExtractError, ModelError, OcrError, ScanError, Stage};
pub use extract::{extract, extract_from_text, extract_sync, recognize};
pub use output::{ExtractionOutput, ExtractionStats, PageText, RecognizedDocument};
pub use pipeline::input::DocumentKind;
pub use pipeline::llm::{BackendError, Completion, CompletionBackend, ProviderBackend};
pub use pipeline::ocr::{OcrEngine, TesseractEngine};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{PromptTemplate, RenderedPrompt};
pub use record::InvoiceRecord;
