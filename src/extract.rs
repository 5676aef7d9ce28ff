//! Extraction entry points.
//!
//! One entry point handles both images and PDFs; the input kind is detected in
//! [`crate::pipeline::input`]. Stages run strictly in order and each one is
//! awaited before the next starts:
//!
//! ```text
//! resolve ─▶ OCR ─▶ render prompt ─▶ LLM ─▶ JSON span ─▶ parse
//! ```
//!
//! Every stage returns its own error type; the first failure ends the run.
//! In particular an OCR failure (including empty text) means the model is
//! never contacted.

use crate::config::ExtractionConfig;
use crate::error::{OcrError, ScanError};
use crate::output::{ExtractionOutput, ExtractionStats, RecognizedDocument};
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::ocr::{self, OcrSettings};
use crate::pipeline::{json, llm};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Extract an invoice record from an image or PDF.
///
/// # Errors
/// * [`ScanError::Ocr`]  : input unreadable, engine failed, or no text
/// * [`ScanError::Model`]: model-serving process unavailable or call failed
/// * [`ScanError::Json`] : completion held no JSON object or it did not parse
pub async fn extract(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ScanError> {
    let total_start = Instant::now();

    // ── Step 1: OCR ──────────────────────────────────────────────────────
    let recognized = recognize(input_path, config).await?;

    // ── Step 2: Prompt → LLM → JSON ──────────────────────────────────────
    let mut output = structure(&recognized.text, Some(recognized.kind), config).await?;

    output.pages = recognized.pages;
    output.stats.page_count = output.pages.len();
    output.stats.ocr_duration_ms = recognized.duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {} page(s), {} fields, {}ms total",
        output.stats.page_count,
        output.record.len(),
        output.stats.total_duration_ms
    );

    Ok(output)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn extract_sync(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_path, config))
}

/// Run only the OCR stage.
///
/// Does not require a model-serving process.
pub async fn recognize(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RecognizedDocument, OcrError> {
    let document = input::resolve_document(input_path)?;
    info!(
        "Starting OCR ({:?}, lang={}): {}",
        document.kind,
        config.language,
        document.path.display()
    );

    let settings = OcrSettings {
        engine: config.resolve_ocr_engine(),
        language: config.language.clone(),
        dpi: config.dpi,
        password: config.password.clone(),
        progress: config.progress_callback.clone(),
    };

    let recognized = ocr::recognize_document(&document, &settings).await?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_ocr_complete(&recognized.text);
    }
    Ok(recognized)
}

/// Structure already-recognised text: prompt → LLM → JSON.
///
/// Useful when the OCR text comes from elsewhere. Empty text is rejected as
/// [`OcrError::NoText`] without contacting the model.
pub async fn extract_from_text(
    text: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ScanError> {
    if text.trim().is_empty() {
        return Err(OcrError::NoText.into());
    }
    let total_start = Instant::now();
    let mut output = structure(text, None, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

async fn structure(
    text: &str,
    kind: Option<DocumentKind>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ScanError> {
    let backend = llm::resolve_backend(config, text)?;
    let prompt = config.prompt.render(text);

    if let Some(ref cb) = config.progress_callback {
        cb.on_llm_start(backend.model());
    }

    let llm_start = Instant::now();
    let completion = llm::invoke(backend.as_ref(), &prompt, text).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_completion(&completion.content);
    }

    let span = json::find_json_span(&completion.content).ok_or_else(|| {
        crate::error::JsonExtractError::NoJsonFound {
            completion: completion.content.clone(),
        }
    })?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_json_span(span);
    }
    let record = json::parse_span(span)?;

    Ok(ExtractionOutput {
        document_kind: kind,
        ocr_text: text.to_string(),
        pages: Vec::new(),
        json_span: span.to_string(),
        record,
        stats: ExtractionStats {
            page_count: 0,
            ocr_chars: text.chars().count(),
            ocr_duration_ms: 0,
            llm_duration_ms,
            total_duration_ms: 0,
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
        },
        completion: completion.content,
    })
}
