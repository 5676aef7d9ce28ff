//! Error types for the receipt2json library.
//!
//! Each pipeline stage owns one error type so a caller can tell *where* a run
//! stopped from the type alone, never by inspecting message text:
//!
//! * [`OcrError`]: the document could not be read or produced no text.
//! * [`ModelError`]: the model-serving process was unavailable or the call
//!   failed.
//! * [`JsonExtractError`]: the completion held no JSON object, or the object
//!   it held did not parse.
//!
//! [`ScanError`] wraps all three (plus configuration problems) and is what the
//! top-level `extract*` functions return.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a [`ScanError`] is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Stage {
    Config,
    Ocr,
    Model,
    Json,
    Runtime,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "configuration",
            Stage::Ocr => "OCR",
            Stage::Model => "LLM",
            Stage::Json => "JSON extraction",
            Stage::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// All fatal errors returned by the top-level `extract*` functions.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Json(#[from] JsonExtractError),

    /// Builder or template validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            ScanError::Ocr(_) => Stage::Ocr,
            ScanError::Model(_) => Stage::Model,
            ScanError::Json(_) => Stage::Json,
            ScanError::InvalidConfig(_) => Stage::Config,
            ScanError::Internal(_) => Stage::Runtime,
        }
    }
}

/// Failures of the loader / OCR stage.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("'{path}' is not a regular file")]
    NotAFile { path: PathBuf },

    /// Neither a PDF nor an image format the decoder understands.
    #[error("Unsupported or unreadable image '{path}': {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Recognition errors ────────────────────────────────────────────────
    /// The OCR engine could not be started at all (e.g. binary missing).
    #[error("OCR engine '{engine}' is unavailable: {detail}\nInstall tesseract and the language data, or pass --tesseract <PATH>.")]
    EngineUnavailable { engine: String, detail: String },

    #[error("Recognition failed for page {page}: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// Recognition succeeded but produced only whitespace.
    #[error("OCR did not return any text")]
    NoText,

    #[error("OCR task failed: {0}")]
    Internal(String),
}

/// Failures of the model-serving stage.
///
/// Both variants carry a preview of the text that was being sent so the
/// failure can be reproduced by hand.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider could not be constructed (unknown name, missing config).
    #[error("LLM provider '{provider}' (model '{model}') is unavailable: {detail}")]
    Unavailable {
        provider: String,
        model: String,
        detail: String,
        text_preview: String,
    },

    /// The provider was built but the completion call failed.
    #[error("LLM call to model '{model}' failed: {detail}")]
    InvocationFailed {
        model: String,
        detail: String,
        text_preview: String,
    },
}

impl ModelError {
    /// Preview of the OCR text that was being sent.
    pub fn text_preview(&self) -> &str {
        match self {
            ModelError::Unavailable { text_preview, .. }
            | ModelError::InvocationFailed { text_preview, .. } => text_preview,
        }
    }
}

/// Failures of the JSON extraction stage.
#[derive(Debug, Error)]
pub enum JsonExtractError {
    /// The completion contains no `{ … }` span; the model ignored the
    /// JSON-only instruction.
    #[error("No JSON object found in the model output")]
    NoJsonFound { completion: String },

    /// A `{ … }` span was found but is not valid JSON.
    #[error("Model output is not valid JSON: {source}\nOffending text:\n{span}")]
    Parse {
        #[source]
        source: serde_json::Error,
        span: String,
    },
}
