//! Progress-callback trait for stage events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe a
//! run as it moves through the stages. The CLI uses it to print the OCR text,
//! the raw completion, and the extracted JSON span as soon as each exists.
//!
//! # Example
//!
//! ```rust
//! use receipt2json::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct PrintCompletion;
//!
//! impl ExtractionProgressCallback for PrintCompletion {
//!     fn on_completion(&self, completion: &str) {
//!         eprintln!("model said: {completion}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(PrintCompletion))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::input::DocumentKind;
use std::sync::Arc;

/// Called by the pipeline at each stage boundary.
///
/// Page events are raised from the blocking OCR thread, hence `Send + Sync`.
/// All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// OCR is about to start.
    fn on_ocr_start(&self, kind: DocumentKind) {
        let _ = kind;
    }

    /// One page has been recognised.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: pages in the document (1 for images)
    /// * `chars`      : characters recognised on this page
    fn on_page_recognized(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// OCR finished with non-empty text.
    fn on_ocr_complete(&self, text: &str) {
        let _ = text;
    }

    /// The prompt is about to be sent to `model`.
    fn on_llm_start(&self, model: &str) {
        let _ = model;
    }

    /// The model returned its raw completion.
    fn on_completion(&self, completion: &str) {
        let _ = completion;
    }

    /// A `{ … }` span was located in the completion (before parsing).
    fn on_json_span(&self, span: &str) {
        let _ = span;
    }
}

/// A no-op implementation.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
