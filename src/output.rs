//! Result types produced by the extraction pipeline.

use crate::pipeline::input::DocumentKind;
use crate::record::InvoiceRecord;
use serde::Serialize;
use serde_json::{Map, Value};

/// Recognised text of one page (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    pub page_num: usize,
    pub text: String,
}

/// Output of the OCR stage for a whole document.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedDocument {
    pub kind: DocumentKind,
    /// Per-page text. An image input has exactly one page.
    pub pages: Vec<PageText>,
    /// Aggregated text handed to the model.
    pub text: String,
    pub duration_ms: u64,
}

/// Everything a successful run produced, stage by stage.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    /// `None` when the run started from text rather than a document.
    pub document_kind: Option<DocumentKind>,
    pub ocr_text: String,
    pub pages: Vec<PageText>,
    /// Raw model completion.
    pub completion: String,
    /// The `{ … }` substring that was parsed.
    pub json_span: String,
    /// The parsed object, exactly as the model produced it.
    pub record: Map<String, Value>,
    pub stats: ExtractionStats,
}

/// Timing and token statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub page_count: usize,
    pub ocr_chars: usize,
    pub ocr_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ExtractionOutput {
    /// The record as pretty-printed JSON (2-space indent, non-ASCII kept).
    pub fn record_pretty(&self) -> String {
        // Serialising a Map<String, Value> cannot fail.
        serde_json::to_string_pretty(&self.record).unwrap_or_default()
    }

    /// Lenient typed view of the record. Never alters [`Self::record`].
    pub fn typed_record(&self) -> Result<InvoiceRecord, serde_json::Error> {
        InvoiceRecord::from_value(&Value::Object(self.record.clone()))
    }
}
