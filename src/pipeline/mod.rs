//! Pipeline stages for receipt/invoice extraction.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ (prompt) ──▶ llm ──▶ json
//! (path)    (pdfium)   (tesseract)        (ollama)  (greedy {…} + parse)
//! ```
//!
//! 1. [`input`] : validate the path and classify it as image or PDF
//! 2. [`render`]: rasterise PDF pages at a fixed DPI, one page at a time
//! 3. [`ocr`]   : recognise each page and join pages under `--- Page N ---`
//!    headers
//! 4. [`llm`]   : send the rendered prompt; the only stage with network I/O
//! 5. [`json`]  : locate and parse the JSON object in the completion

pub mod input;
pub mod json;
pub mod llm;
pub mod ocr;
pub mod render;
