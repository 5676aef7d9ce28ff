//! OCR stage: recognise text on every page and join it into one string.
//!
//! The engine sits behind the [`OcrEngine`] trait. The default,
//! [`TesseractEngine`], drives the `tesseract` command-line tool: each page is
//! written to a temporary PNG and recognised with `tesseract <png> stdout -l
//! <lang>`. Going through the CLI keeps the crate free of a build-time link
//! against libtesseract/leptonica.
//!
//! Recognition is CPU-bound and blocking, so [`recognize_document`] moves the
//! whole stage (pdfium rendering included) onto one `spawn_blocking` thread
//! and walks the pages sequentially there.

use crate::error::OcrError;
use crate::output::{PageText, RecognizedDocument};
use crate::pipeline::input::{Document, DocumentKind};
use crate::pipeline::render;
use crate::progress::ProgressCallback;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A text recogniser for one rasterised page.
///
/// Implementations are called from a blocking thread and may block.
pub trait OcrEngine: Send + Sync {
    /// Short engine name used in logs and errors.
    fn name(&self) -> &str;

    /// Recognise `image` using `language` (a Tesseract-style code such as
    /// `tur` or `eng+deu`). `dpi` is the render resolution when known.
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        dpi: Option<u32>,
    ) -> Result<String, OcrError>;
}

/// [`OcrEngine`] backed by the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: PathBuf,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        dpi: Option<u32>,
    ) -> Result<String, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("receipt2json-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("cannot create temp file: {e}")))?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Internal(format!("cannot write temp image: {e}")))?;

        let mut cmd = Command::new(&self.command);
        cmd.arg(input.path()).arg("stdout").arg("-l").arg(language);
        if let Some(dpi) = dpi {
            cmd.arg("--dpi").arg(dpi.to_string());
        }

        let output = cmd.output().map_err(|e| OcrError::EngineUnavailable {
            engine: self.command.display().to_string(),
            detail: if e.kind() == ErrorKind::NotFound {
                "command not found".to_string()
            } else {
                e.to_string()
            },
        })?;

        if !output.status.success() {
            return Err(OcrError::RecognitionFailed {
                page: 0,
                detail: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Join per-page text into one document string.
///
/// Each page is preceded by a `--- Page N ---` header line, in the order the
/// pages are given.
pub fn aggregate_pages(pages: &[PageText]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(&format!("\n--- Page {} ---\n{}\n", page.page_num, page.text));
    }
    out
}

/// Fail with [`OcrError::NoText`] unless at least one page has
/// non-whitespace text. The page headers alone do not count.
fn require_text(pages: &[PageText]) -> Result<(), OcrError> {
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(OcrError::NoText);
    }
    Ok(())
}

/// Settings the OCR stage needs, detached from the full config so they can
/// be moved onto the blocking thread.
#[derive(Clone)]
pub struct OcrSettings {
    pub engine: Arc<dyn OcrEngine>,
    pub language: String,
    pub dpi: u32,
    pub password: Option<String>,
    pub progress: Option<ProgressCallback>,
}

/// Run the OCR stage for `document`.
///
/// Returns [`OcrError::NoText`] when recognition succeeds but every page is
/// blank, so callers never have to inspect the text to detect failure.
pub async fn recognize_document(
    document: &Document,
    settings: &OcrSettings,
) -> Result<RecognizedDocument, OcrError> {
    let start = Instant::now();
    let doc = document.clone();
    let settings = settings.clone();

    if let Some(ref cb) = settings.progress {
        cb.on_ocr_start(doc.kind);
    }

    let (pages, text) = tokio::task::spawn_blocking(move || match doc.kind {
        DocumentKind::Image => recognize_image(&doc.path, &settings),
        DocumentKind::Pdf => recognize_pdf(&doc.path, &settings),
    })
    .await
    .map_err(|e| OcrError::Internal(format!("OCR task panicked: {e}")))??;

    require_text(&pages)?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "OCR complete: {} page(s), {} chars in {}ms",
        pages.len(),
        text.chars().count(),
        duration_ms
    );

    Ok(RecognizedDocument {
        kind: document.kind,
        pages,
        text,
        duration_ms,
    })
}

fn recognize_image(
    path: &Path,
    settings: &OcrSettings,
) -> Result<(Vec<PageText>, String), OcrError> {
    let image = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| OcrError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?
        .decode()
        .map_err(|e| OcrError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    debug!("Decoded image {}x{} px", image.width(), image.height());

    let text = recognize_page(&image, 1, None, settings)?;
    if let Some(ref cb) = settings.progress {
        cb.on_page_recognized(1, 1, text.chars().count());
    }

    let pages = vec![PageText {
        page_num: 1,
        text: text.clone(),
    }];
    Ok((pages, text))
}

fn recognize_pdf(
    path: &Path,
    settings: &OcrSettings,
) -> Result<(Vec<PageText>, String), OcrError> {
    let mut pages = Vec::new();

    render::for_each_page(
        path,
        settings.dpi,
        settings.password.as_deref(),
        |page_num, total, image| {
            let text = recognize_page(&image, page_num, Some(settings.dpi), settings)?;
            debug!("Page {}/{}: {} chars", page_num, total, text.chars().count());
            if let Some(ref cb) = settings.progress {
                cb.on_page_recognized(page_num, total, text.chars().count());
            }
            pages.push(PageText { page_num, text });
            Ok(())
        },
    )?;

    let text = aggregate_pages(&pages);
    Ok((pages, text))
}

fn recognize_page(
    image: &DynamicImage,
    page_num: usize,
    dpi: Option<u32>,
    settings: &OcrSettings,
) -> Result<String, OcrError> {
    settings
        .engine
        .recognize(image, &settings.language, dpi)
        .map_err(|e| match e {
            OcrError::RecognitionFailed { detail, .. } => OcrError::RecognitionFailed {
                page: page_num,
                detail,
            },
            other => other,
        })
}
