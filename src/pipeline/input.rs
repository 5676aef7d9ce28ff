//! Input resolution: validate the user-supplied path and decide whether it is
//! a PDF or an image.
//!
//! Validation happens up front so a missing or unreadable file is reported as
//! an input error before pdfium or the OCR engine are touched.

use crate::error::OcrError;
use serde::Serialize;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What kind of document the path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
}

/// A validated input document.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// Check if a path has a `.pdf` extension (case-insensitive).
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Resolve a local path into a [`Document`].
///
/// A file is a PDF when it has a `.pdf` extension or starts with the `%PDF`
/// magic bytes; anything else is handed to the image decoder.
pub fn resolve_document(path: impl AsRef<Path>) -> Result<Document, OcrError> {
    let path = path.as_ref().to_path_buf();

    let metadata = std::fs::metadata(&path).map_err(|e| map_open_error(&path, e))?;
    if !metadata.is_file() {
        return Err(OcrError::NotAFile { path });
    }

    let mut file = File::open(&path).map_err(|e| map_open_error(&path, e))?;
    let mut magic = [0u8; 4];
    let starts_with_pdf_magic = file.read_exact(&mut magic).is_ok() && &magic == b"%PDF";

    let kind = if has_pdf_extension(&path) || starts_with_pdf_magic {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    };

    debug!("Resolved {:?} input: {}", kind, path.display());
    Ok(Document { path, kind })
}

fn map_open_error(path: &Path, e: std::io::Error) -> OcrError {
    match e.kind() {
        ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}
