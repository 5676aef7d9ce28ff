//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! Pages are handed to a visitor one at a time instead of being collected, so
//! only the page currently being recognised is held in memory. At 300 DPI an
//! A4 page is roughly 2480 × 3508 px; a long invoice would otherwise keep all
//! of them alive at once.
//!
//! Everything here is blocking and must run inside `spawn_blocking`.

use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Bind to a pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, a library next to the working
/// directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Scale factor that renders a page at `dpi`.
pub fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / POINTS_PER_INCH
}

/// Rasterise every page of `pdf_path` at `dpi` and pass each one to `visit`
/// in ascending page order.
///
/// `visit` receives `(page_num_1based, total_pages, image)`. Its error aborts
/// the walk.
pub fn for_each_page<F>(
    pdf_path: &Path,
    dpi: u32,
    password: Option<&str>,
    mut visit: F,
) -> Result<usize, OcrError>
where
    F: FnMut(usize, usize, DynamicImage) -> Result<(), OcrError>,
{
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| map_load_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering at {} DPI", total_pages, dpi);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale_for_dpi(dpi));

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            OcrError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        visit(page_num, total_pages, image)?;
    }

    Ok(total_pages)
}

fn map_load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> OcrError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            OcrError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            OcrError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        OcrError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}
