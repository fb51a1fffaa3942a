//! PDF rasterisation: render pages to JPEG via pdfium.
//!
//! Pages are rendered at a fixed 2× scale relative to their nominal size in
//! PDF points, composited onto white and encoded as JPEG.
//!
//! pdfium is not async-safe, so everything runs inside `spawn_blocking`.
//!
//! A page that fails to render or encode is reported as a [`PageError`] and
//! the remaining pages still convert. Only when every requested page fails
//! does the document as a whole fail.

use crate::error::{ImgKitError, PageError};
use crate::geometry::{check_surface, Dimensions};
use crate::locator::UrlRegistry;
use crate::pipeline::encode::{encode_surface, EncodedBlob};
use crate::pipeline::input::{SourceFile, MIME_JPEG};
use crate::pipeline::rasterize::{draw, Background, DrawInstruction, WHITE};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Upscale factor applied to nominal page size.
pub const PAGE_RENDER_SCALE: f32 = 2.0;

/// Which pages of a PDF to rasterise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfPageMode {
    /// First page only → one output image (default).
    #[default]
    First,
    /// Every page → one output image per page.
    All,
}

/// One successfully rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page index.
    pub page: usize,
    pub blob: EncodedBlob,
}

/// Result of rasterising a document: the pages that made it, plus the ones
/// that didn't.
#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub total_pages: usize,
    pub pages: Vec<RenderedPage>,
    pub errors: Vec<PageError>,
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` if set, otherwise the system library.
pub fn bind_pdfium() -> Result<Pdfium, ImgKitError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ImgKitError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Rasterise the selected pages of a PDF source into JPEG blobs.
pub async fn render_pdf(
    source: &SourceFile,
    pages: PdfPageMode,
    quality: f32,
    urls: &UrlRegistry,
) -> Result<RenderedDocument, ImgKitError> {
    let _url = urls.create(source.size());
    let name = source.name().to_string();
    let bytes = source.shared_bytes();

    tokio::task::spawn_blocking(move || render_pdf_blocking(&name, &bytes, pages, quality))
        .await
        .map_err(|e| ImgKitError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`render_pdf`].
fn render_pdf_blocking(
    name: &str,
    bytes: &[u8],
    selection: PdfPageMode,
    quality: f32,
) -> Result<RenderedDocument, ImgKitError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ImgKitError::decode(name, format!("{:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} ({} pages)", name, total_pages);

    if total_pages == 0 {
        return Err(ImgKitError::decode(name, "document has no pages"));
    }

    let wanted = match selection {
        PdfPageMode::First => 1,
        PdfPageMode::All => total_pages,
    };

    let render_config = PdfRenderConfig::new().scale_page_by_factor(PAGE_RENDER_SCALE);
    collect_pages(name, total_pages, wanted, |idx| {
        render_one(&pages, idx, &render_config, quality, name)
    })
}

/// Render pages `0..wanted` with `render`, keeping the ones that succeed and
/// recording the ones that don't.
///
/// Fails with [`ImgKitError::PageRender`] for the first failed page only when
/// no page succeeded.
pub(crate) fn collect_pages<F>(
    name: &str,
    total_pages: usize,
    wanted: usize,
    mut render: F,
) -> Result<RenderedDocument, ImgKitError>
where
    F: FnMut(usize) -> Result<EncodedBlob, PageError>,
{
    let mut doc = RenderedDocument {
        total_pages,
        ..Default::default()
    };

    for idx in 0..wanted {
        let page_num = idx + 1;
        match render(idx) {
            Ok(blob) => {
                debug!(
                    "Rendered page {} → {}x{} px, {} bytes",
                    page_num,
                    blob.dimensions.width,
                    blob.dimensions.height,
                    blob.size()
                );
                doc.pages.push(RenderedPage {
                    page: page_num,
                    blob,
                });
            }
            Err(e) => {
                warn!("{}: {}", name, e);
                doc.errors.push(e);
            }
        }
    }

    if doc.pages.is_empty() {
        let (page, detail) = match doc.errors.first() {
            Some(PageError::RenderFailed { page, detail })
            | Some(PageError::EncodeFailed { page, detail }) => (*page, detail.clone()),
            None => (1, "no pages rendered".to_string()),
        };
        return Err(ImgKitError::PageRender { page, detail });
    }

    Ok(doc)
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    render_config: &PdfRenderConfig,
    quality: f32,
    name: &str,
) -> Result<EncodedBlob, PageError> {
    let page_num = idx + 1;
    let render_failed = |detail: String| PageError::RenderFailed {
        page: page_num,
        detail,
    };

    let page = pages
        .get(idx as u16)
        .map_err(|e| render_failed(format!("{:?}", e)))?;
    let target = Dimensions::new(
        (page.width().value * PAGE_RENDER_SCALE).ceil() as u32,
        (page.height().value * PAGE_RENDER_SCALE).ceil() as u32,
    );
    check_surface(target).map_err(render_failed)?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| render_failed(format!("{:?}", e)))?;
    let image = bitmap.as_image();

    let surface = draw(&image, DrawInstruction::Identity, Background::Opaque(WHITE));
    encode_surface(&surface, MIME_JPEG, quality, name).map_err(|e| PageError::EncodeFailed {
        page: page_num,
        detail: e.to_string(),
    })
}
