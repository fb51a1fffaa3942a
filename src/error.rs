//! Error types for the imgkit library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`ImgKitError`]: a single operation could not complete (the file is
//!   not an image, the encoder produced nothing, the archive could not be
//!   assembled). The batch tracker in [`crate::session`] catches these at the
//!   file boundary and records them on the [`crate::session::FileItem`];
//!   nothing is fatal to the session itself.
//!
//! * [`PageError`]: one page of a multi-page PDF failed to render while the
//!   rest of the document succeeded. Stored on the file item so callers can
//!   inspect partial success.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by imgkit operations.
#[derive(Debug, Error)]
pub enum ImgKitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// One or more files were rejected by the format/size allow-list.
    #[error("{rejected} file(s) were rejected: unsupported format or larger than the size limit")]
    Validation { rejected: usize },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The input is readable but the operation cannot handle its type.
    #[error("'{name}' ({mime}) is not supported by {operation}")]
    UnsupportedInput {
        name: String,
        mime: String,
        operation: &'static str,
    },

    /// No file with this identifier exists in the session.
    #[error("No file with id {0} in this session")]
    UnknownFile(u64),

    // ── Processing errors ─────────────────────────────────────────────────
    /// Source bytes could not be rasterised.
    #[error("Failed to load image '{name}': {detail}")]
    Decode { name: String, detail: String },

    /// The bitmap surface could not be serialised.
    #[error("Failed to encode '{name}': {detail}")]
    Encode { name: String, detail: String },

    /// A PDF page could not be rendered (1-based page index).
    #[error("Failed to render page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    /// ZIP assembly failed. Individual results are unaffected.
    #[error("Failed to build archive: {0}")]
    Archive(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or operation-parameter validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF input needs the pdfium shared library.\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImgKitError {
    pub(crate) fn decode(name: &str, detail: impl ToString) -> Self {
        ImgKitError::Decode {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn encode(name: &str, detail: impl ToString) -> Self {
        ImgKitError::Encode {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single PDF page.
///
/// The remaining pages of the document are still converted.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered page could not be encoded.
    #[error("Page {page}: encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based page index.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::EncodeFailed { page, .. } => *page,
        }
    }
}
