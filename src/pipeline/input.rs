//! Input resolution: turn a path or an in-memory buffer into a [`SourceFile`].
//!
//! MIME types are sniffed from the leading bytes first and only fall back to
//! the file extension when the content is not recognised, so a PNG saved as
//! `photo.jpg` is still treated as a PNG.

use crate::config::SessionConfig;
use crate::error::ImgKitError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_GIF: &str = "image/gif";
pub const MIME_BMP: &str = "image/bmp";
pub const MIME_TIFF: &str = "image/tiff";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_SVG: &str = "image/svg+xml";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// Image MIME types accepted by every operation. `image/jpg` is a common
/// non-standard alias for JPEG.
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &[
    MIME_PNG,
    MIME_JPEG,
    "image/jpg",
    MIME_GIF,
    MIME_BMP,
    MIME_TIFF,
    MIME_WEBP,
    MIME_SVG,
];

/// A user-supplied binary (image or PDF). Immutable once created; clones share
/// the underlying bytes.
#[derive(Clone)]
pub struct SourceFile {
    name: String,
    mime: String,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl SourceFile {
    /// Wrap an in-memory buffer, sniffing the MIME type from its content
    /// (falling back to the extension of `name`).
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let bytes: Vec<u8> = bytes.into();
        let mime = sniff_mime(&bytes, Path::new(&name)).to_string();
        Self::with_mime(name, mime, bytes)
    }

    /// Wrap an in-memory buffer with an explicit MIME type, as declared by the
    /// host that supplied it.
    pub fn with_mime(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: Arc::from(bytes),
        }
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ImgKitError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ImgKitError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => ImgKitError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let file = Self::from_bytes(name, bytes);
        debug!("Resolved local file: {} ({}, {} bytes)", path.display(), file.mime, file.size());
        Ok(file)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Byte size of the original file.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared handle to the bytes, for moving into blocking tasks.
    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn is_pdf(&self) -> bool {
        self.mime == MIME_PDF
    }

    pub fn is_svg(&self) -> bool {
        self.mime == MIME_SVG
    }
}

/// `true` for an accepted image type no larger than `max_bytes`.
pub fn is_valid_image_file(file: &SourceFile, max_bytes: u64) -> bool {
    ACCEPTED_IMAGE_TYPES.contains(&file.mime()) && file.size() <= max_bytes
}

/// `true` for a PDF no larger than `max_bytes`.
pub fn is_valid_pdf_file(file: &SourceFile, max_bytes: u64) -> bool {
    file.is_pdf() && file.size() <= max_bytes
}

/// Check a file against the session's format/size allow-list.
pub fn is_accepted(file: &SourceFile, config: &SessionConfig) -> bool {
    is_valid_image_file(file, config.max_image_bytes)
        || (config.accept_pdf && is_valid_pdf_file(file, config.max_pdf_bytes))
}

/// Determine a MIME type from content, then from the extension.
pub fn sniff_mime(bytes: &[u8], path: &Path) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        return MIME_PDF;
    }
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(mime) = mime_for_format(format) {
            return mime;
        }
    }
    if looks_like_svg(bytes) {
        return MIME_SVG;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| mime_for_extension(e))
        .unwrap_or(MIME_UNKNOWN)
}

fn mime_for_format(format: image::ImageFormat) -> Option<&'static str> {
    use image::ImageFormat;
    match format {
        ImageFormat::Png => Some(MIME_PNG),
        ImageFormat::Jpeg => Some(MIME_JPEG),
        ImageFormat::Gif => Some(MIME_GIF),
        ImageFormat::Bmp => Some(MIME_BMP),
        ImageFormat::Tiff => Some(MIME_TIFF),
        ImageFormat::WebP => Some(MIME_WEBP),
        _ => None,
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{FEFF}').trim_start();
    (text.starts_with("<svg") || text.starts_with("<?xml") || text.starts_with("<!DOCTYPE svg"))
        && text.contains("<svg")
}

/// Map a file extension (case-insensitive, without the dot) to a MIME type.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => MIME_PNG,
        "jpg" | "jpeg" | "jfif" => MIME_JPEG,
        "gif" => MIME_GIF,
        "bmp" => MIME_BMP,
        "tif" | "tiff" => MIME_TIFF,
        "webp" => MIME_WEBP,
        "svg" => MIME_SVG,
        "pdf" => MIME_PDF,
        _ => MIME_UNKNOWN,
    }
}

/// Canonical extension (without the dot) for a MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        MIME_PNG => "png",
        MIME_JPEG | "image/jpg" => "jpg",
        MIME_GIF => "gif",
        MIME_BMP => "bmp",
        MIME_TIFF => "tiff",
        MIME_WEBP => "webp",
        MIME_SVG => "svg",
        MIME_PDF => "pdf",
        _ => "bin",
    }
}

/// Expand CLI arguments into file paths: files are kept, directories are
/// listed one level deep (sorted by name).
pub async fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ImgKitError> {
    let mut out = Vec::new();
    for input in inputs {
        let meta = tokio::fs::metadata(input)
            .await
            .map_err(|_| ImgKitError::FileNotFound { path: input.clone() })?;
        if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(input)
                .await
                .map_err(|e| ImgKitError::Internal(format!("read_dir {}: {e}", input.display())))?;
            let mut files = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ImgKitError::Internal(format!("read_dir {}: {e}", input.display())))?
            {
                if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                    files.push(entry.path());
                }
            }
            files.sort();
            out.extend(files);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}
