//! Session configuration.
//!
//! Per-batch operation parameters live in [`crate::operation`]; this module
//! holds the knobs that stay fixed for the lifetime of a [`crate::Session`]:
//! the format/size allow-list, batch throttling and preview generation.

use crate::error::ImgKitError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Size ceiling for raster images: 10 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Size ceiling for PDFs: 50 MiB.
pub const DEFAULT_MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;

/// Pause between sequential batch items. Default: 100 ms.
pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a [`crate::Session`].
///
/// # Example
/// ```rust
/// use imgkit::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .accept_pdf(false)
///     .generate_previews(false)
///     .build()
///     .unwrap();
/// assert!(!config.accept_pdf);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Accept `application/pdf` input. Default: true.
    ///
    /// Only [`crate::Operation::Convert`] can process PDFs; sessions that only
    /// compress, resize or crop should turn this off so PDFs are rejected at
    /// selection time rather than failing later.
    pub accept_pdf: bool,

    /// Maximum accepted raster image size in bytes. Default: 10 MiB.
    pub max_image_bytes: u64,

    /// Maximum accepted PDF size in bytes. Default: 50 MiB.
    pub max_pdf_bytes: u64,

    /// Delay inserted between items of `convert_all`. Default: 100 ms.
    pub inter_item_delay: Duration,

    /// Decode a thumbnail for each added image. Default: true.
    pub generate_previews: bool,

    /// Longest edge of preview thumbnails in pixels. Default: 256.
    pub preview_size: u32,

    /// Optional observer for batch/file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            accept_pdf: true,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_pdf_bytes: DEFAULT_MAX_PDF_BYTES,
            inter_item_delay: DEFAULT_INTER_ITEM_DELAY,
            generate_previews: true,
            preview_size: 256,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("accept_pdf", &self.accept_pdf)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("max_pdf_bytes", &self.max_pdf_bytes)
            .field("inter_item_delay", &self.inter_item_delay)
            .field("generate_previews", &self.generate_previews)
            .field("preview_size", &self.preview_size)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SessionProgressCallback>"),
            )
            .finish()
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn accept_pdf(mut self, v: bool) -> Self {
        self.config.accept_pdf = v;
        self
    }

    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn max_pdf_bytes(mut self, bytes: u64) -> Self {
        self.config.max_pdf_bytes = bytes;
        self
    }

    pub fn inter_item_delay(mut self, delay: Duration) -> Self {
        self.config.inter_item_delay = delay;
        self
    }

    pub fn generate_previews(mut self, v: bool) -> Self {
        self.config.generate_previews = v;
        self
    }

    pub fn preview_size(mut self, px: u32) -> Self {
        self.config.preview_size = px.clamp(16, 1024);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, ImgKitError> {
        let c = &self.config;
        if c.max_image_bytes == 0 {
            return Err(ImgKitError::InvalidConfig(
                "max_image_bytes must be > 0".into(),
            ));
        }
        if c.accept_pdf && c.max_pdf_bytes == 0 {
            return Err(ImgKitError::InvalidConfig(
                "max_pdf_bytes must be > 0 when PDFs are accepted".into(),
            ));
        }
        Ok(self.config)
    }
}
