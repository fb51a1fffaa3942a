//! # imgkit
//!
//! Convert, compress, resize and crop images (and rasterise PDFs) entirely
//! in-process.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SourceFile
//!  │
//!  ├─ 1. Input      sniff MIME, check format/size allow-list
//!  ├─ 2. Rasterize  decode PNG/JPEG/GIF/BMP/TIFF/WebP/SVG (spawn_blocking)
//!  │     or Render  PDF pages at 2× via pdfium
//!  ├─ 3. Draw       identity / scaled / cropped RGBA surface
//!  ├─ 4. Encode     JPEG at a quality fraction, or the source's own format
//!  └─ 5. Output     ConvertedFile with rewritten name, ZIP bundle
//! ```
//!
//! A [`Session`] tracks selected files through
//! `pending → converting → converted | error` and runs batches one file at a
//! time. A failed file never stops the rest of the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgkit::{Operation, Session, SessionConfig, SourceFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::new(SessionConfig::default());
//!     session
//!         .add_files(vec![SourceFile::from_path("photo.png").await?])
//!         .await;
//!
//!     let summary = session.convert_all(&Operation::compress(80, 1920, 1080)).await?;
//!     eprintln!("{} converted, {} failed", summary.converted, summary.failed);
//!
//!     let zip = session.download_all_as_zip()?;
//!     zip.save(std::path::Path::new(zip.name)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgkit` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! imgkit = { version = "0.1", default-features = false }
//! ```
//!
//! PDF input needs a pdfium shared library at runtime, found on the system
//! library path or through `PDFIUM_LIB_PATH`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod error;
pub mod geometry;
pub mod locator;
pub mod operation;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{build_archive, ArchiveBlob, ARCHIVE_NAME};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{ImgKitError, PageError};
pub use geometry::{calculate_compression_ratio, CropRect, Dimensions};
pub use locator::{ObjectUrl, UrlRegistry};
pub use operation::{CompressOptions, ConvertOptions, CropOptions, Operation, ResizeOptions};
pub use output::{format_file_size, write_outputs, BatchSummary, ConvertedFile};
pub use pipeline::input::SourceFile;
pub use pipeline::rasterize::image_dimensions;
pub use pipeline::render::PdfPageMode;
pub use progress::{NoopProgressCallback, ProgressCallback, SessionProgressCallback};
pub use session::{AddFilesReport, CancelToken, FileId, FileItem, FileStatus, Session};
pub use stream::{process_stream, ResultStream, StreamResult};
