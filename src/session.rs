//! File lifecycle tracker.
//!
//! A [`Session`] owns the selected files and the converted results. Each
//! [`FileItem`] moves through
//!
//! ```text
//! pending ──▶ converting ──▶ converted
//!                       └──▶ error
//! ```
//!
//! and never returns to `pending`. Calling [`Session::convert_single`] again on
//! a converted or failed item re-enters `converting` and replaces whatever that
//! item produced before.
//!
//! Batches run strictly one file at a time with a small delay between items,
//! which bounds peak decoder memory to a single image. Processing errors never
//! escape a batch: they are recorded on the item and reported through the
//! progress callback.

use crate::archive::{build_archive, ArchiveBlob};
use crate::config::SessionConfig;
use crate::error::{ImgKitError, PageError};
use crate::locator::UrlRegistry;
use crate::operation::{Applied, Operation};
use crate::output::{BatchSummary, ConvertedFile};
use crate::pipeline::encode::encode_preview;
use crate::pipeline::input::{is_accepted, SourceFile};
use crate::pipeline::rasterize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session-unique identifier shared by a [`FileItem`] and every
/// [`ConvertedFile`] it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of a [`FileItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Converting,
    Converted,
    Error,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStatus::Pending => "pending",
            FileStatus::Converting => "converting",
            FileStatus::Converted => "converted",
            FileStatus::Error => "error",
        })
    }
}

/// A selected file plus its processing state.
#[derive(Debug)]
pub struct FileItem {
    id: FileId,
    source: SourceFile,
    status: FileStatus,
    preview: Option<String>,
    error: Option<String>,
    page_errors: Vec<PageError>,
    page_count: Option<usize>,
}

impl FileItem {
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    /// PNG thumbnail as a `data:` URI, when one could be generated.
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    /// Human-readable failure message while in [`FileStatus::Error`].
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// PDF pages that failed during the last successful conversion.
    pub fn page_errors(&self) -> &[PageError] {
        &self.page_errors
    }

    /// Pages in the source document, once a PDF has been converted.
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }
}

/// Result of [`Session::add_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddFilesReport {
    /// Identifiers of the accepted files, in input order.
    pub added: Vec<FileId>,
    /// Number of files refused by the format/size allow-list.
    pub rejected: usize,
}

impl AddFilesReport {
    /// The aggregate validation error, if anything was rejected.
    pub fn validation_error(&self) -> Option<ImgKitError> {
        (self.rejected > 0).then_some(ImgKitError::Validation {
            rejected: self.rejected,
        })
    }
}

/// Cooperative cancellation for batch runs, checked between items.
///
/// Clones share the same flag. A file already being processed always
/// finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session-scoped state: selected files and their results.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    files: Vec<FileItem>,
    converted: Vec<ConvertedFile>,
    urls: UrlRegistry,
    next_id: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            files: Vec::new(),
            converted: Vec::new(),
            urls: UrlRegistry::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registry that issues this session's object URLs.
    pub fn urls(&self) -> &UrlRegistry {
        &self.urls
    }

    pub fn files(&self) -> &[FileItem] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&FileItem> {
        self.files.iter().find(|f| f.id == id)
    }

    /// All results, in the order they were produced.
    pub fn converted_files(&self) -> &[ConvertedFile] {
        &self.converted
    }

    /// Results produced by one file item (several for a multi-page PDF).
    pub fn converted_for(&self, id: FileId) -> impl Iterator<Item = &ConvertedFile> {
        self.converted.iter().filter(move |c| c.id() == id)
    }

    pub fn pending_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Pending)
            .count()
    }

    /// Validate and add files as `pending`.
    ///
    /// Files outside the format/size allow-list are skipped and counted; the
    /// rest are still added. Previews are generated when enabled.
    pub async fn add_files(&mut self, sources: Vec<SourceFile>) -> AddFilesReport {
        let mut report = AddFilesReport::default();

        for source in sources {
            if !is_accepted(&source, &self.config) {
                debug!("Rejected {} ({}, {} bytes)", source.name(), source.mime(), source.size());
                report.rejected += 1;
                continue;
            }

            let preview = if self.config.generate_previews && !source.is_pdf() {
                self.preview_for(&source).await
            } else {
                None
            };

            self.next_id += 1;
            let id = FileId(self.next_id);
            self.files.push(FileItem {
                id,
                source,
                status: FileStatus::Pending,
                preview,
                error: None,
                page_errors: Vec::new(),
                page_count: None,
            });
            report.added.push(id);
        }

        if let Some(e) = report.validation_error() {
            warn!("{}", e);
        }
        info!("Added {} file(s), {} pending", report.added.len(), self.pending_count());
        report
    }

    async fn preview_for(&self, source: &SourceFile) -> Option<String> {
        let image = match rasterize::decode(source, &self.urls).await {
            Ok(image) => image,
            Err(e) => {
                warn!("No preview for {}: {}", source.name(), e);
                return None;
            }
        };
        let max_edge = self.config.preview_size;
        let result = tokio::task::spawn_blocking(move || encode_preview(&image, max_edge)).await;
        match result {
            Ok(Ok(uri)) => Some(uri),
            Ok(Err(e)) => {
                warn!("No preview for {}: {}", source.name(), e);
                None
            }
            Err(e) => {
                warn!("Preview task for {} panicked: {}", source.name(), e);
                None
            }
        }
    }

    /// Run `operation` on one file.
    ///
    /// Returns the item's new status. Processing failures are not errors here:
    /// they leave the item in [`FileStatus::Error`] with a message. `Err` is
    /// only returned for an unknown `id` or invalid operation parameters, in
    /// which case nothing changes.
    pub async fn convert_single(
        &mut self,
        id: FileId,
        operation: &Operation,
    ) -> Result<FileStatus, ImgKitError> {
        operation.validate()?;
        let idx = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(ImgKitError::UnknownFile(id.0))?;
        Ok(self.process(idx, operation).await)
    }

    async fn process(&mut self, idx: usize, operation: &Operation) -> FileStatus {
        let cb = self.config.progress_callback.clone();
        let item = &mut self.files[idx];
        let id = item.id;
        let source = item.source.clone();

        item.status = FileStatus::Converting;
        item.error = None;
        item.page_errors.clear();
        item.page_count = None;
        if let Some(ref cb) = cb {
            cb.on_file_start(id, source.name());
        }
        info!("{} {} ({})", operation.name(), source.name(), source.mime());

        let result = operation.apply(&source, &self.urls).await;
        self.record(idx, result)
    }

    /// Store the outcome of one run on the item at `idx` and report it.
    fn record(&mut self, idx: usize, result: Result<Applied, ImgKitError>) -> FileStatus {
        let cb = self.config.progress_callback.clone();
        let id = self.files[idx].id;
        let source = self.files[idx].source.clone();

        // results from an earlier run of this item are superseded
        self.converted.retain(|c| c.id() != id);

        let item = &mut self.files[idx];
        match result {
            Ok(applied) => {
                let mut total = 0;
                for r in applied.renditions {
                    total += r.size();
                    let url = self.urls.create(r.size());
                    self.converted.push(ConvertedFile::new(
                        id,
                        source.name(),
                        source.size(),
                        r.name,
                        r.mime,
                        r.bytes,
                        r.dimensions,
                        r.page,
                        url,
                    ));
                }
                if let Some(ref cb) = cb {
                    for pe in &applied.page_errors {
                        cb.on_page_error(id, pe.page(), &pe.to_string());
                    }
                    cb.on_file_complete(id, source.name(), total);
                }
                item.page_errors = applied.page_errors;
                item.page_count = applied.total_pages;
                item.status = FileStatus::Converted;
                debug!("{} → converted ({} bytes)", source.name(), total);
            }
            Err(e) => {
                let message = e.to_string();
                warn!("{} failed: {}", source.name(), message);
                if let Some(ref cb) = cb {
                    cb.on_file_error(id, source.name(), &message);
                }
                item.error = Some(message);
                item.status = FileStatus::Error;
            }
        }
        item.status
    }

    /// Run `operation` on every `pending` file, one after another.
    pub async fn convert_all(&mut self, operation: &Operation) -> Result<BatchSummary, ImgKitError> {
        self.convert_all_with_cancel(operation, &CancelToken::new())
            .await
    }

    /// [`Session::convert_all`] with a cancellation token checked before each
    /// item. Files not reached stay `pending`.
    pub async fn convert_all_with_cancel(
        &mut self,
        operation: &Operation,
        cancel: &CancelToken,
    ) -> Result<BatchSummary, ImgKitError> {
        operation.validate()?;

        let pending: Vec<FileId> = self
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Pending)
            .map(|f| f.id)
            .collect();
        let total = pending.len();
        let mut summary = BatchSummary::default();

        if total == 0 {
            warn!("No pending files to {}", operation.name());
            return Ok(summary);
        }

        info!("Batch {}: {} file(s)", operation.name(), total);
        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_batch_start(total);
        }

        for (n, id) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.skipped = total - n;
                info!("Batch cancelled, {} file(s) left pending", summary.skipped);
                break;
            }
            if n > 0 && !self.config.inter_item_delay.is_zero() {
                tokio::time::sleep(self.config.inter_item_delay).await;
            }

            let Some(idx) = self.files.iter().position(|f| f.id == *id) else {
                continue;
            };
            self.process(idx, operation).await;
            tally(&mut summary, &self.files[idx]);
        }

        if let Some(ref cb) = cb {
            cb.on_batch_complete(total, summary.converted);
        }
        info!(
            "Batch {} done: {} converted, {} failed",
            operation.name(),
            summary.converted,
            summary.failed
        );
        Ok(summary)
    }

    /// Remove a file and everything it produced, releasing their URLs.
    pub fn remove_file(&mut self, id: FileId) -> Result<(), ImgKitError> {
        let idx = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(ImgKitError::UnknownFile(id.0))?;
        let item = self.files.remove(idx);
        self.converted.retain(|c| c.id() != id);
        debug!("Removed {} ({})", item.name(), id);
        Ok(())
    }

    /// Remove every file and result.
    pub fn clear_all(&mut self) {
        self.converted.clear();
        self.files.clear();
        debug!("Session cleared, {} live URL(s)", self.urls.live_count());
    }

    /// Package every converted file into `converted-images.zip`.
    pub fn download_all_as_zip(&self) -> Result<ArchiveBlob, ImgKitError> {
        build_archive(&self.converted)
    }
}

/// Count one processed item into a batch summary.
fn tally(summary: &mut BatchSummary, item: &FileItem) {
    summary.attempted += 1;
    match item.status {
        FileStatus::Converted => {
            summary.converted += 1;
            summary.page_errors.extend(item.page_errors.iter().cloned());
        }
        _ => summary.failed += 1,
    }
}
