//! Streaming API: yield each file's result as soon as it is processed.
//!
//! [`process_stream`] is the session-free counterpart of
//! [`crate::Session::convert_all`]. Files are still processed one at a time
//! and in input order, but callers can write each result to disk (or show it)
//! before the next file is decoded instead of holding the whole batch.

use crate::config::SessionConfig;
use crate::error::{ImgKitError, PageError};
use crate::locator::UrlRegistry;
use crate::operation::Operation;
use crate::output::ConvertedFile;
use crate::pipeline::input::{is_accepted, SourceFile};
use crate::session::FileId;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::{info, warn};

/// Everything produced for one input file.
#[derive(Debug)]
pub struct StreamResult {
    /// Position of the source in the input list, starting at 1.
    pub id: FileId,
    pub source_name: String,
    /// One entry, or one per page for a multi-page PDF.
    pub files: Vec<ConvertedFile>,
    pub page_errors: Vec<PageError>,
}

/// A boxed stream of per-file results.
pub type ResultStream = Pin<Box<dyn Stream<Item = Result<StreamResult, ImgKitError>> + Send>>;

/// Apply `operation` to `sources` in order, streaming results.
///
/// Files outside the config's allow-list produce an
/// [`ImgKitError::UnsupportedInput`] item; processing failures produce their
/// own error item. Neither ends the stream.
///
/// The config's progress callback receives the per-file and per-page events
/// as each item is produced. The batch events are not fired, since the
/// stream has no end the library can observe.
///
/// # Errors
/// Returns [`ImgKitError::InvalidConfig`] up front when the operation
/// parameters are out of range.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use imgkit::{process_stream, Operation, SessionConfig, SourceFile};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sources = vec![SourceFile::from_path("photo.png").await?];
/// let mut results = process_stream(sources, Operation::crop_square(), &SessionConfig::default())?;
/// while let Some(item) = results.next().await {
///     match item {
///         Ok(r) => println!("{} → {} output(s)", r.source_name, r.files.len()),
///         Err(e) => eprintln!("error: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_stream(
    sources: Vec<SourceFile>,
    operation: Operation,
    config: &SessionConfig,
) -> Result<ResultStream, ImgKitError> {
    operation.validate()?;
    info!("Streaming {} over {} file(s)", operation.name(), sources.len());

    let urls = UrlRegistry::new();
    let config = config.clone();

    let s = stream::iter(sources.into_iter().enumerate()).then(move |(idx, source)| {
        let urls = urls.clone();
        let operation = operation.clone();
        let config = config.clone();
        async move {
            if idx > 0 && !config.inter_item_delay.is_zero() {
                tokio::time::sleep(config.inter_item_delay).await;
            }
            let id = FileId(idx as u64 + 1);
            let cb = config.progress_callback.clone();

            if let Some(ref cb) = cb {
                cb.on_file_start(id, source.name());
            }
            let result = process_one(id, &source, &operation, &config, &urls).await;
            if let Some(ref cb) = cb {
                match &result {
                    Ok(r) => {
                        for pe in &r.page_errors {
                            cb.on_page_error(id, pe.page(), &pe.to_string());
                        }
                        let total: u64 = r.files.iter().map(|f| f.size()).sum();
                        cb.on_file_complete(id, source.name(), total);
                    }
                    Err(e) => cb.on_file_error(id, source.name(), &e.to_string()),
                }
            }
            result
        }
    });

    Ok(Box::pin(s))
}

async fn process_one(
    id: FileId,
    source: &SourceFile,
    operation: &Operation,
    config: &SessionConfig,
    urls: &UrlRegistry,
) -> Result<StreamResult, ImgKitError> {
    if !is_accepted(source, config) {
        warn!("Skipping {}: not accepted", source.name());
        return Err(ImgKitError::UnsupportedInput {
            name: source.name().to_string(),
            mime: source.mime().to_string(),
            operation: operation.name(),
        });
    }

    let applied = operation.apply(source, urls).await?;
    let files = applied
        .renditions
        .into_iter()
        .map(|r| {
            let url = urls.create(r.size());
            ConvertedFile::new(
                id,
                source.name(),
                source.size(),
                r.name,
                r.mime,
                r.bytes,
                r.dimensions,
                r.page,
                url,
            )
        })
        .collect();

    Ok(StreamResult {
        id,
        source_name: source.name().to_string(),
        files,
        page_errors: applied.page_errors,
    })
}
