//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn SessionProgressCallback>`] via
//! [`crate::config::SessionConfigBuilder::progress_callback`] to be told when
//! files start, finish or fail. This is the notification channel for a host
//! UI: a terminal progress bar, toast messages, a log.
//!
//! # Example
//!
//! ```rust
//! use imgkit::{FileId, SessionConfig, SessionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl SessionProgressCallback for Counter {
//!     fn on_file_complete(&self, _id: FileId, name: &str, bytes: u64) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name}: {bytes} bytes");
//!     }
//! }
//!
//! let config = SessionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::session::FileId;
use std::sync::Arc;

/// Called by the session as it processes files.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed one at a time, but the trait is
/// `Send + Sync` so one callback can be shared with other tasks.
pub trait SessionProgressCallback: Send + Sync {
    /// Called once before the first file of `convert_all`.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file enters `converting`.
    fn on_file_start(&self, id: FileId, name: &str) {
        let _ = (id, name);
    }

    /// Called when a file reaches `converted`.
    ///
    /// `output_bytes` is the total size of everything produced for the file.
    fn on_file_complete(&self, id: FileId, name: &str, output_bytes: u64) {
        let _ = (id, name, output_bytes);
    }

    /// Called when a file reaches `error`.
    fn on_file_error(&self, id: FileId, name: &str, error: &str) {
        let _ = (id, name, error);
    }

    /// Called for each PDF page that failed while the rest of the document
    /// converted.
    fn on_page_error(&self, id: FileId, page: usize, error: &str) {
        let _ = (id, page, error);
    }

    /// Called once after every pending file has been attempted.
    fn on_batch_complete(&self, total_files: usize, converted: usize) {
        let _ = (total_files, converted);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SessionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SessionConfig`].
pub type ProgressCallback = Arc<dyn SessionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
    }

    impl SessionProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_files: usize) {
            self.batch_total.store(total_files, Ordering::SeqCst);
        }

        fn on_file_start(&self, _id: FileId, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _id: FileId, _name: &str, _bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _id: FileId, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(FileId(1), "a.png");
        cb.on_file_complete(FileId(1), "a.png", 10);
        cb.on_file_error(FileId(2), "b.png", "boom");
        cb.on_page_error(FileId(2), 3, "bad page");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        tracker.on_file_start(FileId(1), "a");
        tracker.on_file_complete(FileId(1), "a", 100);
        tracker.on_file_start(FileId(2), "b");
        tracker.on_file_error(FileId(2), "b", "decode");
        tracker.on_file_start(FileId(3), "c");
        tracker.on_file_complete(FileId(3), "c", 1);

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_batch_complete(1, 1);
    }
}
