//! Progress-callback trait for per-document processing events.
//!
//! Inject an [`Arc<dyn InvoiceProgressCallback>`] via
//! [`crate::config::InvoiceConfigBuilder::progress_callback`] to receive
//! events as a batch is processed. The CLI uses this to drive its progress
//! bar.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice::{InvoiceConfig, InvoiceProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl InvoiceProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, path: &Path, outcome: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} -> {}", path.display(), outcome);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = InvoiceConfig::builder()
//!     .progress_callback(counter as Arc<dyn InvoiceProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes each upload.
///
/// Documents in a batch run concurrently, so the per-document methods may be
/// called from several tasks at once. All methods default to no-ops.
pub trait InvoiceProgressCallback: Send + Sync {
    /// Called once before a batch starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before text extraction begins for `path`.
    fn on_document_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called when a document produced an outcome.
    ///
    /// `outcome` is [`crate::output::InvoiceOutcome::label`]: `parsed`,
    /// `failed` or `no text`.
    fn on_document_complete(&self, path: &Path, outcome: &str) {
        let _ = (path, outcome);
    }

    /// Called when a document could not be processed at all.
    fn on_document_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called once after every document in the batch was attempted.
    ///
    /// `parsed_count` counts documents whose outcome is a decoded record.
    fn on_batch_complete(&self, total_documents: usize, parsed_count: usize) {
        let _ = (total_documents, parsed_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl InvoiceProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::InvoiceConfig`].
pub type ProgressCallback = Arc<dyn InvoiceProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        errors: AtomicUsize,
        outcomes: Mutex<Vec<String>>,
        batch_total: AtomicUsize,
        parsed_total: AtomicUsize,
    }

    impl InvoiceProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_documents: usize) {
            self.batch_total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_start(&self, _path: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _path: &Path, outcome: &str) {
            self.outcomes.lock().unwrap().push(outcome.to_string());
        }

        fn on_document_error(&self, _path: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_documents: usize, parsed_count: usize) {
            self.parsed_total.store(parsed_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(Path::new("a.pdf"));
        cb.on_document_complete(Path::new("a.pdf"), "parsed");
        cb.on_document_error(Path::new("b.gif"), "unsupported");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        tracker.on_document_start(Path::new("a.pdf"));
        tracker.on_document_complete(Path::new("a.pdf"), "parsed");
        tracker.on_document_start(Path::new("b.png"));
        tracker.on_document_complete(Path::new("b.png"), "no text");
        tracker.on_document_error(Path::new("c.gif"), "Unsupported format");
        tracker.on_batch_complete(3, 1);

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.outcomes.lock().unwrap(), vec!["parsed", "no text"]);
        assert_eq!(tracker.parsed_total.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(1);
        cb.on_document_start(Path::new("x.jpg"));
    }
}
