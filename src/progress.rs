//! Progress-callback trait for batch extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as [`crate::extract::extract_batch`] works through its inputs.
//! Single calls to [`crate::extract::extract`] never fire callbacks.
//!
//! # Example
//!
//! ```rust
//! use receipt_extract::{ExtractionConfig, ExtractionProgressCallback, ExtractionStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     usable: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_receipt_complete(&self, index: usize, total: usize, status: ExtractionStatus, items: usize) {
//!         if status != ExtractionStatus::Failed {
//!             self.usable.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("Receipt {}/{}: {:?} ({} items)", index + 1, total, status, items);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     usable: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ExtractionStatus;
use std::sync::Arc;

/// Called by the batch entry point as it processes each response.
///
/// Implementations must be `Send + Sync`: receipts are extracted
/// concurrently on the blocking pool, so `on_receipt_start` and
/// `on_receipt_complete` may be called from different threads at once.
/// All methods have no-op defaults.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any response is processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before a response enters the pipeline.
    ///
    /// # Arguments
    /// * `index`: 0-indexed position in the batch input
    /// * `total`: batch size
    fn on_receipt_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a response has been fully processed.
    ///
    /// # Arguments
    /// * `index`: 0-indexed position in the batch input
    /// * `total`: batch size
    /// * `status`: outcome of the pipeline
    /// * `items`: number of line items in the record (0 when failed)
    fn on_receipt_complete(
        &self,
        index: usize,
        total: usize,
        status: ExtractionStatus,
        items: usize,
    ) {
        let _ = (index, total, status, items);
    }

    /// Called once after every response has been attempted.
    ///
    /// # Arguments
    /// * `total`: batch size
    /// * `usable`: results whose status is `ok` or `degraded`
    fn on_batch_complete(&self, total: usize, usable: usize) {
        let _ = (total, usable);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
