//! Progress reporting for the per-row loops.
//!
//! Pipelines report through [`ProgressCallback`] and never touch a
//! terminal directly. The `indicatif` implementation lives in
//! `snow_posts_cli_utils`.

use std::sync::Arc;

/// Receiver for progress updates of a long-running loop.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of units the loop will process.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the loop as done.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
