//! Cooperative cancellation and progress reporting.

use std::sync::atomic::{AtomicBool, Ordering};

/// Receives progress updates from long-running loops.
///
/// Returning `false` from [`Progress::update`] asks the engine to stop at
/// the next iteration boundary.
pub trait Progress {
    /// Report `done` of `total` steps of the named stage.
    fn update(&self, stage: &'static str, done: usize, total: usize) -> bool;
}

/// Progress sink that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&self, _stage: &'static str, _done: usize, _total: usize) -> bool {
        true
    }
}

/// Cancellation flag shared with another thread.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Create a flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Progress for CancelFlag {
    fn update(&self, _stage: &'static str, _done: usize, _total: usize) -> bool {
        !self.is_cancelled()
    }
}

impl<F> Progress for F
where
    F: Fn(&'static str, usize, usize) -> bool,
{
    fn update(&self, stage: &'static str, done: usize, total: usize) -> bool {
        self(stage, done, total)
    }
}
