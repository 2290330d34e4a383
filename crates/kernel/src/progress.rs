use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives progress from long-running save/restore tasks.
pub trait ProgressReporter: Send + Sync {
    fn begin_task(&self, name: &str, total_work: u64);

    fn sub_task(&self, _name: &str) {}

    fn worked(&self, units: u64);

    fn done(&self);

    /// Polled between items; an item in flight is never interrupted.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn begin_task(&self, _name: &str, _total_work: u64) {}
    fn worked(&self, _units: u64) {}
    fn done(&self) {}
}

/// Shared cancellation flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Emits progress as `tracing` events and honours a [`CancelToken`].
#[derive(Debug, Default)]
pub struct LoggingProgress {
    total: AtomicU64,
    completed: AtomicU64,
    cancel: CancelToken,
}

impl LoggingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for LoggingProgress {
    fn begin_task(&self, name: &str, total_work: u64) {
        self.total.store(total_work, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        tracing::info!(task = name, total_work, "task started");
    }

    fn sub_task(&self, name: &str) {
        tracing::debug!(sub_task = name);
    }

    fn worked(&self, units: u64) {
        let done = self.completed.fetch_add(units, Ordering::Relaxed) + units;
        tracing::trace!(done, total = self.total.load(Ordering::Relaxed), "progress");
    }

    fn done(&self) {
        tracing::info!(completed = self.completed(), "task finished");
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_progress_counts_work() {
        let progress = LoggingProgress::new();
        progress.begin_task("restore", 10);
        progress.worked(3);
        progress.worked(2);
        assert_eq!(progress.completed(), 5);
        progress.done();
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let progress = LoggingProgress::with_cancel(token.clone());
        assert!(!progress.is_cancelled());
        token.cancel();
        assert!(progress.is_cancelled());
        assert!(!NullProgress.is_cancelled());
    }
}
