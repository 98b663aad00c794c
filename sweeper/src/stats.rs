use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for a periodic sweeper
#[derive(Debug, Default)]
pub(crate) struct SweeperStats {
    /// Number of sweep passes performed
    runs: AtomicUsize,
    /// Number of sweep passes that returned an error
    failed_runs: AtomicUsize,
    /// Total number of entries reported as purged
    purged: AtomicUsize,
}

impl SweeperStats {
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::Relaxed)
    }

    pub(crate) fn failed_runs(&self) -> usize {
        self.failed_runs.load(Ordering::Relaxed)
    }

    pub(crate) fn purged(&self) -> usize {
        self.purged.load(Ordering::Relaxed)
    }

    /// Increments the run counter and returns the previous value
    pub(crate) fn increment_runs(&self) -> usize {
        self.runs.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn increment_failed_runs(&self) {
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_purged(&self, count: usize) {
        self.purged.fetch_add(count, Ordering::Relaxed);
    }
}
