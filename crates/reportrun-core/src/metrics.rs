//! Global atomic counters for run orchestration.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI invocation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    runs_dispatched: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    entries_dropped: AtomicU64,
    retry_rounds: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_dispatched: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            entries_dropped: AtomicU64::new(0),
            retry_rounds: AtomicU64::new(0),
        }
    }

    /// Add `n` runs to the dispatched counter.
    pub fn add_dispatched(&self, n: u64) {
        self.runs_dispatched.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "runs_dispatched", n, "counter incremented");
    }

    /// Record the outcome of a single run.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A successful outcome could not be normalised.
    pub fn inc_dropped(&self) {
        self.entries_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "entries_dropped", "counter incremented");
    }

    /// A shortfall round was issued by the retry driver.
    pub fn inc_retry_rounds(&self) {
        self.retry_rounds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retry_rounds", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_dispatched = self.runs_dispatched(),
            runs_succeeded = self.runs_succeeded(),
            runs_failed = self.runs_failed(),
            entries_dropped = self.entries_dropped(),
            retry_rounds = self.retry_rounds(),
        );
    }

    pub fn runs_dispatched(&self) -> u64 {
        self.runs_dispatched.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> u64 {
        self.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn entries_dropped(&self) -> u64 {
        self.entries_dropped.load(Ordering::Relaxed)
    }

    pub fn retry_rounds(&self) -> u64 {
        self.retry_rounds.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_dispatched.store(0, Ordering::Relaxed);
        self.runs_succeeded.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.entries_dropped.store(0, Ordering::Relaxed);
        self.retry_rounds.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.add_dispatched(5);
        m.record_outcome(true);
        m.record_outcome(false);
        m.record_outcome(false);
        m.inc_dropped();
        m.inc_retry_rounds();

        assert_eq!(m.runs_dispatched(), 5);
        assert_eq!(m.runs_succeeded(), 1);
        assert_eq!(m.runs_failed(), 2);
        assert_eq!(m.entries_dropped(), 1);
        assert_eq!(m.retry_rounds(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_dispatched(3);
        m.record_outcome(true);
        m.inc_retry_rounds();
        m.reset();
        assert_eq!(m.runs_dispatched(), 0);
        assert_eq!(m.runs_succeeded(), 0);
        assert_eq!(m.retry_rounds(), 0);
    }
}
