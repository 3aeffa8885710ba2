//! Lightweight service counters surfaced through the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing proxy activity.
///
/// Intentionally minimal, just atomic counters, so the struct can be shared freely and
/// queried without holding locks.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_uploaded: AtomicU64,
    questions_answered: AtomicU64,
    backend_restarts: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed upload.
    pub fn record_upload(&self) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record answered questions (batch endpoints count each entry).
    pub fn record_questions(&self, count: u64) {
        self.questions_answered.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a tool-server restart.
    pub fn record_restart(&self) {
        self.backend_restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            backend_restarts: self.backend_restarts.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// PDFs uploaded since startup.
    pub documents_uploaded: u64,
    /// Questions answered since startup.
    pub questions_answered: u64,
    /// Tool-server restarts since startup.
    pub backend_restarts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ServiceMetrics::new();
        metrics.record_upload();
        metrics.record_questions(3);
        metrics.record_questions(1);
        metrics.record_restart();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_uploaded, 1);
        assert_eq!(snapshot.questions_answered, 4);
        assert_eq!(snapshot.backend_restarts, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let snapshot = ServiceMetrics::new().snapshot();
        assert_eq!(snapshot.documents_uploaded, 0);
        assert_eq!(snapshot.questions_answered, 0);
        assert_eq!(snapshot.backend_restarts, 0);
    }
}
