use std::sync::{Mutex, MutexGuard};

use crate::error::ErrorKind;

/// Result of one URL after its fallback ladder has run.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub url: String,
    pub success: bool,
    pub bytes: u64,
    pub elapsed_secs: f64,
    pub error_kind: Option<ErrorKind>,
    pub final_filename: Option<String>,
    /// Engine invocations spent on this URL.
    pub attempts: u32,
    /// Selector that produced this outcome.
    pub selector_used: Option<String>,
}

impl DownloadOutcome {
    pub fn succeeded(url: impl Into<String>, bytes: u64, elapsed_secs: f64, filename: Option<String>) -> Self {
        Self {
            url: url.into(),
            success: true,
            bytes,
            elapsed_secs,
            error_kind: None,
            final_filename: filename,
            attempts: 1,
            selector_used: None,
        }
    }

    pub fn failed(url: impl Into<String>, kind: ErrorKind, elapsed_secs: f64) -> Self {
        Self {
            url: url.into(),
            success: false,
            bytes: 0,
            elapsed_secs,
            error_kind: Some(kind),
            final_filename: None,
            attempts: 1,
            selector_used: None,
        }
    }

    /// Average throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub total_elapsed_secs: f64,
    pub outcomes: Vec<DownloadOutcome>,
}

impl BatchStats {
    pub fn completed(&self) -> usize {
        self.successful + self.failed
    }

    pub fn average_throughput(&self) -> f64 {
        if self.total_elapsed_secs > 0.0 {
            self.total_bytes as f64 / self.total_elapsed_secs
        } else {
            0.0
        }
    }

    /// Look up the outcome for a URL. Outcomes arrive in completion order, so
    /// never match by position.
    pub fn outcome_for(&self, url: &str) -> Option<&DownloadOutcome> {
        self.outcomes.iter().find(|o| o.url == url)
    }

    /// Failed outcomes in the order `urls` were submitted.
    pub fn failures_in<'a>(&'a self, urls: &'a [String]) -> impl Iterator<Item = &'a DownloadOutcome> + 'a {
        urls.iter()
            .filter_map(move |url| self.outcome_for(url))
            .filter(|o| !o.success)
    }
}

/// Thread-safe accumulator shared by all workers of a batch.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<BatchStats>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BatchStats> {
        // Nothing panics between the first and last write of an update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn reset(&self, total_expected: usize) {
        let mut stats = self.lock();
        *stats = BatchStats {
            total: total_expected,
            ..BatchStats::default()
        };
    }

    /// Apply one outcome; returns the number of outcomes recorded so far.
    pub fn record(&self, outcome: DownloadOutcome) -> usize {
        let mut stats = self.lock();
        if outcome.success {
            stats.successful += 1;
        } else {
            stats.failed += 1;
        }
        stats.total_bytes += outcome.bytes;
        stats.total_elapsed_secs += outcome.elapsed_secs;
        stats.outcomes.push(outcome);
        stats.outcomes.len()
    }

    pub fn snapshot(&self) -> BatchStats {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = StatsAggregator::new();
        stats.reset(2);
        stats.record(DownloadOutcome::succeeded("a", 1000, 2.0, Some("a.mp4".into())));
        stats.record(DownloadOutcome::failed("b", ErrorKind::NetworkOrTimeout, 1.0));

        let snap = stats.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.successful, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.total_bytes, 1000);
        assert_eq!(snap.total_elapsed_secs, 3.0);
        assert_eq!(snap.completed(), snap.outcomes.len());
        assert_eq!(snap.outcome_for("b").unwrap().error_kind, Some(ErrorKind::NetworkOrTimeout));
    }

    #[test]
    fn test_failures_follow_submission_order() {
        let stats = StatsAggregator::new();
        stats.reset(4);
        stats.record(DownloadOutcome::failed("d", ErrorKind::FormatUnavailable, 0.1));
        stats.record(DownloadOutcome::succeeded("c", 5, 0.1, None));
        stats.record(DownloadOutcome::failed("a", ErrorKind::DrmProtected, 0.0));

        let submitted: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let snap = stats.snapshot();
        let failed: Vec<&str> = snap.failures_in(&submitted).map(|o| o.url.as_str()).collect();
        assert_eq!(failed, vec!["a", "d"]);
    }

    #[test]
    fn test_snapshot_idempotent() {
        let stats = StatsAggregator::new();
        stats.reset(1);
        stats.record(DownloadOutcome::succeeded("a", 10, 0.5, None));
        assert_eq!(stats.snapshot(), stats.snapshot());
    }

    #[test]
    fn test_reset_clears() {
        let stats = StatsAggregator::new();
        stats.reset(1);
        stats.record(DownloadOutcome::succeeded("a", 10, 0.5, None));
        stats.reset(5);
        let snap = stats.snapshot();
        assert_eq!(snap.total, 5);
        assert_eq!(snap.completed(), 0);
        assert!(snap.outcomes.is_empty());
        assert_eq!(snap.total_bytes, 0);
    }

    #[test]
    fn test_concurrent_record_is_atomic() {
        let stats = Arc::new(StatsAggregator::new());
        stats.reset(1000);
        let outcome = DownloadOutcome::succeeded("https://youtu.be/x", 7, 0.25, None);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = stats.clone();
                let outcome = outcome.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record(outcome.clone());
                        let snap = stats.snapshot();
                        assert_eq!(snap.completed(), snap.outcomes.len());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.successful, 1000);
        assert_eq!(snap.outcomes.len(), 1000);
        assert_eq!(snap.total_bytes, 7000);
    }

    #[test]
    fn test_throughput() {
        let outcome = DownloadOutcome::succeeded("a", 2048, 2.0, None);
        assert_eq!(outcome.throughput(), 1024.0);
        let outcome = DownloadOutcome::failed("b", ErrorKind::Unknown, 0.0);
        assert_eq!(outcome.throughput(), 0.0);
    }
}
