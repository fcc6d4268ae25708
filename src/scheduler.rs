//! Concurrent batch download scheduling.
//!
//! Every URL becomes one [`DownloadTask`](crate::downloader::DownloadTask)
//! executed on tokio's blocking pool. The number of tasks in flight is bounded
//! by `buffer_unordered`: a task's future (and therefore its blocking job) is
//! only created when the stream pulls it, so at most `worker_budget` of them
//! exist at any moment.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::downloader::Downloader;
use crate::error::ErrorKind;
use crate::quality::QualitySelection;
use crate::stats::{BatchStats, DownloadOutcome, StatsAggregator};

const MIN_WORKERS: usize = 4;
const MAX_WORKERS: usize = 8;

/// Host parallelism clamped to 4..=8.
pub fn default_worker_budget() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Notified after each outcome is recorded.
pub trait BatchObserver: Send + Sync {
    fn on_outcome(&self, outcome: &DownloadOutcome, completed: usize, total: usize);
}

pub struct BatchScheduler {
    downloader: Arc<Downloader>,
    stats: Arc<StatsAggregator>,
    cancel: CancellationToken,
    observer: Option<Arc<dyn BatchObserver>>,
}

impl BatchScheduler {
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self {
            downloader,
            stats: Arc::new(StatsAggregator::new()),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Once `token` is cancelled no further URLs are submitted; downloads
    /// already running finish and are recorded.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Download every URL with at most `worker_budget` downloads in flight.
    /// `urls` must already be validated.
    pub async fn run_batch(
        &self,
        urls: &[String],
        selection: QualitySelection,
        audio_only: bool,
        worker_budget: usize,
    ) -> BatchStats {
        let budget = worker_budget.max(1);
        let total = urls.len();
        self.stats.reset(total);

        info!(total, workers = budget, quality = %selection, audio_only, "starting batch");

        let cancel = self.cancel.clone();
        stream::iter(urls.iter().cloned().enumerate())
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|(index, url)| {
                let downloader = self.downloader.clone();
                let task = downloader.plan(&url, selection, audio_only, index % budget);
                async move {
                    match tokio::task::spawn_blocking(move || downloader.run_task(&task)).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!(url = %url, error = %e, "download task aborted");
                            DownloadOutcome::failed(url, ErrorKind::Unknown, 0.0)
                        }
                    }
                }
            })
            .buffer_unordered(budget)
            .for_each(|outcome| {
                let completed = self.stats.record(outcome.clone());
                if let Some(observer) = &self.observer {
                    observer.on_outcome(&outcome, completed, total);
                }
                future::ready(())
            })
            .await;

        let stats = self.stats.snapshot();
        if self.cancel.is_cancelled() {
            info!(completed = stats.completed(), total, "batch cancelled");
        }
        info!(
            successful = stats.successful,
            failed = stats.failed,
            bytes = stats.total_bytes,
            "batch finished"
        );
        stats
    }
}
