use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::engine::{
    EngineOptions, ExtractionEngine, PostProcess, ProgressEvent, ProgressSink, ProgressStatus, StreamInfo,
};
use crate::error::{ErrorKind, Result};
use crate::quality::{self, FallbackLadder, FormatSelector, HostHint, QualitySelection};
use crate::stats::DownloadOutcome;

/// Hosts that only serve DRM-protected media; never worth an engine call.
const DRM_HOSTS: &[&str] = &["spotify.com"];

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn is_drm_host(url: &str) -> bool {
    let url = url.to_lowercase();
    DRM_HOSTS.iter().any(|host| url.contains(host))
}

/// One URL's work order, fixed before it is handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub url: String,
    pub selector: FormatSelector,
    pub ladder: FallbackLadder,
    pub audio_only: bool,
    pub worker_slot: usize,
}

/// Per-task progress tracker: counts bytes for throughput and optionally
/// drives a terminal progress bar.
pub struct TransferTracker {
    bar: ProgressBar,
    completed_bytes: u64,
    current_bytes: u64,
    filename: Option<String>,
}

impl TransferTracker {
    pub fn new(show_bar: bool) -> Self {
        let bar = if show_bar {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            completed_bytes: 0,
            current_bytes: 0,
            filename: None,
        }
    }

    pub fn bytes(&self) -> u64 {
        self.completed_bytes + self.current_bytes
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for TransferTracker {
    fn on_progress(&mut self, event: &ProgressEvent) {
        match event.status {
            ProgressStatus::Downloading => {
                if let Some(total) = event.total_bytes {
                    self.bar.set_length(total);
                }
                if let Some(downloaded) = event.downloaded_bytes {
                    self.current_bytes = downloaded;
                    self.bar.set_position(downloaded);
                }
            }
            ProgressStatus::Finished => match &event.filename {
                // The final merged file.
                Some(name) => {
                    self.filename = Some(name.clone());
                    if self.bytes() == 0 {
                        self.completed_bytes = event.total_bytes.unwrap_or(0);
                    }
                }
                // One stream of a multi-stream download.
                None => {
                    self.completed_bytes += event
                        .downloaded_bytes
                        .or(event.total_bytes)
                        .unwrap_or(self.current_bytes);
                    self.current_bytes = 0;
                }
            },
            ProgressStatus::Processing => {
                self.bar.set_message("processing");
            }
        }
    }
}

/// Runs a single URL through the extraction engine.
pub struct Downloader {
    engine: Arc<dyn ExtractionEngine>,
    downloads_dir: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    show_progress: bool,
}

impl Downloader {
    pub fn new(engine: Arc<dyn ExtractionEngine>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            downloads_dir: downloads_dir.into(),
            ffmpeg_location: None,
            show_progress: false,
        }
    }

    pub fn with_ffmpeg(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Engine options for a URL, including the per-platform overrides.
    pub fn options_for(&self, url: &str, selector: &FormatSelector, audio_only: bool) -> EngineOptions {
        let mut options = EngineOptions {
            format: selector.to_string(),
            output_template: self
                .downloads_dir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .to_string(),
            post_process: Some(if audio_only {
                PostProcess::mp3_320()
            } else {
                PostProcess::mp4_h264()
            }),
            headers: vec![("User-Agent".to_string(), DESKTOP_UA.to_string())],
            ffmpeg_location: self.ffmpeg_location.clone(),
            ..EngineOptions::default()
        };

        if HostHint::from_url(url) == HostHint::Pinterest {
            options.socket_timeout = Duration::from_secs(60);
            options.retries = 10;
            options.fragment_retries = 10;
            options.skip_unavailable_fragments = true;
            options.headers = vec![
                ("User-Agent".to_string(), BROWSER_UA.to_string()),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string(),
                ),
                ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
                ("Referer".to_string(), "https://www.pinterest.com/".to_string()),
            ];
        }

        options
    }

    /// Query the engine for title, uploader and available streams.
    pub fn info(&self, url: &str) -> Result<StreamInfo> {
        let options = self.options_for(url, &FormatSelector::new(quality::BEST), false);
        Ok(self.engine.extract(url, &options)?)
    }

    /// One engine attempt with one selector. Never retries.
    pub fn download(&self, url: &str, selector: &FormatSelector, audio_only: bool) -> DownloadOutcome {
        let start = Instant::now();

        if is_drm_host(url) {
            warn!(url, "DRM-protected source, skipping");
            return DownloadOutcome::failed(url, ErrorKind::DrmProtected, 0.0);
        }

        let options = self.options_for(url, selector, audio_only);
        let mut tracker = TransferTracker::new(self.show_progress);

        debug!(url, selector = %selector, "engine attempt");
        let result = self.engine.download(url, &options, &mut tracker);
        tracker.finish();
        let elapsed = start.elapsed().as_secs_f64();

        let mut outcome = match result {
            Ok(file) => {
                let bytes = match tracker.bytes() {
                    0 => file.bytes,
                    observed => observed,
                };
                let filename = tracker
                    .filename()
                    .map(str::to_string)
                    .unwrap_or_else(|| file.path.to_string_lossy().to_string());
                DownloadOutcome::succeeded(url, bytes, elapsed, Some(filename))
            }
            Err(e) => {
                let kind = ErrorKind::classify(&e.message);
                if kind == ErrorKind::Unknown {
                    warn!(url, selector = %selector, error = %e, "unrecognized engine error");
                } else {
                    info!(url, selector = %selector, kind = %kind, "engine attempt failed");
                }
                DownloadOutcome::failed(url, kind, elapsed)
            }
        };
        outcome.selector_used = Some(selector.to_string());
        outcome
    }

    pub fn plan(&self, url: &str, selection: QualitySelection, audio_only: bool, worker_slot: usize) -> DownloadTask {
        let audio_only = audio_only || selection.is_audio();
        let host = HostHint::from_url(url);
        DownloadTask {
            url: url.to_string(),
            selector: quality::primary_for(selection, audio_only, host),
            ladder: quality::ladder_for(selection, audio_only, host),
            audio_only,
            worker_slot,
        }
    }

    /// Primary selector, then the ladder in order until one succeeds.
    /// DRM failures stop immediately.
    pub fn run_task(&self, task: &DownloadTask) -> DownloadOutcome {
        let start = Instant::now();
        debug!(url = %task.url, slot = task.worker_slot, "task started");
        let mut attempts = 1;
        let mut outcome = self.download(&task.url, &task.selector, task.audio_only);

        if !outcome.success && outcome.error_kind.map_or(true, ErrorKind::is_retryable) {
            info!(url = %task.url, "first attempt failed, trying alternative qualities");
            for selector in &task.ladder {
                attempts += 1;
                outcome = self.download(&task.url, selector, task.audio_only);
                if outcome.success || !outcome.error_kind.map_or(true, ErrorKind::is_retryable) {
                    break;
                }
            }
        }

        outcome.attempts = attempts;
        outcome.elapsed_secs = start.elapsed().as_secs_f64();
        outcome
    }

    pub fn download_with_fallback(&self, url: &str, selection: QualitySelection, audio_only: bool) -> DownloadOutcome {
        let task = self.plan(url, selection, audio_only, 0);
        self.run_task(&task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    fn downloader(engine: Arc<FakeEngine>) -> Downloader {
        Downloader::new(engine, "/tmp/mediabatch-test")
    }

    #[test]
    fn test_succeeds_first_try() {
        let engine = Arc::new(FakeEngine::new());
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback("https://youtu.be/ok", QualitySelection::FullHd, false);
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.bytes, 1000);
        assert_eq!(
            engine.selectors_for("https://youtu.be/ok"),
            vec!["bestvideo[height<=1080]+bestaudio/best[height<=1080]".to_string()]
        );
    }

    #[test]
    fn test_drm_never_reaches_engine() {
        let engine = Arc::new(FakeEngine::new());
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback("https://open.spotify.com/track/1", QualitySelection::AudioOnly, true);
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::DrmProtected));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(engine.calls_for("https://open.spotify.com/track/1"), 0);
    }

    #[test]
    fn test_drm_error_from_engine_stops_ladder() {
        let url = "https://vimeo.com/locked";
        let engine = Arc::new(FakeEngine::new().script(url, vec![Err("ERROR: This video is DRM protected")]));
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback(url, QualitySelection::Hd, false);
        assert_eq!(outcome.error_kind, Some(ErrorKind::DrmProtected));
        assert_eq!(engine.calls_for(url), 1);
    }

    #[test]
    fn test_walks_ladder_until_success() {
        let url = "https://youtu.be/flaky";
        let engine = Arc::new(FakeEngine::new().script(
            url,
            vec![
                Err("ERROR: Requested format is not available"),
                Err("ERROR: Connection reset by peer"),
                Ok(4096),
            ],
        ));
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback(url, QualitySelection::UltraHd, false);
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.bytes, 4096);
        assert_eq!(outcome.selector_used.as_deref(), Some("best[height<=720]"));
    }

    #[test]
    fn test_exhausted_ladder_returns_last_failure() {
        let url = "https://youtu.be/broken";
        let mut script = vec![Err("ERROR: Requested format is not available"); 5];
        script.push(Err("ERROR: Read timed out."));
        let engine = Arc::new(FakeEngine::new().script(url, script));
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback(url, QualitySelection::Hd, false);
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NetworkOrTimeout));
        // primary + 5 ladder entries
        assert_eq!(engine.calls_for(url), 6);
        assert_eq!(outcome.attempts, 6);
    }

    #[test]
    fn test_unknown_errors_are_retried() {
        let url = "https://youtu.be/odd";
        let engine = Arc::new(FakeEngine::new().script(url, vec![Err("weird"), Ok(10)]));
        let d = downloader(engine.clone());
        let outcome = d.download_with_fallback(url, QualitySelection::Hd, false);
        assert!(outcome.success);
        assert_eq!(engine.calls_for(url), 2);
    }

    #[test]
    fn test_audio_plan() {
        let engine = Arc::new(FakeEngine::new());
        let d = downloader(engine);
        let task = d.plan("https://soundcloud.com/a/b", QualitySelection::FullHd, true, 3);
        assert!(task.audio_only);
        assert_eq!(task.selector.as_str(), "bestaudio/best");
        assert_eq!(task.ladder, vec![FormatSelector::new("bestaudio"), FormatSelector::new("best")]);
        assert_eq!(task.worker_slot, 3);
    }

    #[test]
    fn test_pinterest_overrides() {
        let engine = Arc::new(FakeEngine::new());
        let d = downloader(engine);
        let selector = FormatSelector::new("best");
        let options = d.options_for("https://www.pinterest.com/pin/1/", &selector, false);
        assert_eq!(options.socket_timeout, Duration::from_secs(60));
        assert_eq!(options.retries, 10);
        assert!(options.skip_unavailable_fragments);
        assert!(options.headers.iter().any(|(k, _)| k == "Referer"));

        let options = d.options_for("https://youtu.be/x", &selector, true);
        assert_eq!(options.socket_timeout, Duration::from_secs(30));
        assert_eq!(options.post_process, Some(PostProcess::mp3_320()));
        assert!(options.output_template.ends_with("%(title)s.%(ext)s"));
    }

    #[test]
    fn test_info() {
        let engine = Arc::new(FakeEngine::new());
        let d = downloader(engine.clone());
        let info = d.info("https://youtu.be/abc").unwrap();
        assert_eq!(info.title, "Title of https://youtu.be/abc");
        assert!(info.has_video);
        assert_eq!(engine.total_calls(), 0);
    }

    #[test]
    fn test_tracker_accumulates_streams() {
        let mut tracker = TransferTracker::new(false);
        tracker.on_progress(&ProgressEvent::downloading(500, Some(1000)));
        tracker.on_progress(&ProgressEvent::downloading(1000, Some(1000)));
        tracker.on_progress(&ProgressEvent {
            status: ProgressStatus::Finished,
            downloaded_bytes: Some(1000),
            total_bytes: Some(1000),
            filename: None,
        });
        tracker.on_progress(&ProgressEvent::downloading(200, Some(300)));
        assert_eq!(tracker.bytes(), 1200);

        tracker.on_progress(&ProgressEvent::finished("/tmp/x.mp4", Some(1250)));
        assert_eq!(tracker.bytes(), 1200);
        assert_eq!(tracker.filename(), Some("/tmp/x.mp4"));
    }
}
