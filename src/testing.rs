//! Scripted extraction engine used by unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::engine::{EngineOptions, ExtractionEngine, LocalFile, ProgressEvent, ProgressSink, StreamInfo};
use crate::error::EngineError;

const DEFAULT_BYTES: u64 = 1000;

/// Answers each URL from a per-URL script (bytes on success, error text on
/// failure), defaulting to success once the script runs out. Records every
/// call and the highest number of concurrent calls seen.
#[derive(Default)]
pub struct FakeEngine {
    scripts: Mutex<HashMap<String, Vec<Result<u64, &'static str>>>>,
    calls: Mutex<HashMap<String, Vec<String>>>,
    delay: Duration,
    panic_on: Option<String>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, mut responses: Vec<Result<u64, &'static str>>) -> Self {
        responses.reverse();
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).map_or(0, Vec::len)
    }

    pub fn selectors_for(&self, url: &str) -> Vec<String> {
        self.calls.lock().unwrap().get(url).cloned().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

impl ExtractionEngine for FakeEngine {
    fn extract(&self, url: &str, _options: &EngineOptions) -> Result<StreamInfo, EngineError> {
        Ok(StreamInfo {
            title: format!("Title of {}", url),
            uploader: "Uploader".to_string(),
            duration: Some(90.0),
            format_count: 3,
            has_video: true,
            has_audio: true,
        })
    }

    fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        sink: &mut dyn ProgressSink,
    ) -> Result<LocalFile, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.high_water.fetch_max(now, Ordering::SeqCst);

        self.calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(options.format.clone());

        if self.panic_on.as_deref() == Some(url) {
            panic!("fake engine exploded on {}", url);
        }

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let response = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(Vec::pop)
            .unwrap_or(Ok(DEFAULT_BYTES));

        match response {
            Ok(bytes) => {
                sink.on_progress(&ProgressEvent::downloading(bytes / 2, Some(bytes)));
                sink.on_progress(&ProgressEvent::downloading(bytes, Some(bytes)));
                let path = PathBuf::from(format!("{}.mp4", url.rsplit('/').next().unwrap_or("media")));
                sink.on_progress(&ProgressEvent::finished(path.to_string_lossy(), Some(bytes)));
                Ok(LocalFile { path, bytes })
            }
            Err(message) => Err(EngineError::new(message)),
        }
    }
}
