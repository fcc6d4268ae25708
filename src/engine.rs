//! Boundary to the external media-extraction engine.
//!
//! [`ExtractionEngine`] is what the downloader talks to; [`YtDlpEngine`]
//! drives a `yt-dlp` subprocess and turns its line-oriented output into
//! [`ProgressEvent`]s.

use std::env;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{EngineError, Error, Result};

const PROGRESS_PREFIX: &str = "mbprog";
const FILE_PREFIX: &str = "mbfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Processing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub filename: Option<String>,
}

impl ProgressEvent {
    #[cfg(test)]
    pub fn downloading(downloaded: u64, total: Option<u64>) -> Self {
        Self {
            status: ProgressStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            filename: None,
        }
    }

    pub fn finished(filename: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            status: ProgressStatus::Finished,
            downloaded_bytes: total,
            total_bytes: total,
            filename: Some(filename.into()),
        }
    }
}

/// Receives progress events for one download.
pub trait ProgressSink: Send {
    fn on_progress(&mut self, event: &ProgressEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    /// Transcode to a single audio file.
    ExtractAudio { codec: String, bitrate_kbps: u32 },
    /// Merge/convert into one container, discarding intermediate streams.
    MergeVideo {
        container: String,
        video_codec: String,
        audio_codec: String,
    },
}

impl PostProcess {
    pub fn mp3_320() -> Self {
        Self::ExtractAudio {
            codec: "mp3".to_string(),
            bitrate_kbps: 320,
        }
    }

    pub fn mp4_h264() -> Self {
        Self::MergeVideo {
            container: "mp4".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub format: String,
    pub output_template: String,
    pub post_process: Option<PostProcess>,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub fragment_retries: u32,
    pub skip_unavailable_fragments: bool,
    pub headers: Vec<(String, String)>,
    pub ffmpeg_location: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            format: "best".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
            post_process: None,
            socket_timeout: Duration::from_secs(30),
            retries: 5,
            fragment_retries: 5,
            skip_unavailable_fragments: false,
            headers: Vec::new(),
            ffmpeg_location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub title: String,
    pub uploader: String,
    pub duration: Option<f64>,
    pub format_count: usize,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub bytes: u64,
}

pub trait ExtractionEngine: Send + Sync {
    fn extract(&self, url: &str, options: &EngineOptions) -> std::result::Result<StreamInfo, EngineError>;

    fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        sink: &mut dyn ProgressSink,
    ) -> std::result::Result<LocalFile, EngineError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    binary: PathBuf,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check that the engine runs. Safe to call repeatedly.
    pub fn probe(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::EngineUnavailable(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(Error::EngineUnavailable(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(engine = %self.binary.display(), %version, "extraction engine ready");
        Ok(version)
    }

    fn common_args(options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificates".to_string(),
            "--socket-timeout".to_string(),
            options.socket_timeout.as_secs().to_string(),
        ];
        for (name, value) in &options.headers {
            args.push("--add-headers".to_string());
            args.push(format!("{}:{}", name, value));
        }
        args
    }

    fn download_args(url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = Self::common_args(options);
        args.extend([
            "-f".to_string(),
            options.format.clone(),
            "-o".to_string(),
            options.output_template.clone(),
            "--retries".to_string(),
            options.retries.to_string(),
            "--fragment-retries".to_string(),
            options.fragment_retries.to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_PREFIX
            ),
            "--progress-template".to_string(),
            format!("postprocess:{} processing NA NA NA", PROGRESS_PREFIX),
            "--print".to_string(),
            format!("after_move:{} %(filepath)s", FILE_PREFIX),
        ]);

        if options.skip_unavailable_fragments {
            args.push("--skip-unavailable-fragments".to_string());
        }

        if let Some(loc) = &options.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(loc.to_string_lossy().to_string());
        }

        match &options.post_process {
            Some(PostProcess::ExtractAudio {
                codec,
                bitrate_kbps,
            }) => {
                args.extend([
                    "--extract-audio".to_string(),
                    "--audio-format".to_string(),
                    codec.clone(),
                    "--audio-quality".to_string(),
                    format!("{}K", bitrate_kbps),
                ]);
            }
            Some(PostProcess::MergeVideo {
                container,
                video_codec,
                audio_codec,
            }) => {
                args.extend([
                    "--merge-output-format".to_string(),
                    container.clone(),
                    "--recode-video".to_string(),
                    container.clone(),
                    "--embed-metadata".to_string(),
                    "--postprocessor-args".to_string(),
                    format!(
                        "ffmpeg:-loglevel error -c:v {} -c:a {} -strict -2",
                        video_codec, audio_codec
                    ),
                ]);
            }
            None => {}
        }

        args.push(url.to_string());
        args
    }
}

impl ExtractionEngine for YtDlpEngine {
    fn extract(&self, url: &str, options: &EngineOptions) -> std::result::Result<StreamInfo, EngineError> {
        let mut args = Self::common_args(options);
        args.extend([
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            url.to_string(),
        ]);

        debug!(url, "extracting stream info");
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::new(format!("failed to start yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(engine_failure(&stderr, output.status.code()));
        }

        parse_stream_info(&output.stdout)
    }

    fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        sink: &mut dyn ProgressSink,
    ) -> std::result::Result<LocalFile, EngineError> {
        let args = Self::download_args(url, options);
        debug!(url, format = %options.format, "starting yt-dlp");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::new(format!("failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::new("no stdout from yt-dlp"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::new("no stderr from yt-dlp"))?;

        // Drain stderr on its own thread so a chatty engine cannot block on a full pipe.
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut final_path: Option<PathBuf> = None;
        let mut last_total: Option<u64> = None;

        // Lines are read as bytes: file paths follow the console encoding,
        // which is not always UTF-8.
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(url, error = %e, "stopped reading yt-dlp output");
                    break;
                }
            }

            let line = buf.trim_ascii();
            if let Some(path) = line.strip_prefix(FILE_PREFIX.as_bytes()).map(<[u8]>::trim_ascii) {
                if !path.is_empty() {
                    final_path = Some(path_from_bytes(path));
                }
                continue;
            }
            if let Some(event) = parse_progress_line(&String::from_utf8_lossy(line)) {
                if event.total_bytes.is_some() {
                    last_total = event.total_bytes;
                }
                sink.on_progress(&event);
            }
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::new(format!("yt-dlp process failed: {}", e)))?;
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(engine_failure(&stderr, status.code()));
        }

        let path = final_path.ok_or_else(|| {
            EngineError::new("yt-dlp finished without reporting an output file")
        })?;
        let bytes = std::fs::metadata(&path)
            .map(|m| m.len())
            .ok()
            .or(last_total)
            .unwrap_or(0);

        sink.on_progress(&ProgressEvent::finished(path.to_string_lossy(), Some(bytes)));
        Ok(LocalFile { path, bytes })
    }
}

/// Locate an executable `ffmpeg` on `PATH`.
pub fn find_ffmpeg() -> Option<PathBuf> {
    find_executable("ffmpeg", env::var_os("PATH"))
}

fn find_executable(name: &str, search_path: Option<OsString>) -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    match which::which_in(name, search_path, cwd) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(name, error = %e, "executable not found");
            None
        }
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn engine_failure(stderr: &str, code: Option<i32>) -> EngineError {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .collect();

    let message = if !errors.is_empty() {
        errors.join("\n")
    } else if let Some(last) = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        last.to_string()
    } else {
        match code {
            Some(c) => format!("yt-dlp exited with status {}", c),
            None => "yt-dlp was terminated by a signal".to_string(),
        }
    };

    EngineError::new(message)
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"^{}\s+(\w+)\s+(\S+)\s+(\S+)\s+(\S+)\s*$", PROGRESS_PREFIX))
            .expect("progress pattern is valid")
    })
}

fn parse_bytes(field: &str) -> Option<u64> {
    field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64)
}

/// Parse one line produced by our `--progress-template`.
fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let caps = progress_regex().captures(line.trim())?;

    let status = match &caps[1] {
        "downloading" => ProgressStatus::Downloading,
        "finished" => ProgressStatus::Finished,
        "processing" => ProgressStatus::Processing,
        _ => return None,
    };

    let downloaded_bytes = parse_bytes(&caps[2]);
    let total_bytes = parse_bytes(&caps[3]).or_else(|| parse_bytes(&caps[4]));

    Some(ProgressEvent {
        status,
        downloaded_bytes,
        total_bytes,
        filename: None,
    })
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

fn parse_stream_info(json: &[u8]) -> std::result::Result<StreamInfo, EngineError> {
    let raw: RawInfo = serde_json::from_slice(json)
        .map_err(|e| EngineError::new(format!("unexpected yt-dlp JSON: {}", e)))?;

    Ok(StreamInfo {
        title: raw.title.unwrap_or_else(|| "Unknown Title".to_string()),
        uploader: raw.uploader.unwrap_or_else(|| "Unknown Uploader".to_string()),
        duration: raw.duration,
        format_count: raw.formats.len(),
        has_video: raw.formats.iter().any(|f| has_codec(&f.vcodec)),
        has_audio: raw.formats.iter().any(|f| has_codec(&f.acodec)),
    })
}
