use std::path::Path;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::StreamInfo;
use crate::library::LibraryStats;
use crate::scheduler::BatchObserver;
use crate::stats::{BatchStats, DownloadOutcome};

const TABLE_WIDTH: usize = 76;
const NAME_WIDTH: usize = 50;

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn format_elapsed(secs: f64) -> String {
    if secs >= 60.0 {
        format!("{}m {}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    } else {
        format!("{:.1}s", secs)
    }
}

pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{:.2} MB/s", bytes_per_sec / (1024.0 * 1024.0))
}

fn shorten(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let head: String = name.chars().take(NAME_WIDTH).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

fn rule() {
    println!("{}", style("═".repeat(TABLE_WIDTH)).green());
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", style(label).blue().bold(), value);
}

/// Overall bar for a batch: one tick per finished URL.
pub struct BatchProgressBar {
    bar: ProgressBar,
}

impl BatchProgressBar {
    pub fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            pb
        };
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BatchObserver for BatchProgressBar {
    fn on_outcome(&self, outcome: &DownloadOutcome, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
        if !outcome.success {
            let kind = outcome
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            self.bar.println(format!(
                "{} Failed ({}): {}",
                style("[mb]").red().bold(),
                kind,
                outcome.url
            ));
        }
    }
}

pub fn print_outcome(outcome: &DownloadOutcome, audio_only: bool, downloads_dir: &Path) {
    if !outcome.success {
        let kind = outcome
            .error_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        println!(
            "{} Download failed ({}) after {} attempt(s): {}",
            style("[mb]").red().bold(),
            kind,
            outcome.attempts,
            outcome.url
        );
        return;
    }

    let filename = outcome
        .final_filename
        .as_deref()
        .and_then(|f| Path::new(f).file_name())
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!();
    rule();
    println!("{:^width$}", style("DOWNLOAD COMPLETE").cyan().bold(), width = TABLE_WIDTH);
    rule();
    row("File Name", style(shorten(&filename)).white().bold());
    row("File Type", if audio_only { "Audio (MP3)" } else { "Video (MP4)" });
    row("File Size", format_size(outcome.bytes));
    row("Avg Speed", format_speed(outcome.throughput()));
    row("Time Taken", format_elapsed(outcome.elapsed_secs));
    if let Some(selector) = &outcome.selector_used {
        row("Format", style(selector).dim());
    }
    row("Location", style(downloads_dir.display()).yellow());
    rule();
}

pub fn print_batch(stats: &BatchStats, urls: &[String], downloads_dir: &Path) {
    println!();
    rule();
    println!("{:^width$}", style("BATCH DOWNLOAD COMPLETE").cyan().bold(), width = TABLE_WIDTH);
    rule();
    row("Total Files", stats.total);
    row("Successful", style(stats.successful).green());
    row(
        "Failed",
        if stats.failed > 0 {
            style(stats.failed).red()
        } else {
            style(stats.failed).dim()
        },
    );
    if stats.completed() < stats.total {
        row("Not Started", style(stats.total - stats.completed()).yellow());
    }
    row("Downloaded", format_size(stats.total_bytes));
    row("Avg Speed", format_speed(stats.average_throughput()));
    row("Location", style(downloads_dir.display()).yellow());

    let failures: Vec<_> = stats.failures_in(urls).collect();
    if !failures.is_empty() {
        println!();
        for outcome in failures {
            let kind = outcome
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            println!("  {} {} ({})", style("✗").red(), outcome.url, style(kind).dim());
        }
    }
    rule();
}

pub fn print_info(info: &StreamInfo) {
    println!();
    row("Title", style(&info.title).white().bold());
    row("Creator", &info.uploader);
    if let Some(duration) = info.duration {
        let secs = duration as u64;
        row("Duration", format!("{}:{:02}", secs / 60, secs % 60));
    }
    row("Formats", info.format_count);
    row("Video", if info.has_video { "yes" } else { "no" });
    row("Audio", if info.has_audio { "yes" } else { "no" });
}

pub fn print_library(stats: &LibraryStats, dir: &Path) {
    println!();
    row("Location", style(dir.display()).yellow());
    row("Video files", style(stats.videos).green());
    row("Audio files", style(stats.audios).green());
    row("Total files", style(stats.files).yellow());
    row("Total size", format_size(stats.total_bytes));

    if !stats.recent.is_empty() {
        println!();
        println!("{}", style("Recent downloads:").cyan().bold());
        for (i, entry) in stats.recent.iter().enumerate() {
            let name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            println!("  {}. {} ({})", i + 1, name, style(format_size(entry.bytes)).dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(12.34), "12.3s");
        assert_eq!(format_elapsed(125.0), "2m 5s");
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("short.mp4"), "short.mp4");
        let long = "x".repeat(60);
        assert_eq!(shorten(&long).len(), NAME_WIDTH + 3);
    }
}
