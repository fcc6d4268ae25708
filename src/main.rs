mod banner;
mod config;
mod downloader;
mod engine;
mod error;
mod library;
mod logging;
mod quality;
mod report;
mod scheduler;
mod stats;
mod urls;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::Config;
use downloader::Downloader;
use engine::YtDlpEngine;
use error::Error;
use quality::QualitySelection;
use report::BatchProgressBar;
use scheduler::BatchScheduler;
use urls::{HttpResolver, UrlValidator};

#[derive(Parser, Debug, Clone)]
#[command(name = "mediabatch")]
#[command(version)]
#[command(about = "Download media from 20+ platforms, many at a time", long_about = None)]
struct Args {
    /// Media URLs (YouTube, TikTok, Instagram, X, Vimeo, SoundCloud, ...)
    urls: Vec<String>,

    /// Batch file containing URLs (one per line, # for comments)
    #[arg(short, long)]
    batch_file: Option<PathBuf>,

    /// Quality: 4k, 1440, 1080, 720, 480, 360, 240, 144 or audio
    #[arg(short = 'f', long, default_value = "1080")]
    quality: QualitySelection,

    /// Download audio only (MP3 320kbps)
    #[arg(short, long)]
    audio_only: bool,

    /// Number of concurrent downloads (default: CPU count clamped to 4-8)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Output directory for downloads
    #[arg(short = 'O', long)]
    output_dir: Option<PathBuf>,

    /// Show media information without downloading
    #[arg(short, long)]
    info: bool,

    /// Show statistics for the download directory and exit
    #[arg(long)]
    stats: bool,

    /// Path to the yt-dlp binary
    #[arg(long)]
    yt_dlp: Option<PathBuf>,

    /// Be quiet (minimal output)
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> Config {
        let audio_only = self.audio_only || self.quality.is_audio();
        Config {
            downloads_dir: self
                .output_dir
                .clone()
                .unwrap_or_else(config::default_downloads_dir),
            quality: self.quality,
            audio_only,
            jobs: self.jobs.unwrap_or_else(scheduler::default_worker_budget).max(1),
            quiet: self.quiet,
            engine_binary: self.yt_dlp.clone().unwrap_or_else(config::engine_binary),
            ffmpeg_location: engine::find_ffmpeg(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose, console::colors_enabled_stderr());

    if !args.quiet {
        banner::print_banner();
    }

    let config = args.config();

    if args.stats {
        let stats = library::scan(&config.downloads_dir)
            .with_context(|| format!("cannot read {}", config.downloads_dir.display()))?;
        report::print_library(&stats, &config.downloads_dir);
        return Ok(());
    }

    let mut raw_urls = args.urls.clone();
    if let Some(batch_file) = &args.batch_file {
        let content = std::fs::read_to_string(batch_file)
            .with_context(|| format!("cannot read batch file {}", batch_file.display()))?;
        raw_urls.extend(urls::parse_url_list(&content));
    }
    if raw_urls.is_empty() {
        return Err(Error::EmptyBatch.into());
    }

    let engine = YtDlpEngine::new(&config.engine_binary);
    engine
        .probe()
        .context("install yt-dlp or point --yt-dlp / MEDIABATCH_YTDLP at it")?;
    if config.ffmpeg_location.is_none() {
        warn!("ffmpeg not found on PATH; merging and audio conversion may fail");
    }

    let validator = UrlValidator::new(HttpResolver::new()?);
    let validated = validator.validate_all(&raw_urls).await;
    for rejected in &validated.rejected {
        eprintln!(
            "{} Skipping unsupported URL: {}",
            style("[mb]").yellow().bold(),
            rejected
        );
    }
    for valid in validated.accepted.iter().filter(|v| v.resolved_from.is_some()) {
        info!(url = %valid.url, "using resolved short link");
    }
    let urls = validated.urls();
    if urls.is_empty() {
        return Err(Error::EmptyBatch.into());
    }

    let downloads_dir = config::prepare_downloads_dir(&config.downloads_dir);
    let single = urls.len() == 1 && args.batch_file.is_none();
    let downloader = Arc::new(
        Downloader::new(Arc::new(engine), downloads_dir)
            .with_ffmpeg(config.ffmpeg_location.clone())
            .with_progress(single && !config.quiet),
    );

    if args.info {
        return show_info(downloader, urls).await;
    }

    if single {
        download_single(downloader, urls[0].clone(), &config).await
    } else {
        download_batch(downloader, &urls, &config).await
    }
}

async fn show_info(downloader: Arc<Downloader>, urls: Vec<String>) -> anyhow::Result<()> {
    for url in urls {
        let d = downloader.clone();
        let lookup = url.clone();
        let info = tokio::task::spawn_blocking(move || d.info(&lookup)).await?;
        match info {
            Ok(info) => report::print_info(&info),
            Err(e) => eprintln!(
                "{} {} ({}): {}",
                style("[mb]").red().bold(),
                url,
                e.kind(),
                e
            ),
        }
    }
    Ok(())
}

async fn download_single(downloader: Arc<Downloader>, url: String, config: &Config) -> anyhow::Result<()> {
    if !config.quiet {
        println!(
            "{} Downloading in {} quality...",
            style("[mb]").cyan().bold(),
            style(if config.audio_only {
                QualitySelection::AudioOnly
            } else {
                config.quality
            })
            .yellow()
        );
    }

    let d = downloader.clone();
    let (quality, audio_only) = (config.quality, config.audio_only);
    let outcome = tokio::task::spawn_blocking(move || d.download_with_fallback(&url, quality, audio_only)).await?;

    if !config.quiet {
        report::print_outcome(&outcome, config.audio_only, downloader.downloads_dir());
    }

    if outcome.success {
        Ok(())
    } else {
        anyhow::bail!(
            "download failed: {}",
            outcome.error_kind.map(|k| k.to_string()).unwrap_or_default()
        )
    }
}

async fn download_batch(downloader: Arc<Downloader>, urls: &[String], config: &Config) -> anyhow::Result<()> {
    if !config.quiet {
        println!(
            "{} Processing {} URLs with {} concurrent jobs",
            style("[mb]").cyan().bold(),
            style(urls.len()).yellow(),
            style(config.jobs).yellow()
        );
    }

    let cancel = CancellationToken::new();
    tokio::spawn(watch_interrupts(cancel.clone()));

    let progress = Arc::new(BatchProgressBar::new(urls.len(), config.quiet));
    let scheduler = BatchScheduler::new(downloader.clone())
        .with_cancellation(cancel)
        .with_observer(progress.clone());

    let stats = scheduler
        .run_batch(urls, config.quality, config.audio_only, config.jobs)
        .await;
    progress.finish();

    if !config.quiet {
        report::print_batch(&stats, urls, downloader.downloads_dir());
    }

    if stats.failed > 0 && stats.successful == 0 {
        anyhow::bail!("all downloads failed")
    }
    Ok(())
}

/// First Ctrl-C stops submitting new downloads; the second exits at once.
async fn watch_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    cancel.cancel();
    eprintln!(
        "{} Interrupted: finishing running downloads (Ctrl-C again to abort)",
        style("[mb]").yellow().bold()
    );

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("{} Aborted", style("[mb]").red().bold());
        std::process::exit(130);
    }
}
