use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::quality::QualitySelection;

pub const APP_DIR: &str = "mediabatch";
pub const ENV_ENGINE: &str = "MEDIABATCH_YTDLP";
pub const ENV_DOWNLOAD_DIR: &str = "MEDIABATCH_DOWNLOAD_DIR";

/// Settings for one run, resolved from the command line and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub downloads_dir: PathBuf,
    pub quality: QualitySelection,
    pub audio_only: bool,
    pub jobs: usize,
    pub quiet: bool,
    pub engine_binary: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
}

/// `~/Downloads/mediabatch`, or `/sdcard/Download/mediabatch` on Android
/// style systems. `MEDIABATCH_DOWNLOAD_DIR` overrides both.
pub fn default_downloads_dir() -> PathBuf {
    if let Some(dir) = env::var_os(ENV_DOWNLOAD_DIR) {
        return PathBuf::from(dir);
    }

    if cfg!(target_os = "linux") || cfg!(target_os = "android") {
        let sdcard = Path::new("/sdcard");
        if sdcard.exists() {
            return sdcard.join("Download").join(APP_DIR);
        }
    }

    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Create `dir` if needed. Falls back to the current directory when it
/// cannot be created.
pub fn prepare_downloads_dir(dir: &Path) -> PathBuf {
    match fs::create_dir_all(dir) {
        Ok(()) => {
            info!(dir = %dir.display(), "download directory ready");
            dir.to_path_buf()
        }
        Err(e) => {
            let fallback = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            warn!(
                dir = %dir.display(),
                error = %e,
                fallback = %fallback.display(),
                "cannot create download directory"
            );
            fallback
        }
    }
}

pub fn engine_binary() -> PathBuf {
    env::var_os(ENV_ENGINE)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("yt-dlp"))
}
