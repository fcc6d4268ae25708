use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac"];
const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub bytes: u64,
    pub modified: SystemTime,
}

/// What the downloads directory currently holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub videos: usize,
    pub audios: usize,
    pub files: usize,
    pub total_bytes: u64,
    /// Newest first.
    pub recent: Vec<LibraryEntry>,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn scan(dir: &Path) -> Result<LibraryStats> {
    let mut stats = LibraryStats::default();
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let path = entry.path();
        stats.files += 1;
        stats.total_bytes += metadata.len();
        if has_extension(&path, VIDEO_EXTENSIONS) {
            stats.videos += 1;
        } else if has_extension(&path, AUDIO_EXTENSIONS) {
            stats.audios += 1;
        }

        entries.push(LibraryEntry {
            path,
            bytes: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    entries.truncate(RECENT_LIMIT);
    stats.recent = entries;

    Ok(stats)
}
