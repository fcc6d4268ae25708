use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid or unsupported URL: {0}")]
    InvalidUrl(String),

    #[error("Extraction engine not available: {0}")]
    EngineUnavailable(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("No URLs to download")]
    EmptyBatch,

    #[error("Unknown quality: {0}")]
    UnknownQuality(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::Engine(e) => ErrorKind::classify(&e.message),
            Self::Http(_) => ErrorKind::NetworkOrTimeout,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Failure reported by the extraction engine. The message is the engine's
/// own text and is what [`ErrorKind::classify`] inspects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a single download failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    DrmProtected,
    NetworkOrTimeout,
    FormatUnavailable,
    ProcessingFailure,
    Unknown,
}

impl ErrorKind {
    /// Classify raw engine error text by known substrings.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if text.contains("drm") {
            Self::DrmProtected
        } else if has(&["ffmpeg", "merging", "postprocess", "conversion"]) {
            Self::ProcessingFailure
        } else if has(&[
            "no video",
            "no audio",
            "requested format",
            "not available",
            "unavailable",
        ]) {
            Self::FormatUnavailable
        } else if has(&[
            "connection",
            "timeout",
            "timed out",
            "network",
            "http error",
            "unable to download",
        ]) {
            Self::NetworkOrTimeout
        } else {
            Self::Unknown
        }
    }

    /// Whether walking the fallback ladder can help.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::DrmProtected | Self::InvalidUrl)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidUrl => "invalid URL",
            Self::DrmProtected => "DRM protected",
            Self::NetworkOrTimeout => "network or timeout",
            Self::FormatUnavailable => "format unavailable",
            Self::ProcessingFailure => "processing failure",
            Self::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            ErrorKind::classify("ERROR: This video is DRM protected"),
            ErrorKind::DrmProtected
        );
        assert_eq!(
            ErrorKind::classify("ERROR: Postprocessing: ffmpeg exited with code 1"),
            ErrorKind::ProcessingFailure
        );
        assert_eq!(
            ErrorKind::classify("ERROR: Requested format is not available"),
            ErrorKind::FormatUnavailable
        );
        assert_eq!(
            ErrorKind::classify("ERROR: Connection reset by peer"),
            ErrorKind::NetworkOrTimeout
        );
        assert_eq!(
            ErrorKind::classify("ERROR: Read timed out."),
            ErrorKind::NetworkOrTimeout
        );
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::InvalidUrl("x".into()).kind(), ErrorKind::InvalidUrl);
        assert_eq!(
            Error::Engine(EngineError::new("ERROR: Unable to download webpage")).kind(),
            ErrorKind::NetworkOrTimeout
        );
        assert_eq!(Error::EmptyBatch.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_retryable() {
        assert!(!ErrorKind::DrmProtected.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());
        assert!(ErrorKind::NetworkOrTimeout.is_retryable());
    }
}
