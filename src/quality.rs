use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The most permissive selector the engine understands.
pub const BEST: &str = "best";

const PINTEREST_PRIMARY: &str = "best[ext=mp4]/best[ext=webm]/best";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualitySelection {
    UltraHd,
    Qhd,
    FullHd,
    Hd,
    Sd,
    Mobile,
    Low,
    Minimal,
    AudioOnly,
}

impl QualitySelection {
    pub const ALL: [QualitySelection; 9] = [
        Self::UltraHd,
        Self::Qhd,
        Self::FullHd,
        Self::Hd,
        Self::Sd,
        Self::Mobile,
        Self::Low,
        Self::Minimal,
        Self::AudioOnly,
    ];

    /// Maximum video height, `None` for audio.
    pub fn height(self) -> Option<u32> {
        match self {
            Self::UltraHd => Some(2160),
            Self::Qhd => Some(1440),
            Self::FullHd => Some(1080),
            Self::Hd => Some(720),
            Self::Sd => Some(480),
            Self::Mobile => Some(360),
            Self::Low => Some(240),
            Self::Minimal => Some(144),
            Self::AudioOnly => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::UltraHd => "4K Ultra (3840x2160)",
            Self::Qhd => "1440p QHD (2560x1440)",
            Self::FullHd => "1080p Full HD (1920x1080)",
            Self::Hd => "720p HD (1280x720)",
            Self::Sd => "480p SD (854x480)",
            Self::Mobile => "360p Mobile (640x360)",
            Self::Low => "240p Low (426x240)",
            Self::Minimal => "144p Minimal (256x144)",
            Self::AudioOnly => "Audio Only (MP3 320kbps)",
        }
    }

    pub fn is_audio(self) -> bool {
        self == Self::AudioOnly
    }
}

impl fmt::Display for QualitySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualitySelection {
    type Err = Error;

    /// Accepts heights (`1080`, `1080p`), names (`4k`, `fullhd`, `audio`)
    /// and the numbered menu entries `1`..`9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Ok(entry) = s.parse::<usize>() {
            if (1..=Self::ALL.len()).contains(&entry) {
                return Ok(Self::ALL[entry - 1]);
            }
        }

        let selection = match s.as_str() {
            "4k" | "uhd" | "2160" | "2160p" => Self::UltraHd,
            "qhd" | "1440" | "1440p" => Self::Qhd,
            "fullhd" | "fhd" | "1080" | "1080p" => Self::FullHd,
            "hd" | "720" | "720p" => Self::Hd,
            "sd" | "480" | "480p" => Self::Sd,
            "mobile" | "360" | "360p" => Self::Mobile,
            "low" | "240" | "240p" => Self::Low,
            "minimal" | "144" | "144p" => Self::Minimal,
            "audio" | "mp3" | "audio-only" => Self::AudioOnly,
            other => return Err(Error::UnknownQuality(other.to_string())),
        };
        Ok(selection)
    }
}

/// Engine format expression, e.g. `bestvideo[height<=1080]+bestaudio`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatSelector(String);

impl FormatSelector {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub fn is_permissive(&self) -> bool {
        self.0 == BEST
    }
}

impl fmt::Display for FormatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platforms whose stream negotiation needs different handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostHint {
    Generic,
    Pinterest,
}

impl HostHint {
    pub fn from_url(url: &str) -> Self {
        let url = url.to_lowercase();
        if url.contains("pinterest.com") || url.contains("pin.it") {
            Self::Pinterest
        } else {
            Self::Generic
        }
    }
}

pub type FallbackLadder = Vec<FormatSelector>;

pub fn selector_for(selection: QualitySelection) -> FormatSelector {
    match selection.height() {
        Some(h) => FormatSelector(format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        )),
        None => FormatSelector::new("bestaudio/best"),
    }
}

/// Primary selector for a concrete host. Pinterest only serves muxed
/// streams reliably, so video requests there ignore the height tier.
pub fn primary_for(selection: QualitySelection, audio_only: bool, host: HostHint) -> FormatSelector {
    if audio_only {
        return selector_for(QualitySelection::AudioOnly);
    }
    match host {
        HostHint::Pinterest => FormatSelector::new(PINTEREST_PRIMARY),
        HostHint::Generic => selector_for(selection),
    }
}

/// Selectors tried in order after the primary one fails. Always ends with
/// [`BEST`].
pub fn ladder_for(selection: QualitySelection, audio_only: bool, host: HostHint) -> FallbackLadder {
    let exprs: &[&str] = if audio_only || selection.is_audio() {
        &["bestaudio", BEST]
    } else {
        match host {
            HostHint::Pinterest => &[
                BEST,
                "best[height<=1080]",
                "best[height<=720]",
                "best[height<=480]",
                "best[height<=360]",
                "best[vcodec!=none]",
                "best[acodec!=none]",
                BEST,
            ],
            HostHint::Generic => &[
                "best[height<=1080]",
                "best[height<=720]",
                "best[height<=480]",
                "best[height<=360]",
                BEST,
            ],
        }
    };

    exprs.iter().map(|e| FormatSelector::new(*e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_for_is_total() {
        for q in QualitySelection::ALL {
            assert!(!selector_for(q).as_str().is_empty());
        }
        assert_eq!(
            selector_for(QualitySelection::FullHd).as_str(),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
        assert_eq!(selector_for(QualitySelection::AudioOnly).as_str(), "bestaudio/best");
    }

    #[test]
    fn test_ladder_ends_permissive() {
        for q in QualitySelection::ALL {
            for audio in [false, true] {
                for host in [HostHint::Generic, HostHint::Pinterest] {
                    let ladder = ladder_for(q, audio, host);
                    assert!(!ladder.is_empty());
                    assert!(ladder.last().unwrap().is_permissive());
                }
            }
        }
    }

    #[test]
    fn test_pinterest_ladder_differs() {
        let generic = ladder_for(QualitySelection::Hd, false, HostHint::Generic);
        let pinterest = ladder_for(QualitySelection::Hd, false, HostHint::Pinterest);
        assert_ne!(generic, pinterest);
        assert_eq!(pinterest.len(), 8);
        assert_eq!(
            primary_for(QualitySelection::Hd, false, HostHint::Pinterest).as_str(),
            PINTEREST_PRIMARY
        );
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("1080p".parse::<QualitySelection>().unwrap(), QualitySelection::FullHd);
        assert_eq!("4K".parse::<QualitySelection>().unwrap(), QualitySelection::UltraHd);
        assert_eq!("9".parse::<QualitySelection>().unwrap(), QualitySelection::AudioOnly);
        assert_eq!("1".parse::<QualitySelection>().unwrap(), QualitySelection::UltraHd);
        assert_eq!("360".parse::<QualitySelection>().unwrap(), QualitySelection::Mobile);
        assert!("0".parse::<QualitySelection>().is_err());
        assert!("10".parse::<QualitySelection>().is_err());
        assert!("8k".parse::<QualitySelection>().is_err());
    }

    #[test]
    fn test_host_hint() {
        assert_eq!(HostHint::from_url("https://www.Pinterest.com/pin/1"), HostHint::Pinterest);
        assert_eq!(HostHint::from_url("https://youtu.be/abc"), HostHint::Generic);
    }
}
