use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

const SHORT_LINK_HOST: &str = "pin.it";

const SUPPORTED_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "tiktok.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "pinterest.com",
    "pin.it",
    "spotify.com",
    "soundcloud.com",
    "facebook.com",
    "fb.watch",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "reddit.com",
    "bilibili.com",
    "rumble.com",
    "odysee.com",
    "bitchute.com",
];

/// Substring match against the host allow-list. Deliberately loose: a known
/// domain anywhere in the string is enough.
pub fn is_supported(raw: &str) -> bool {
    let url = raw.trim().to_lowercase();
    !url.is_empty() && SUPPORTED_HOSTS.iter().any(|host| url.contains(host))
}

/// Read a batch file: one URL per line, blank lines and `#` comments skipped.
pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    pub url: String,
    /// The short link this URL was expanded from, if any.
    pub resolved_from: Option<String>,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub accepted: Vec<ValidatedUrl>,
    pub rejected: Vec<String>,
    pub duplicates: usize,
}

impl ValidationReport {
    pub fn urls(&self) -> Vec<String> {
        self.accepted.iter().map(|v| v.url.clone()).collect()
    }
}

/// Follows redirects for a short link and returns the final URL.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// Resolves with a HEAD request, letting reqwest follow redirects.
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .timeout(RESOLVE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkResolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        let response = self.client.head(url).send().await?;
        Ok(response.url().to_string())
    }
}

pub struct UrlValidator<R> {
    resolver: R,
    resolve_timeout: Duration,
}

impl<R: LinkResolver> UrlValidator<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            resolve_timeout: RESOLVE_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub async fn normalize(&self, raw: &str) -> Result<ValidatedUrl> {
        let trimmed = raw.trim();
        if !is_supported(trimmed) {
            return Err(Error::InvalidUrl(trimmed.to_string()));
        }

        if !trimmed.to_lowercase().contains(SHORT_LINK_HOST) {
            return Ok(ValidatedUrl {
                url: trimmed.to_string(),
                resolved_from: None,
            });
        }

        Ok(self.expand_short_link(trimmed).await)
    }

    /// Never fails: any resolution problem keeps the short link as-is.
    async fn expand_short_link(&self, short: &str) -> ValidatedUrl {
        let unchanged = ValidatedUrl {
            url: short.to_string(),
            resolved_from: None,
        };

        match tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(short)).await {
            Ok(Ok(long)) if url::Url::parse(&long).is_ok() => {
                debug!(short, long = %long, "resolved short link");
                ValidatedUrl {
                    url: long,
                    resolved_from: Some(short.to_string()),
                }
            }
            Ok(Ok(garbage)) => {
                warn!(short, resolved = %garbage, "short link resolved to an unparsable URL");
                unchanged
            }
            Ok(Err(e)) => {
                warn!(short, error = %e, "short link resolution failed");
                unchanged
            }
            Err(_) => {
                warn!(short, timeout = ?self.resolve_timeout, "short link resolution timed out");
                unchanged
            }
        }
    }

    /// Normalize a list, dropping rejected entries and duplicates (the first
    /// occurrence of a URL wins).
    pub async fn validate_all(&self, raws: &[String]) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut seen = HashSet::new();

        for raw in raws {
            match self.normalize(raw).await {
                Ok(valid) => {
                    if seen.insert(valid.url.clone()) {
                        report.accepted.push(valid);
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(_) => report.rejected.push(raw.clone()),
            }
        }

        report
    }
}
