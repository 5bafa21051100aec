//! Configuration for backend reconciliation.

use crate::error::{Result, StateError};
use std::time::Duration;
use tracing::warn;

/// Primary backend origin.
pub const DEFAULT_PRIMARY_URL: &str = "http://localhost:8000";

/// Fallback origins tried in order after the primary: loopback, Android
/// emulator host alias, and Docker host alias.
///
/// Tunnel origins (ngrok and the like) change per session, so they are not
/// built in; list them in `MENTOR_API_FALLBACK_URLS` instead.
pub const DEFAULT_FALLBACK_URLS: &[&str] = &[
    "http://127.0.0.1:8000",
    "http://10.0.2.2:8000",
    "http://host.docker.internal:8000",
];

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL tried first for every request.
    pub primary_url: String,

    /// Base URLs tried in order when the primary fails.
    pub fallback_urls: Vec<String>,

    /// Per-request timeout. There is no overall deadline across candidates.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            fallback_urls: DEFAULT_FALLBACK_URLS.iter().map(|s| s.to_string()).collect(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by environment variables:
    ///
    /// - `MENTOR_API_URL`: primary base URL
    /// - `MENTOR_API_FALLBACK_URLS`: comma-separated fallback base URLs
    /// - `MENTOR_API_TIMEOUT_SECS`: per-request timeout
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let primary_url = std::env::var("MENTOR_API_URL").unwrap_or(defaults.primary_url);

        let fallback_urls = std::env::var("MENTOR_API_FALLBACK_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.fallback_urls);

        let request_timeout = parse_timeout(
            std::env::var("MENTOR_API_TIMEOUT_SECS").ok().as_deref(),
            defaults.request_timeout,
        );

        let config = Self {
            primary_url,
            fallback_urls,
            request_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every candidate is an absolute HTTP(S) origin.
    pub fn validate(&self) -> Result<()> {
        for url in self.candidates() {
            let valid = url.starts_with("http://") || url.starts_with("https://");
            if !valid {
                return Err(StateError::InvalidConfig(format!(
                    "Base URL must be http(s): {url}"
                )));
            }
        }
        Ok(())
    }

    /// Candidate base URLs in the order they are tried: the primary, then
    /// each fallback not seen before.
    pub fn candidates(&self) -> Vec<&str> {
        let mut candidates: Vec<&str> = vec![self.primary_url.trim_end_matches('/')];
        for url in &self.fallback_urls {
            let url = url.trim_end_matches('/');
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        }
        candidates
    }
}

/// Parse a timeout in whole seconds, keeping `default` when unset or
/// unparsable.
fn parse_timeout(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(e) => {
            warn!(
                value = %raw,
                error = %e,
                default_secs = default.as_secs(),
                "Ignoring invalid MENTOR_API_TIMEOUT_SECS"
            );
            default
        }
    }
}
