//! Export tuning read from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const DEFAULT_EXPORT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_EXPORT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Knobs for [`crate::export::ExportPipeline`] and [`crate::source::ImageSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportConfig {
    /// Pages rasterised at once. Never below one.
    pub max_concurrency: usize,
    /// Upper bound on fetching and decoding one page image.
    pub fetch_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_EXPORT_MAX_CONCURRENCY,
            fetch_timeout: Duration::from_millis(DEFAULT_EXPORT_FETCH_TIMEOUT_MS),
        }
    }
}

impl ExportConfig {
    /// Build from the process environment.
    ///
    /// Optional:
    /// - `EXPORT_MAX_CONCURRENCY`: default 4, minimum 1
    /// - `EXPORT_FETCH_TIMEOUT_MS`: default 30000
    ///
    /// Missing or unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_concurrency = env_parse(&lookup, "EXPORT_MAX_CONCURRENCY", DEFAULT_EXPORT_MAX_CONCURRENCY);
        let timeout_ms = env_parse(&lookup, "EXPORT_FETCH_TIMEOUT_MS", DEFAULT_EXPORT_FETCH_TIMEOUT_MS);
        Self { max_concurrency: max_concurrency.max(1), fetch_timeout: Duration::from_millis(timeout_ms) }
    }

    /// Override the concurrency limit, keeping it at least one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

fn env_parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
