//! Page image supply.
//!
//! The export pipeline only needs "give me the decoded pixels behind this
//! image reference". [`PageSource`] is that seam; [`ImageSource`] is the real
//! implementation, fetching `http(s)://` references with `reqwest` and
//! treating anything else as a filesystem path.

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tracing::debug;

use crate::config::ExportConfig;
use crate::error::SourceError;

/// Resolves an image reference to decoded RGBA pixels.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the reference cannot be read, fetched or
    /// decoded.
    async fn fetch(&self, image_url: &str) -> Result<RgbaImage, SourceError>;
}

/// Fetches page images over HTTP or from disk, with a per-image timeout.
#[derive(Debug, Clone)]
pub struct ImageSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl ImageSource {
    #[must_use]
    pub fn new(config: &ExportConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config.fetch_timeout)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn read_bytes(&self, image_url: &str) -> Result<Vec<u8>, SourceError> {
        if is_remote(image_url) {
            let http = |source| SourceError::Http { url: image_url.to_owned(), source };
            let response = self.client.get(image_url).send().await.map_err(http)?;
            let body = response.error_for_status().map_err(http)?.bytes().await.map_err(http)?;
            Ok(body.to_vec())
        } else {
            let path = image_url.strip_prefix("file://").unwrap_or(image_url);
            tokio::fs::read(path).await.map_err(|source| SourceError::Io { path: path.to_owned(), source })
        }
    }
}

#[async_trait]
impl PageSource for ImageSource {
    async fn fetch(&self, image_url: &str) -> Result<RgbaImage, SourceError> {
        let bytes = tokio::time::timeout(self.timeout, self.read_bytes(image_url))
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;
        debug!(image_url, bytes = bytes.len(), "page image fetched");
        decode(&bytes)
    }
}

/// Decode PNG or JPEG bytes into RGBA pixels.
///
/// # Errors
///
/// Returns [`SourceError::Decode`] for unsupported or corrupt data.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, SourceError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

fn is_remote(image_url: &str) -> bool {
    image_url.starts_with("http://") || image_url.starts_with("https://")
}
