//! HTTP client wrapper for streaming documents to disk.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use super::filename::partial_path;
use crate::session::BROWSER_USER_AGENT;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// HTTP client for downloading documents with streaming support.
///
/// Create once and reuse for the whole batch to keep connections pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot initialize.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot initialize.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|source| DownloadError::Client { source })?;
        Ok(Self { client })
    }

    /// Streams `url` into `target`, returning the number of bytes written.
    ///
    /// The body is written to a `.part` sibling first and renamed into place
    /// once complete, so `target` only ever holds a whole document. The
    /// partial file is removed on any error.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failures
    /// - [`DownloadError::HttpStatus`] for non-2xx responses
    /// - [`DownloadError::Io`] if the file cannot be written
    #[instrument(skip(self), fields(url = %url, path = %target.display()))]
    pub async fn download_to_path(&self, url: &Url, target: &Path) -> Result<u64, DownloadError> {
        debug!("starting download");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }

        let partial = partial_path(target);
        let mut file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;

        let streamed = stream_to_file(&mut file, response, url.as_str(), &partial).await;
        drop(file);

        let bytes = match streamed {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %partial.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::io(target, e));
        }
        Ok(bytes)
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
