//! Streaming downloads with progress, digest verification and mirror fallback.
//!
//! Provides:
//! - Per-chunk progress callbacks (`total == 0` means unknown length)
//! - `.part` temp files that are renamed only after a complete transfer
//! - Optional SHA256 verification; a mismatch deletes the file
//! - Sequential fallback over a primary URL and its mirrors

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::error::{AxonError, IoResultExt, Result};
use crate::hashing::verify_sha256;
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Progress callback: `(bytes_so_far, total_bytes_or_zero)`.
pub type ProgressCallback = dyn Fn(u64, u64) + Send + Sync;

/// Counts bytes as they are read and forwards each read to the callback.
struct ProgressCounter<'a> {
    bytes_so_far: u64,
    total: u64,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> ProgressCounter<'a> {
    fn new(total: Option<u64>, callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            bytes_so_far: 0,
            total: total.unwrap_or(0),
            callback,
        }
    }

    fn record(&mut self, n: usize) {
        self.bytes_so_far += n as u64;
        if let Some(cb) = self.callback {
            cb(self.bytes_so_far, self.total);
        }
    }
}

/// Result of a successful multi-source download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// URL that produced the file.
    pub url: String,
    pub bytes: u64,
    /// Sources that failed before `url` succeeded.
    pub failed_sources: Vec<String>,
}

/// Downloader for model packages and individual repository files.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: Arc<HttpClient>,
    retry: RetryConfig,
    temp_suffix: String,
}

impl Downloader {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            retry: RetryConfig::new().with_max_attempts(NetworkConfig::MAX_RETRIES),
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
        }
    }

    /// Override the per-source retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// Temp path used while `destination` is being written.
    pub fn temp_path_for(&self, destination: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", destination.display(), self.temp_suffix))
    }

    /// Download `url` to `destination`.
    ///
    /// The body is streamed into `<destination>.part`, which is renamed on
    /// success and removed on any failure, including cancellation.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_path(parent)?;
            }
        }

        let temp_path = self.temp_path_for(destination);
        let result = self.stream_to(url, &temp_path, progress, cancel).await;

        match result {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&temp_path, destination).await {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(AxonError::io(
                        "Failed to move download to final destination",
                        destination,
                        e,
                    ));
                }
                debug!("Downloaded {} bytes from {} to {}", bytes, url, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    /// Download, then verify against `expected_sha256` when it is non-empty.
    pub async fn download_verified(
        &self,
        url: &str,
        destination: &Path,
        expected_sha256: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let bytes = self.download(url, destination, progress, cancel).await?;

        if let Some(expected) = expected_sha256.filter(|s| !s.trim().is_empty()) {
            let path = destination.to_path_buf();
            let expected = expected.to_string();
            let verified = tokio::task::spawn_blocking(move || verify_sha256(&path, &expected))
                .await
                .map_err(|e| AxonError::Other(format!("Verification task failed: {}", e)))?;
            if let Err(e) = verified {
                warn!("Checksum verification failed for {}: {}", url, e);
                let _ = tokio::fs::remove_file(destination).await;
                return Err(e);
            }
        }
        Ok(bytes)
    }

    /// Try each source in order, stopping at the first verified success.
    ///
    /// Transient failures are retried per source. Cancellation aborts
    /// immediately. When every source fails the error quotes the last failure.
    pub async fn download_from_sources(
        &self,
        sources: &[String],
        destination: &Path,
        expected_sha256: Option<&str>,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let mut failed_sources = Vec::new();
        let mut last_error: Option<AxonError> = None;

        for url in sources {
            cancel.check()?;
            let (result, stats) = retry_async(
                &self.retry,
                || self.download_verified(url, destination, expected_sha256, progress, cancel),
                |e: &AxonError| e.is_retryable() && !cancel.is_cancelled(),
            )
            .await;

            match result {
                Ok(bytes) => {
                    if !failed_sources.is_empty() {
                        info!(
                            "Downloaded from fallback source {} after {} failed source(s)",
                            url,
                            failed_sources.len()
                        );
                    }
                    return Ok(DownloadOutcome {
                        url: url.clone(),
                        bytes,
                        failed_sources,
                    });
                }
                Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
                Err(e) => {
                    warn!(
                        "Source {} failed after {} attempt(s): {}",
                        url, stats.attempts, e
                    );
                    failed_sources.push(url.clone());
                    last_error = Some(e);
                }
            }
        }

        Err(AxonError::AllSourcesFailed {
            attempts: failed_sources.len(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no download sources".to_string()),
        })
    }

    async fn stream_to(
        &self,
        url: &str,
        temp_path: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let response = cancel.run(self.http.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            let message = format!("GET {} returned status {}", url, status);
            return Err(if HttpClient::is_permanent_failure(status) {
                AxonError::RemoteNotFound {
                    model: url.to_string(),
                }
            } else {
                AxonError::network(message)
            });
        }

        let mut counter = ProgressCounter::new(response.content_length(), progress);
        let mut file = tokio::fs::File::create(temp_path).await.with_path(temp_path)?;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AxonError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| AxonError::Network {
                message: format!("Error reading download stream from {}: {}", url, e),
                source: Some(e),
            })?;
            file.write_all(&chunk).await.with_path(temp_path)?;
            counter.record(chunk.len());
        }

        file.flush().await.with_path(temp_path)?;
        file.sync_all().await.with_path(temp_path)?;
        Ok(counter.bytes_so_far)
    }
}
