//! Network layer: HTTP client, retry policy, streaming downloads and the
//! existence probe.

mod client;
mod download;
mod probe;
mod retry;

pub use client::{ensure_success, extract_domain, HttpClient};
pub use download::{DownloadOutcome, Downloader, ProgressCallback};
pub use probe::{ExistenceProbe, ProbeVerdict};
pub use retry::{retry_async, RetryConfig, RetryStats};
