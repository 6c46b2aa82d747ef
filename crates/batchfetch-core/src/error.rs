//! Error types for batchfetch core

use thiserror::Error;

/// Errors raised while setting up the downloader.
///
/// Per-download failures never surface here; they are delivered through
/// the downloader's error callback as a [`batchfetch_types::DownloadError`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Serialization(error.to_string())
    }
}
