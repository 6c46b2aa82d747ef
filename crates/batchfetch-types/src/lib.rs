//! Shared types for batchfetch
//!
//! This crate contains the data structures shared by the core
//! downloader and the CLI: error records, settings and the batch
//! manifest format.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Error Types
// ============================================================================

/// Category of a failure reported through the error callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Destination path has no separable directory and file name
    InvalidUrl,
    /// The temporary output file could not be opened
    CreateFile,
    /// A batch member did not reach its full byte count
    Network,
    /// A single transfer failed inside the transfer engine
    Transfer,
    /// The engine's batch transfer call failed as a whole
    BatchTransfer,
    /// The finished temporary file could not be moved to its final name
    Rename,
}

/// A failure delivered to the host through the error callback.
///
/// `transfer_code` and `batch_code` are two independent code spaces: the
/// first is set for single-transfer engine failures, the second for
/// engine-level batch failures. Both are 0 when not applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadError {
    pub kind: ErrorKind,
    #[serde(default)]
    pub transfer_code: i32,
    #[serde(default)]
    pub batch_code: i32,
    pub message: String,
    #[serde(default)]
    pub identity: String,
}

impl DownloadError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            kind,
            transfer_code: 0,
            batch_code: 0,
            message: message.into(),
            identity: identity.into(),
        }
    }

    pub fn with_transfer_code(mut self, code: i32) -> Self {
        self.transfer_code = code;
        self
    }

    pub fn with_batch_code(mut self, code: i32) -> Self {
        self.batch_code = code;
        self
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if !self.identity.is_empty() {
            write!(f, " ({})", self.identity)?;
        }
        Ok(())
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Downloader settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Connection timeout in seconds
    pub connection_timeout_secs: u32,
    /// A transfer receiving nothing for this long is aborted
    pub stall_timeout_secs: u32,
    /// Maximum number of redirects followed per transfer
    pub max_redirects: u32,
    /// Upper bound on output files open at once during a batch
    pub max_open_files: usize,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 5,
            stall_timeout_secs: 5,
            max_redirects: 2,
            max_open_files: 16,
            user_agent: format!("batchfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// Batch Types
// ============================================================================

/// One entry of a batch manifest file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    pub destination: String,
    /// Identity token; the entry's url is used when absent
    pub id: Option<String>,
    #[serde(default)]
    pub resume: bool,
}

/// A batch manifest: the units of one batch download
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub batch_id: Option<String>,
    pub entries: Vec<ManifestEntry>,
}

/// A download that reached its final destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDownload {
    pub url: String,
    pub path: String,
    pub identity: String,
}

/// Outcome of a batch run, as collected by a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub succeeded: Vec<CompletedDownload>,
    pub failed: Vec<DownloadError>,
}

impl BatchReport {
    pub fn new(batch_id: String) -> Self {
        Self {
            batch_id,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {}: {} succeeded, {} failed",
            self.batch_id,
            self.succeeded.len(),
            self.failed.len()
        )
    }
}
