//! Transfer engine - the capability that actually moves bytes
//!
//! The downloader never talks to the network itself. It hands units and
//! trackers to a [`TransferEngine`] together with a write callback (where
//! the bytes go) and a progress callback (what the host gets told).

mod http;
#[cfg(test)]
pub(crate) mod scripted;

pub use http::*;

use crate::tracker::ProgressTracker;
use crate::unit::DownloadUnit;
use std::ops::ControlFlow;
use std::time::Duration;
use thiserror::Error;

/// Write callback: store `chunk` for `unit`, returning the bytes consumed
pub type WriteFn = fn(&[u8], &mut DownloadUnit) -> usize;

/// Progress callback: `(tracker, total, downloaded)`; `Break` aborts the transfer
pub type ProgressFn<'a> = dyn Fn(&mut ProgressTracker, u64, u64) -> ControlFlow<()> + Sync + 'a;

/// Engine-level batch error callback: `(error, identity)`
pub type BatchErrorFn<'a> = dyn Fn(&BatchTransferError, &str) + Sync + 'a;

/// Per-session knobs for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    /// Abort when no data arrives for this long
    pub stall_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

/// Callbacks shared by every transfer of one call
#[derive(Clone, Copy)]
pub struct TransferHooks<'a> {
    pub write: WriteFn,
    pub progress: &'a ProgressFn<'a>,
}

/// Failure of a single transfer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("could not connect: {0}")]
    Connect(String),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("operation timed out")]
    TimedOut,

    #[error("no data received for {0:?}")]
    Stalled(Duration),

    #[error("server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("failed writing received data")]
    Write,

    #[error("failure receiving data: {0}")]
    Receive(String),

    #[error("aborted by progress callback")]
    Aborted,

    #[error("engine setup failed: {0}")]
    Setup(String),
}

impl TransferError {
    /// Stable numeric code of the single-transfer code space
    pub fn code(&self) -> i32 {
        match self {
            TransferError::MalformedUrl(_) => 1,
            TransferError::Connect(_) => 2,
            TransferError::TooManyRedirects => 3,
            TransferError::TimedOut => 4,
            TransferError::Stalled(_) => 5,
            TransferError::HttpStatus(_) => 6,
            TransferError::Write => 7,
            TransferError::Receive(_) => 8,
            TransferError::Aborted => 9,
            TransferError::Setup(_) => 10,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransferError::TimedOut
        } else if error.is_redirect() {
            TransferError::TooManyRedirects
        } else if error.is_connect() {
            TransferError::Connect(error.to_string())
        } else if let Some(status) = error.status() {
            TransferError::HttpStatus(status.as_u16())
        } else {
            TransferError::Receive(error.to_string())
        }
    }
}

/// Failure of a batch transfer call as a whole
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchTransferError {
    #[error("batch setup failed: {0}")]
    Setup(String),

    #[error("unit and tracker counts differ: {units} units, {trackers} trackers")]
    Mismatched { units: usize, trackers: usize },

    #[error("batch transfer failed: {0}")]
    Internal(String),

    /// One member of the batch failed; the batch itself carries on
    #[error("{0}")]
    Member(TransferError),
}

impl BatchTransferError {
    /// Stable numeric code of the multi-transfer code space
    pub fn code(&self) -> i32 {
        match self {
            BatchTransferError::Setup(_) => 1,
            BatchTransferError::Mismatched { .. } => 2,
            BatchTransferError::Internal(_) => 3,
            BatchTransferError::Member(_) => 4,
        }
    }

    /// Code of the underlying single-transfer failure, 0 when there is none
    pub fn transfer_code(&self) -> i32 {
        match self {
            BatchTransferError::Member(e) => e.code(),
            _ => 0,
        }
    }
}

/// Capability that performs network transfers
pub trait TransferEngine: Send + Sync {
    /// Whether the server behind `url` honours byte-range requests
    fn supports_resume(&self, url: &str, options: &TransferOptions) -> bool;

    /// Run one transfer to completion, feeding `hooks.write` with every
    /// chunk and `hooks.progress` with every measured sample. A transfer
    /// whose output target already holds bytes continues after them.
    fn perform(
        &self,
        unit: &mut DownloadUnit,
        tracker: &mut ProgressTracker,
        hooks: TransferHooks<'_>,
        options: &TransferOptions,
    ) -> Result<(), TransferError>;

    /// Run a group of transfers, interleaving them internally.
    ///
    /// `units[i]` is tracked by `trackers[i]`. Returns only once every
    /// transfer has reached a terminal state; from then on no callback is
    /// running. Per-unit failures leave the tracker short of its total and
    /// go to `on_error` as [`BatchTransferError::Member`] with the unit's
    /// identity. Problems with the call as a whole go to the returned error.
    fn perform_batch(
        &self,
        units: &mut [DownloadUnit],
        trackers: &mut [ProgressTracker],
        hooks: TransferHooks<'_>,
        on_error: &BatchErrorFn<'_>,
        options: &TransferOptions,
    ) -> Result<(), BatchTransferError>;
}
