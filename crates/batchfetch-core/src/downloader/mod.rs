//! Downloader - orchestrates single, buffer and batch transfers
//!
//! This is the top-level coordinator that:
//! - Prepares temporary output files and renames them once complete
//! - Delegates the byte moving to a [`TransferEngine`]
//! - Splits large batches into groups bounded by the open-file limit
//! - Marshals every user notification onto the host thread

mod batch;
mod report;
mod single;
#[cfg(test)]
mod test_support;

use crate::config::transfer_options;
use crate::engine::{HttpEngine, TransferEngine, TransferOptions};
use crate::error::FetchError;
use crate::host::HostScheduler;
use crate::unit::{DownloadUnits, SharedBuffer};
use batchfetch_types::{DownloadError, Settings};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Called with every failure
pub type ErrorCallback = Arc<dyn Fn(&DownloadError) + Send + Sync>;
/// Called with `(total, downloaded, url, identity)`
pub type ProgressCallback = Arc<dyn Fn(u64, u64, &str, &str) + Send + Sync>;
/// Called with `(url, stored_path, identity)`; a batch completes with an
/// empty url and path and the batch identity
pub type SuccessCallback = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_error: Option<ErrorCallback>,
    on_progress: Option<ProgressCallback>,
    on_success: Option<SuccessCallback>,
}

/// State shared between the handle and its worker threads
pub(crate) struct Inner {
    engine: Arc<dyn TransferEngine>,
    host: Arc<dyn HostScheduler>,
    settings: Settings,
    connection_timeout: AtomicU32,
    /// Engine resume support for the batch in flight
    supports_resume: AtomicBool,
    batch_active: AtomicBool,
    callbacks: RwLock<Callbacks>,
}

impl Inner {
    fn transfer_options(&self) -> TransferOptions {
        transfer_options(&self.settings, self.connection_timeout.load(Ordering::Relaxed))
    }

    fn error_callback(&self) -> Option<ErrorCallback> {
        self.callbacks.read().on_error.clone()
    }

    fn progress_callback(&self) -> Option<ProgressCallback> {
        self.callbacks.read().on_progress.clone()
    }

    fn success_callback(&self) -> Option<SuccessCallback> {
        self.callbacks.read().on_success.clone()
    }
}

/// Concurrent batch downloader.
///
/// Cloning yields another handle to the same downloader. Asynchronous
/// entry points run on a detached worker thread each; their synchronous
/// counterparts run the same logic on the calling thread. All callbacks
/// run on the host thread of the [`HostScheduler`].
///
/// Only one batch may be in flight per downloader at a time. Single and
/// buffer downloads may run alongside anything.
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<Inner>,
}

impl Downloader {
    /// Create a downloader over an explicit engine and host scheduler
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        host: Arc<dyn HostScheduler>,
        settings: Settings,
    ) -> Self {
        let connection_timeout = AtomicU32::new(settings.connection_timeout_secs);
        Self {
            inner: Arc::new(Inner {
                engine,
                host,
                settings,
                connection_timeout,
                supports_resume: AtomicBool::new(false),
                batch_active: AtomicBool::new(false),
                callbacks: RwLock::new(Callbacks::default()),
            }),
        }
    }

    /// Create a downloader backed by the reqwest HTTP engine
    pub fn with_http(host: Arc<dyn HostScheduler>, settings: Settings) -> Result<Self, FetchError> {
        let engine = Arc::new(HttpEngine::new()?);
        Ok(Self::new(engine, host, settings))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Connection timeout in seconds
    pub fn connection_timeout(&self) -> u32 {
        self.inner.connection_timeout.load(Ordering::Relaxed)
    }

    /// Set the connection timeout in seconds. Negative values are ignored.
    pub fn set_connection_timeout(&self, secs: i64) {
        if secs < 0 {
            debug!("Ignoring negative connection timeout {}", secs);
            return;
        }
        let secs = u32::try_from(secs).unwrap_or(u32::MAX);
        self.inner.connection_timeout.store(secs, Ordering::Relaxed);
    }

    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&DownloadError) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().on_error = Some(Arc::new(callback));
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(u64, u64, &str, &str) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().on_progress = Some(Arc::new(callback));
    }

    pub fn set_success_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().on_success = Some(Arc::new(callback));
    }

    pub fn error_callback(&self) -> Option<ErrorCallback> {
        self.inner.error_callback()
    }

    pub fn progress_callback(&self) -> Option<ProgressCallback> {
        self.inner.progress_callback()
    }

    pub fn success_callback(&self) -> Option<SuccessCallback> {
        self.inner.success_callback()
    }

    // ========================================================================
    // Single file
    // ========================================================================

    /// Download `url` to `storage_path` on the calling thread
    pub fn download_sync(&self, url: &str, storage_path: &str, identity: &str) {
        self.inner.download_to_file(url, storage_path, identity);
    }

    /// Download `url` to `storage_path` on a new worker thread
    pub fn download_async(
        &self,
        url: &str,
        storage_path: &str,
        identity: &str,
    ) -> Result<JoinHandle<()>, FetchError> {
        let (url, storage_path, identity) = (url.to_string(), storage_path.to_string(), identity.to_string());
        self.spawn_worker("file", move |inner| {
            inner.download_to_file(&url, &storage_path, &identity)
        })
    }

    // ========================================================================
    // Memory buffer
    // ========================================================================

    /// Download `url` into `buffer` on the calling thread. The transfer
    /// fails rather than write past the buffer's capacity.
    pub fn download_to_buffer_sync(&self, url: &str, buffer: SharedBuffer, identity: &str) {
        self.inner.download_to_buffer(url, buffer, identity);
    }

    /// Download `url` into `buffer` on a new worker thread
    pub fn download_to_buffer_async(
        &self,
        url: &str,
        buffer: SharedBuffer,
        identity: &str,
    ) -> Result<JoinHandle<()>, FetchError> {
        let (url, identity) = (url.to_string(), identity.to_string());
        self.spawn_worker("buffer", move |inner| {
            inner.download_to_buffer(&url, buffer, &identity)
        })
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Download every unit on the calling thread, then report batch
    /// completion with `batch_id`
    pub fn batch_download_sync(&self, units: DownloadUnits, batch_id: &str) {
        self.inner.batch_download(units, batch_id);
    }

    /// Download every unit on a new worker thread
    pub fn batch_download_async(
        &self,
        units: DownloadUnits,
        batch_id: &str,
    ) -> Result<JoinHandle<()>, FetchError> {
        let batch_id = batch_id.to_string();
        self.spawn_worker("batch", move |inner| inner.batch_download(units, &batch_id))
    }

    /// Run `work` on a detached, named worker thread that keeps the
    /// downloader alive until it finishes
    fn spawn_worker<F>(&self, kind: &str, work: F) -> Result<JoinHandle<()>, FetchError>
    where
        F: FnOnce(Arc<Inner>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        info!("Spawning {} download worker", kind);
        let handle = std::thread::Builder::new()
            .name(format!("batchfetch-{}", kind))
            .spawn(move || work(inner))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::ScriptedEngine;
    use crate::host::HostQueue;

    fn downloader() -> Downloader {
        Downloader::new(Arc::new(ScriptedEngine::new()), HostQueue::new(), Settings::default())
    }

    #[test]
    fn test_timeout_starts_from_settings() {
        let settings = Settings {
            connection_timeout_secs: 12,
            ..Settings::default()
        };
        let d = Downloader::new(Arc::new(ScriptedEngine::new()), HostQueue::new(), settings);
        assert_eq!(d.connection_timeout(), 12);
    }

    #[test]
    fn test_negative_timeout_is_ignored() {
        let d = downloader();
        d.set_connection_timeout(30);
        d.set_connection_timeout(-1);
        assert_eq!(d.connection_timeout(), 30);
        d.set_connection_timeout(0);
        assert_eq!(d.connection_timeout(), 0);
    }

    #[test]
    fn test_callbacks_are_replaceable() {
        let d = downloader();
        assert!(d.success_callback().is_none());
        d.set_success_callback(|_, _, _| {});
        assert!(d.success_callback().is_some());
        assert!(d.error_callback().is_none());
        assert!(d.progress_callback().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let d = downloader();
        let other = d.clone();
        other.set_connection_timeout(9);
        assert_eq!(d.connection_timeout(), 9);
    }
}
