//! Notification delivery on the host thread

use super::Inner;
use batchfetch_types::DownloadError;
use std::sync::Arc;
use tracing::warn;

impl Inner {
    /// Run `f` on the host thread. Already there: run it now. Otherwise
    /// queue it; a queued task that outlives the downloader does nothing.
    pub(super) fn on_host<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Inner) + Send + 'static,
    {
        if self.host.is_host_thread() {
            f(self.as_ref());
            return;
        }
        let weak = Arc::downgrade(self);
        self.host.run_on_host(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                f(inner.as_ref());
            }
        }));
    }

    pub(super) fn notify_error(self: &Arc<Self>, error: DownloadError) {
        warn!("{}", error);
        self.on_host(move |inner| {
            if let Some(callback) = inner.error_callback() {
                callback(&error);
            }
        });
    }

    pub(super) fn notify_progress(self: &Arc<Self>, total: u64, downloaded: u64, url: String, identity: String) {
        self.on_host(move |inner| {
            if let Some(callback) = inner.progress_callback() {
                callback(total, downloaded, &url, &identity);
            }
        });
    }

    pub(super) fn notify_success(self: &Arc<Self>, url: String, path: String, identity: String) {
        self.on_host(move |inner| {
            if let Some(callback) = inner.success_callback() {
                callback(&url, &path, &identity);
            }
        });
    }

    /// Final progress sample followed by success, delivered in one hop so
    /// nothing can slip in between
    pub(super) fn notify_unit_finished(
        self: &Arc<Self>,
        total: u64,
        url: String,
        path: String,
        identity: String,
    ) {
        self.on_host(move |inner| {
            if let Some(callback) = inner.progress_callback() {
                callback(total, total, &url, &identity);
            }
            if let Some(callback) = inner.success_callback() {
                callback(&url, &path, &identity);
            }
        });
    }
}
