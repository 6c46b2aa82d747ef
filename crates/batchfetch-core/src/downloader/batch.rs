//! Batch downloads, split into groups bounded by the open-file limit

use super::Inner;
use crate::engine::{BatchTransferError, TransferHooks, TransferOptions};
use crate::paths::{rename_in, TEMP_EXT};
use crate::tracker::ProgressTracker;
use crate::unit::{write_chunk, DownloadUnit, DownloadUnits};
use batchfetch_types::{DownloadError, ErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Inner {
    pub(super) fn batch_download(self: &Arc<Self>, units: DownloadUnits, batch_id: &str) {
        if self.batch_active.swap(true, Ordering::AcqRel) {
            warn!("Batch {} started while another batch is still running", batch_id);
        }

        if let Some(first) = units.values().next() {
            let options = self.transfer_options();
            let resumable = self.engine.supports_resume(&first.url, &options);
            debug!("Server resume support for batch {}: {}", batch_id, resumable);
            self.supports_resume.store(resumable, Ordering::Release);

            let limit = self.settings.max_open_files.max(1);
            info!(
                "Batch {} starting: {} units in groups of at most {}",
                batch_id,
                units.len(),
                limit
            );

            let mut pending: Vec<DownloadUnit> = units.into_values().collect();
            while !pending.is_empty() {
                let rest = pending.split_off(limit.min(pending.len()));
                self.group_batch_download(pending, &options);
                pending = rest;
            }
        }

        info!("Batch {} finished", batch_id);
        self.notify_success(String::new(), String::new(), batch_id.to_string());
        self.supports_resume.store(false, Ordering::Release);
        self.batch_active.store(false, Ordering::Release);
    }

    fn group_batch_download(self: &Arc<Self>, group: Vec<DownloadUnit>, options: &TransferOptions) {
        let mut units = Vec::with_capacity(group.len());
        let mut trackers = Vec::with_capacity(group.len());
        for mut unit in group {
            if let Some(tracker) = self.prepare(&mut unit) {
                units.push(unit);
                trackers.push(tracker);
            }
        }

        let progress = |tracker: &mut ProgressTracker, total: u64, downloaded: u64| {
            self.batch_progress(tracker, total, downloaded);
            ControlFlow::Continue(())
        };
        // member failures are held back and reported once by the scan below
        let member_errors: Mutex<HashMap<String, BatchTransferError>> = Mutex::new(HashMap::new());
        let on_error = |e: &BatchTransferError, identity: &str| match e {
            BatchTransferError::Member(_) => {
                member_errors.lock().insert(identity.to_string(), e.clone());
            }
            _ => self.notify_error(
                DownloadError::new(ErrorKind::BatchTransfer, e.to_string(), identity)
                    .with_batch_code(e.code()),
            ),
        };
        let hooks = TransferHooks {
            write: write_chunk,
            progress: &progress,
        };

        if let Err(e) = self
            .engine
            .perform_batch(&mut units, &mut trackers, hooks, &on_error, options)
        {
            error!("Batch transfer call failed: {}", e);
            self.notify_error(
                DownloadError::new(
                    ErrorKind::BatchTransfer,
                    format!("Unable to download files: [batch transfer error] {}", e),
                    "",
                )
                .with_batch_code(e.code()),
            );
        }

        // the engine has returned, so no callback touches the trackers any more
        for unit in &mut units {
            unit.output_mut().close();
        }

        let mut member_errors = member_errors.into_inner();
        for tracker in &trackers {
            let cause = member_errors.remove(&tracker.identity);
            if !tracker.is_complete() || cause.is_some() {
                self.notify_error(network_error(tracker, cause.as_ref()));
                continue;
            }

            let temp_name = format!("{}{}", tracker.name, TEMP_EXT);
            if let Err(e) = rename_in(&tracker.dir, &temp_name, &tracker.name) {
                self.notify_error(DownloadError::new(
                    ErrorKind::Rename,
                    format!("Unable to rename {}{} to {}: {}", tracker.dir, temp_name, tracker.name, e),
                    tracker.identity.clone(),
                ));
            }
        }
    }

    /// Report changed samples; the sample that reaches the total also
    /// reports the unit as done
    fn batch_progress(self: &Arc<Self>, tracker: &mut ProgressTracker, total: u64, downloaded: u64) {
        if !tracker.record(total, downloaded) {
            return;
        }
        if downloaded == total {
            self.notify_unit_finished(total, tracker.url.clone(), tracker.destination(), tracker.identity.clone());
        } else {
            self.notify_progress(total, downloaded, tracker.url.clone(), tracker.identity.clone());
        }
    }
}

/// The one error a failed batch member gets, with the engine's reason
/// when it gave one
fn network_error(tracker: &ProgressTracker, cause: Option<&BatchTransferError>) -> DownloadError {
    let mut message = format!(
        "Unable to download file {}: received {} of {} bytes",
        tracker.url, tracker.downloaded, tracker.total
    );
    if let Some(cause) = cause {
        message.push_str(&format!(" ({})", cause));
    }

    let error = DownloadError::new(ErrorKind::Network, message, tracker.identity.clone());
    match cause {
        Some(cause) => error
            .with_batch_code(cause.code())
            .with_transfer_code(cause.transfer_code()),
        None => error,
    }
}
