//! Output preparation plus single-file and buffer transfers

use super::Inner;
use crate::engine::TransferHooks;
use crate::paths::{
    ensure_directory, remove_if_exists, rename_in, split_destination, suitable_open_path,
    temp_path, TEMP_EXT,
};
use crate::tracker::ProgressTracker;
use crate::unit::{write_chunk, DownloadUnit, OutputTarget, SharedBuffer};
use batchfetch_types::{DownloadError, ErrorKind};
use std::fs::OpenOptions;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Inner {
    /// Open the unit's temporary output and build its tracker.
    ///
    /// Returns `None` for a destination without a directory and file name;
    /// such a unit must not be transferred. A temporary file that cannot be
    /// opened is reported but the unit is still returned with a closed
    /// output, so the transfer fails on its first write.
    pub(super) fn prepare(self: &Arc<Self>, unit: &mut DownloadUnit) -> Option<ProgressTracker> {
        let Some((dir, name)) = split_destination(&unit.destination) else {
            self.notify_error(DownloadError::new(
                ErrorKind::InvalidUrl,
                format!("No directory or file name in destination {:?} for {}", unit.destination, unit.url),
                unit.identity.clone(),
            ));
            return None;
        };

        let mut tracker = ProgressTracker::new(&unit.url, &unit.identity);
        tracker.dir = dir;
        tracker.name = name;

        if let Err(e) = ensure_directory(&tracker.dir) {
            warn!("Could not create directory {}: {}", tracker.dir, e);
        }

        let temp = suitable_open_path(&temp_path(&unit.destination));
        let append = unit.resume && self.supports_resume.load(Ordering::Acquire) && temp.exists();
        let opened = if append {
            debug!("Appending to existing {:?}", temp);
            OpenOptions::new().append(true).open(&temp)
        } else {
            OpenOptions::new().write(true).create(true).truncate(true).open(&temp)
        };

        match opened {
            Ok(file) => unit.set_output(OutputTarget::File(file)),
            Err(e) => {
                unit.set_output(OutputTarget::Closed);
                self.notify_error(DownloadError::new(
                    ErrorKind::CreateFile,
                    format!("Can not create file {}: errno {}", temp.display(), e.raw_os_error().unwrap_or(0)),
                    unit.identity.clone(),
                ));
            }
        }

        Some(tracker)
    }

    /// Forward every sample that moved the byte count
    fn single_progress(self: &Arc<Self>, tracker: &mut ProgressTracker, total: u64, downloaded: u64) {
        if tracker.record(total, downloaded) {
            self.notify_progress(total, downloaded, tracker.url.clone(), tracker.identity.clone());
        }
    }

    pub(super) fn download_to_file(self: &Arc<Self>, url: &str, storage_path: &str, identity: &str) {
        let mut unit = DownloadUnit::new(url, storage_path, identity);
        let Some(mut tracker) = self.prepare(&mut unit) else {
            return;
        };

        let options = self.transfer_options();
        let progress = |tracker: &mut ProgressTracker, total: u64, downloaded: u64| {
            self.single_progress(tracker, total, downloaded);
            ControlFlow::Continue(())
        };
        let hooks = TransferHooks {
            write: write_chunk,
            progress: &progress,
        };

        info!("Downloading {} to {}", url, storage_path);
        let result = self.engine.perform(&mut unit, &mut tracker, hooks, &options);
        unit.output_mut().close();

        if let Err(e) = result {
            let temp = suitable_open_path(&temp_path(storage_path));
            if let Err(rm) = remove_if_exists(&temp) {
                warn!("Could not remove {:?}: {}", temp, rm);
            }
            self.notify_error(
                DownloadError::new(
                    ErrorKind::Transfer,
                    format!("Unable to download file: [transfer error] {}", e),
                    identity,
                )
                .with_transfer_code(e.code()),
            );
            return;
        }

        let temp_name = format!("{}{}", tracker.name, TEMP_EXT);
        if let Err(e) = rename_in(&tracker.dir, &temp_name, &tracker.name) {
            self.notify_error(DownloadError::new(
                ErrorKind::Rename,
                format!("Unable to rename {}{} to {}: {}", tracker.dir, temp_name, tracker.name, e),
                identity,
            ));
            return;
        }

        info!("Downloaded {} ({} bytes)", storage_path, tracker.downloaded);
        self.notify_success(url.to_string(), tracker.destination(), identity.to_string());
    }

    pub(super) fn download_to_buffer(self: &Arc<Self>, url: &str, buffer: SharedBuffer, identity: &str) {
        let mut unit = DownloadUnit::for_buffer(url, identity, buffer);
        let mut tracker = ProgressTracker::new(url, identity);

        let options = self.transfer_options();
        let progress = |tracker: &mut ProgressTracker, total: u64, downloaded: u64| {
            self.single_progress(tracker, total, downloaded);
            ControlFlow::Continue(())
        };
        let hooks = TransferHooks {
            write: write_chunk,
            progress: &progress,
        };

        info!("Downloading {} to memory", url);
        let result = self.engine.perform(&mut unit, &mut tracker, hooks, &options);
        unit.output_mut().close();

        match result {
            Ok(()) => self.notify_success(url.to_string(), String::new(), identity.to_string()),
            Err(e) => self.notify_error(
                DownloadError::new(
                    ErrorKind::Transfer,
                    format!("Unable to download file to buffer: [transfer error] {}", e),
                    identity,
                )
                .with_transfer_code(e.code()),
            ),
        }
    }
}
