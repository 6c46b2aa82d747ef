//! Deterministic in-memory engine for tests
//!
//! Serves scripted bodies in fixed-size chunks, can fail a resource at a
//! chosen chunk, and records how many outputs were open per batch call.

use super::{
    BatchErrorFn, BatchTransferError, TransferEngine, TransferError, TransferHooks, TransferOptions,
};
use crate::tracker::ProgressTracker;
use crate::unit::DownloadUnit;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub(crate) struct Script {
    pub body: Vec<u8>,
    pub chunk_size: usize,
    pub fail_at_chunk: Option<usize>,
    /// Report the body length as the expected total
    pub declare_total: bool,
}

impl Script {
    pub fn ok(body: &[u8], chunk_size: usize) -> Self {
        Self {
            body: body.to_vec(),
            chunk_size,
            fail_at_chunk: None,
            declare_total: true,
        }
    }

    pub fn failing(body: &[u8], chunk_size: usize, at_chunk: usize) -> Self {
        Self {
            fail_at_chunk: Some(at_chunk),
            ..Self::ok(body, chunk_size)
        }
    }
}

#[derive(Default)]
pub(crate) struct ScriptedEngine {
    scripts: HashMap<String, Script>,
    resumable: bool,
    batch_failure: Option<BatchTransferError>,
    report_unit_errors: bool,
    pub batch_sizes: Mutex<Vec<usize>>,
    pub max_open_outputs: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub resume_queries: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn resumable(mut self) -> Self {
        self.resumable = true;
        self
    }

    pub fn failing_batches(mut self, error: BatchTransferError) -> Self {
        self.batch_failure = Some(error);
        self
    }

    /// Also report each failed batch member through the batch error callback
    pub fn reporting_unit_errors(mut self) -> Self {
        self.report_unit_errors = true;
        self
    }
}

/// Progress of one scripted transfer
struct Cursor {
    script: Option<Script>,
    sent: usize,
    chunk: usize,
}

impl ScriptedEngine {
    fn open(&self, unit: &mut DownloadUnit) -> Result<Cursor, TransferError> {
        let script = self.scripts.get(&unit.url).cloned();
        let mut sent = 0;
        if let Some(script) = &script {
            if self.resumable {
                sent = (unit.output().resume_offset() as usize).min(script.body.len());
            } else {
                unit.output_mut().restart().map_err(|_| TransferError::Write)?;
            }
        }
        Ok(Cursor { script, sent, chunk: 0 })
    }

    /// Terminal failure of one batch member
    fn fail_member(&self, unit: &mut DownloadUnit, error: TransferError, on_error: &BatchErrorFn<'_>) {
        unit.output_mut().close();
        if self.report_unit_errors {
            on_error(&BatchTransferError::Member(error), &unit.identity);
        }
    }

    /// Deliver the next chunk. `Ok(true)` once the body is exhausted.
    fn step(
        cursor: &mut Cursor,
        unit: &mut DownloadUnit,
        tracker: &mut ProgressTracker,
        hooks: TransferHooks<'_>,
    ) -> Result<bool, TransferError> {
        let Some(script) = &cursor.script else {
            return Err(TransferError::Connect(format!("no route to {}", unit.url)));
        };
        if cursor.sent >= script.body.len() {
            return Ok(true);
        }
        if script.fail_at_chunk == Some(cursor.chunk) {
            return Err(TransferError::Receive("scripted failure".to_string()));
        }

        let end = (cursor.sent + script.chunk_size).min(script.body.len());
        let chunk = &script.body[cursor.sent..end];
        if (hooks.write)(chunk, unit) < chunk.len() {
            return Err(TransferError::Write);
        }
        cursor.sent = end;
        cursor.chunk += 1;

        let total = if script.declare_total {
            script.body.len() as u64
        } else {
            0
        };
        if (hooks.progress)(tracker, total, cursor.sent as u64).is_break() {
            return Err(TransferError::Aborted);
        }
        Ok(cursor.sent >= script.body.len())
    }
}

impl TransferEngine for ScriptedEngine {
    fn supports_resume(&self, _url: &str, _options: &TransferOptions) -> bool {
        self.resume_queries.fetch_add(1, Ordering::SeqCst);
        self.resumable
    }

    fn perform(
        &self,
        unit: &mut DownloadUnit,
        tracker: &mut ProgressTracker,
        hooks: TransferHooks<'_>,
        _options: &TransferOptions,
    ) -> Result<(), TransferError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        let mut cursor = self.open(unit)?;
        while !Self::step(&mut cursor, unit, tracker, hooks)? {}
        Ok(())
    }

    fn perform_batch(
        &self,
        units: &mut [DownloadUnit],
        trackers: &mut [ProgressTracker],
        hooks: TransferHooks<'_>,
        on_error: &BatchErrorFn<'_>,
        _options: &TransferOptions,
    ) -> Result<(), BatchTransferError> {
        let open = units.iter().filter(|u| u.output().is_open()).count();
        self.max_open_outputs.fetch_max(open, Ordering::SeqCst);
        self.batch_sizes.lock().push(units.len());

        // a finished or failed member drops its cursor
        let mut cursors: Vec<Option<Cursor>> = units
            .iter_mut()
            .map(|unit| match self.open(unit) {
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    self.fail_member(unit, e, on_error);
                    None
                }
            })
            .collect();

        // round-robin one chunk per unit, like a multiplexed connection
        while cursors.iter().any(Option::is_some) {
            for ((slot, unit), tracker) in cursors.iter_mut().zip(units.iter_mut()).zip(trackers.iter_mut()) {
                let Some(cursor) = slot else {
                    continue;
                };
                match Self::step(cursor, unit, tracker, hooks) {
                    Ok(false) => {}
                    Ok(true) => *slot = None,
                    Err(e) => {
                        *slot = None;
                        self.fail_member(unit, e, on_error);
                    }
                }
            }
        }

        match &self.batch_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{write_chunk, OutputTarget};
    use std::ops::ControlFlow;

    #[test]
    fn test_restart_failure_fails_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.temp");
        std::fs::write(&path, b"stale").unwrap();
        // a read-only handle cannot be truncated
        let mut unit = DownloadUnit::new("http://h/empty", "d/empty", "empty");
        unit.set_output(OutputTarget::File(std::fs::File::open(&path).unwrap()));
        let mut tracker = ProgressTracker::new("http://h/empty", "empty");

        let engine = ScriptedEngine::new().with("http://h/empty", Script::ok(b"", 4));
        let progress = |_: &mut ProgressTracker, _: u64, _: u64| ControlFlow::Continue(());
        let hooks = TransferHooks {
            write: write_chunk,
            progress: &progress,
        };
        let options = TransferOptions {
            connect_timeout: std::time::Duration::ZERO,
            stall_timeout: std::time::Duration::from_secs(1),
            max_redirects: 0,
            user_agent: String::new(),
        };

        assert_eq!(engine.perform(&mut unit, &mut tracker, hooks, &options), Err(TransferError::Write));
    }
}
