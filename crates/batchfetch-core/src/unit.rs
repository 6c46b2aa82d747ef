//! Download units and their output targets

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::warn;

/// Named collection of units submitted as one batch, keyed by the caller
pub type DownloadUnits = HashMap<String, DownloadUnit>;

/// Fixed-capacity, caller-allocated memory a buffer transfer writes into.
///
/// Cloning shares the same storage; the downloader only ever writes into
/// the space the caller allocated and never grows it.
#[derive(Clone)]
pub struct SharedBuffer {
    data: Arc<Mutex<Box<[u8]>>>,
}

impl SharedBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_boxed(vec![0u8; capacity].into_boxed_slice())
    }

    /// Wrap memory the caller already owns
    pub fn from_boxed(data: Box<[u8]>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.lock().len()
    }

    /// Lock the storage for reading or writing
    pub fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.data.lock()
    }

    /// Copy out the first `len` bytes (clamped to capacity)
    pub fn to_vec(&self, len: usize) -> Vec<u8> {
        let data = self.data.lock();
        data[..len.min(data.len())].to_vec()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Where the bytes of one transfer go
#[derive(Debug, Default)]
pub enum OutputTarget {
    /// Nothing open: never prepared, failed to open, or already closed
    #[default]
    Closed,
    /// Temporary file on disk
    File(File),
    /// Caller-owned memory, filled from `offset` onwards
    Buffer { buffer: SharedBuffer, offset: usize },
}

impl OutputTarget {
    pub fn is_open(&self) -> bool {
        !matches!(self, OutputTarget::Closed)
    }

    /// Close the target. Closing an already closed target is a no-op;
    /// returns whether anything was open.
    pub fn close(&mut self) -> bool {
        let was_open = self.is_open();
        if let OutputTarget::File(file) = self {
            if let Err(e) = file.flush() {
                warn!("Failed to flush output file: {}", e);
            }
        }
        *self = OutputTarget::Closed;
        was_open
    }

    /// Number of bytes already present in the target, i.e. where a resumed
    /// transfer should continue from
    pub fn resume_offset(&self) -> u64 {
        match self {
            OutputTarget::Closed => 0,
            OutputTarget::File(file) => file.metadata().map(|m| m.len()).unwrap_or(0),
            OutputTarget::Buffer { offset, .. } => *offset as u64,
        }
    }

    /// Discard everything written so far
    pub fn restart(&mut self) -> io::Result<()> {
        match self {
            OutputTarget::Closed => Ok(()),
            OutputTarget::File(file) => {
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                Ok(())
            }
            OutputTarget::Buffer { offset, .. } => {
                *offset = 0;
                Ok(())
            }
        }
    }
}

/// One requested transfer
#[derive(Debug)]
pub struct DownloadUnit {
    /// Source URI
    pub url: String,
    /// Destination path; empty for memory transfers
    pub destination: String,
    /// Caller-supplied token echoed back in every callback
    pub identity: String,
    /// Continue from an existing temporary file when the server allows it
    pub resume: bool,
    output: OutputTarget,
}

impl DownloadUnit {
    pub fn new(url: impl Into<String>, destination: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            identity: identity.into(),
            resume: false,
            output: OutputTarget::Closed,
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub(crate) fn for_buffer(url: &str, identity: &str, buffer: SharedBuffer) -> Self {
        Self {
            url: url.to_string(),
            destination: String::new(),
            identity: identity.to_string(),
            resume: false,
            output: OutputTarget::Buffer { buffer, offset: 0 },
        }
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputTarget {
        &mut self.output
    }

    pub(crate) fn set_output(&mut self, output: OutputTarget) {
        self.output = output;
    }
}

/// Write callback handed to the transfer engine.
///
/// Returns the number of bytes consumed; anything short of `chunk.len()`
/// tells the engine to abort the transfer. Buffer targets never take a
/// partial chunk: a chunk that would run past capacity consumes nothing.
pub fn write_chunk(chunk: &[u8], unit: &mut DownloadUnit) -> usize {
    match &mut unit.output {
        OutputTarget::Closed => 0,
        OutputTarget::File(file) => match file.write_all(chunk) {
            Ok(()) => chunk.len(),
            Err(e) => {
                warn!("Write to {} failed: {}", unit.destination, e);
                0
            }
        },
        OutputTarget::Buffer { buffer, offset } => {
            let mut data = buffer.lock();
            let end = match offset.checked_add(chunk.len()) {
                Some(end) if end <= data.len() => end,
                _ => return 0,
            };
            data[*offset..end].copy_from_slice(chunk);
            *offset = end;
            chunk.len()
        }
    }
}
