//! CLI command implementations

use crate::output::{format_bytes, print_output, print_report};
use crate::progress::DownloadProgress;
use crate::OutputFormat;
use anyhow::{anyhow, bail, Context, Result};
use batchfetch_core::{file_name_from_url, DownloadUnit, DownloadUnits, Downloader, HostQueue, SharedBuffer};
use batchfetch_types::{BatchReport, CompletedDownload, DownloadError, Manifest, Settings};
use console::style;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// Session
// ============================================================================

/// What the callbacks have seen so far
#[derive(Default)]
struct Collected {
    succeeded: Vec<CompletedDownload>,
    failed: Vec<DownloadError>,
    /// Bytes received per identity
    received: HashMap<String, u64>,
    /// Identity of the batch that reported completion
    finished_batch: Option<String>,
}

/// A downloader hosted on the calling thread, with callbacks wired to
/// progress bars and a result collector
struct Session {
    queue: Arc<HostQueue>,
    downloader: Downloader,
    progress: Arc<DownloadProgress>,
    collected: Arc<Mutex<Collected>>,
}

impl Session {
    fn new(settings: Settings, timeout: Option<i64>, format: OutputFormat) -> Result<Self> {
        let queue = HostQueue::new();
        let downloader = Downloader::with_http(queue.clone(), settings)
            .context("Failed to start the HTTP engine")?;
        if let Some(secs) = timeout {
            downloader.set_connection_timeout(secs);
        }

        let progress = Arc::new(match format {
            OutputFormat::Json => DownloadProgress::hidden(),
            OutputFormat::Human | OutputFormat::Table => DownloadProgress::new(),
        });
        let collected = Arc::new(Mutex::new(Collected::default()));

        let (p, c) = (progress.clone(), collected.clone());
        downloader.set_progress_callback(move |total, downloaded, _url, identity| {
            p.update(identity, total, downloaded);
            c.lock().received.insert(identity.to_string(), downloaded);
        });

        let (p, c) = (progress.clone(), collected.clone());
        downloader.set_success_callback(move |url, path, identity| {
            let mut collected = c.lock();
            if url.is_empty() {
                collected.finished_batch = Some(identity.to_string());
                return;
            }
            p.finish(identity);
            collected.succeeded.push(CompletedDownload {
                url: url.to_string(),
                path: path.to_string(),
                identity: identity.to_string(),
            });
        });

        let (p, c) = (progress.clone(), collected.clone());
        downloader.set_error_callback(move |error| {
            p.fail(&error.identity, &error.message);
            c.lock().failed.push(error.clone());
        });

        Ok(Self {
            queue,
            downloader,
            progress,
            collected,
        })
    }

    fn take(&self) -> Collected {
        self.progress.clear();
        std::mem::take(&mut *self.collected.lock())
    }
}

fn fail_with(errors: &[DownloadError]) -> Result<()> {
    for e in errors {
        eprintln!("{} {}", style("✗").red().bold(), e);
    }
    match errors.first() {
        Some(first) => bail!("Download failed: {}", first.message),
        None => Ok(()),
    }
}

/// Make sure a destination carries a directory part
fn destination_for(url: &str, output: Option<PathBuf>) -> Result<String> {
    let path = match output {
        Some(path) => path,
        None => {
            let name = file_name_from_url(url);
            if name.is_empty() {
                bail!("Cannot derive a file name from {}; pass --output", url);
            }
            std::env::current_dir()?.join(name)
        }
    };

    let has_dir = path.parent().is_some_and(|dir| !dir.as_os_str().is_empty());
    let path = if has_dir { path } else { Path::new(".").join(path) };
    Ok(path.display().to_string())
}

// ============================================================================
// Single Downloads
// ============================================================================

pub fn get(
    settings: Settings,
    timeout: Option<i64>,
    url: &str,
    output: Option<PathBuf>,
    id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let destination = destination_for(url, output)?;
    let identity = id.unwrap_or_else(|| url.to_string());
    let session = Session::new(settings, timeout, format)?;

    debug!("Fetching {} to {}", url, destination);
    session.downloader.download_sync(url, &destination, &identity);
    let collected = session.take();
    fail_with(&collected.failed)?;

    let done = collected
        .succeeded
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Download of {} finished without a result", url))?;
    let size = std::fs::metadata(&done.path).map(|m| m.len()).unwrap_or(0);

    match format {
        OutputFormat::Json => print_output(&serde_json::json!({
            "url": done.url,
            "path": done.path,
            "identity": done.identity,
            "bytes": size,
        }), format)?,
        OutputFormat::Human | OutputFormat::Table => {
            println!(
                "{} Downloaded {} ({})",
                style("✓").green().bold(),
                style(&done.path).cyan(),
                format_bytes(size)
            );
        }
    }

    Ok(())
}

pub fn mem(
    settings: Settings,
    timeout: Option<i64>,
    url: &str,
    capacity: usize,
    id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let identity = id.unwrap_or_else(|| url.to_string());
    let session = Session::new(settings, timeout, format)?;
    let buffer = SharedBuffer::with_capacity(capacity);

    session
        .downloader
        .download_to_buffer_sync(url, buffer.clone(), &identity);
    let collected = session.take();
    fail_with(&collected.failed)?;

    let received = collected.received.get(&identity).copied().unwrap_or(0);
    let preview_len = usize::try_from(received).unwrap_or(usize::MAX).min(64);
    let preview = String::from_utf8_lossy(&buffer.to_vec(preview_len)).into_owned();

    match format {
        OutputFormat::Json => print_output(&serde_json::json!({
            "url": url,
            "identity": identity,
            "bytes": received,
            "capacity": capacity,
            "preview": preview,
        }), format)?,
        OutputFormat::Human | OutputFormat::Table => {
            println!(
                "{} Received {} of {} buffer",
                style("✓").green().bold(),
                format_bytes(received),
                format_bytes(capacity as u64)
            );
            println!("  {}", style(preview).dim());
        }
    }

    Ok(())
}

// ============================================================================
// Batch Downloads
// ============================================================================

fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    Ok(manifest)
}

fn units_from(manifest: Manifest, resume: bool) -> Result<DownloadUnits> {
    let mut units = DownloadUnits::new();
    for entry in manifest.entries {
        let identity = entry.id.unwrap_or_else(|| entry.url.clone());
        let unit = DownloadUnit::new(entry.url, entry.destination, identity.clone())
            .with_resume(entry.resume || resume);
        if units.insert(identity.clone(), unit).is_some() {
            bail!("Duplicate manifest entry {}", identity);
        }
    }
    Ok(units)
}

pub fn batch(
    settings: Settings,
    timeout: Option<i64>,
    manifest_path: &Path,
    batch_id: Option<String>,
    resume: bool,
    format: OutputFormat,
) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let batch_id = batch_id
        .or_else(|| manifest.batch_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let units = units_from(manifest, resume)?;
    let total = units.len();

    let session = Session::new(settings, timeout, format)?;
    let worker = session.downloader.batch_download_async(units, &batch_id)?;

    // pump host tasks until the batch reports completion
    loop {
        session.queue.wait_for_tasks(Duration::from_millis(100));
        session.queue.run_pending();
        if session.collected.lock().finished_batch.is_some() {
            break;
        }
        if worker.is_finished() && session.queue.pending() == 0 {
            warn!("Batch worker exited without reporting completion");
            break;
        }
    }
    worker
        .join()
        .map_err(|_| anyhow!("Batch worker for {} panicked", batch_id))?;

    let collected = session.take();
    let report = BatchReport {
        batch_id,
        succeeded: collected.succeeded,
        failed: collected.failed,
    };
    print_report(&report, format)?;

    if !report.is_clean() {
        bail!("{} of {} downloads failed", report.failed.len(), total);
    }
    Ok(())
}
