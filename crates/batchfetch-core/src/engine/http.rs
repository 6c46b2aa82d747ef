//! HTTP(S) transfer engine backed by reqwest
//!
//! The engine owns a small multi-thread tokio runtime. Callers are plain
//! OS threads (the downloader's workers or the host itself), which block
//! on the runtime for the duration of a transfer. Batch members run as
//! concurrent futures on that runtime and share one connection pool.

use super::{
    BatchErrorFn, BatchTransferError, TransferEngine, TransferError, TransferHooks, TransferOptions,
};
use crate::error::FetchError;
use crate::tracker::ProgressTracker;
use crate::unit::DownloadUnit;
use futures::future::join_all;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};
use url::Url;

/// Transfer engine speaking HTTP(S) through reqwest.
///
/// Its methods block the calling thread and must not be called from
/// inside an async context.
pub struct HttpEngine {
    runtime: Option<Runtime>,
    handle: Handle,
    /// Client built for the most recently used options
    client: Mutex<Option<(TransferOptions, Client)>>,
}

impl HttpEngine {
    pub fn new() -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("batchfetch-http")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            client: Mutex::new(None),
        })
    }

    fn client(&self, options: &TransferOptions) -> Result<Client, reqwest::Error> {
        let mut cached = self.client.lock();
        if let Some((cached_options, client)) = cached.as_ref() {
            if cached_options == options {
                return Ok(client.clone());
            }
        }

        let mut builder = Client::builder()
            .user_agent(options.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects));
        // zero keeps the transport default
        if !options.connect_timeout.is_zero() {
            builder = builder.connect_timeout(options.connect_timeout);
        }
        let client = builder.build()?;

        *cached = Some((options.clone(), client.clone()));
        Ok(client)
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Stream one resource into its unit's output
async fn transfer(
    client: &Client,
    unit: &mut DownloadUnit,
    tracker: &mut ProgressTracker,
    hooks: TransferHooks<'_>,
    stall_timeout: Duration,
) -> Result<(), TransferError> {
    let url = Url::parse(&unit.url)
        .map_err(|e| TransferError::MalformedUrl(format!("{}: {}", unit.url, e)))?;

    let mut offset = unit.output().resume_offset();
    let mut request = client.get(url.clone());
    if offset > 0 {
        debug!("Resuming {} from byte {}", unit.url, offset);
        request = request.header(RANGE, format!("bytes={}-", offset));
    }

    let mut response = request.send().await?;
    if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        debug!("{} rejected range from byte {}, starting over", unit.url, offset);
        unit.output_mut().restart().map_err(|_| TransferError::Write)?;
        offset = 0;
        response = client.get(url).send().await?;
    }

    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::HttpStatus(status.as_u16()));
    }

    let base = if offset > 0 && status == StatusCode::PARTIAL_CONTENT {
        offset
    } else {
        if offset > 0 {
            debug!("{} ignored the range request, starting over", unit.url);
            unit.output_mut().restart().map_err(|_| TransferError::Write)?;
        }
        0
    };

    // totals are absolute: bytes already on disk count towards both
    let total = response.content_length().map(|len| len + base).unwrap_or(0);
    let mut received = base;
    if base > 0 && (hooks.progress)(tracker, total, received).is_break() {
        return Err(TransferError::Aborted);
    }

    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::time::timeout(stall_timeout, stream.next())
            .await
            .map_err(|_| TransferError::Stalled(stall_timeout))?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;

        if (hooks.write)(&chunk, unit) < chunk.len() {
            return Err(TransferError::Write);
        }
        received += chunk.len() as u64;

        if (hooks.progress)(tracker, total, received).is_break() {
            return Err(TransferError::Aborted);
        }
    }

    debug!("{} finished after {} bytes", unit.url, received);
    Ok(())
}

impl TransferEngine for HttpEngine {
    fn supports_resume(&self, url: &str, options: &TransferOptions) -> bool {
        let client = match self.client(options) {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not build HTTP client: {}", e);
                return false;
            }
        };

        let result = self
            .handle
            .block_on(async { client.get(url).header(RANGE, "bytes=0-0").send().await });

        match result {
            Ok(response) => response.status() == StatusCode::PARTIAL_CONTENT,
            Err(e) => {
                debug!("Resume probe for {} failed: {}", url, e);
                false
            }
        }
    }

    fn perform(
        &self,
        unit: &mut DownloadUnit,
        tracker: &mut ProgressTracker,
        hooks: TransferHooks<'_>,
        options: &TransferOptions,
    ) -> Result<(), TransferError> {
        let client = self
            .client(options)
            .map_err(|e| TransferError::Setup(e.to_string()))?;

        info!("Transfer starting: {}", unit.url);
        self.handle
            .block_on(transfer(&client, unit, tracker, hooks, options.stall_timeout))
    }

    fn perform_batch(
        &self,
        units: &mut [DownloadUnit],
        trackers: &mut [ProgressTracker],
        hooks: TransferHooks<'_>,
        on_error: &BatchErrorFn<'_>,
        options: &TransferOptions,
    ) -> Result<(), BatchTransferError> {
        if units.len() != trackers.len() {
            return Err(BatchTransferError::Mismatched {
                units: units.len(),
                trackers: trackers.len(),
            });
        }

        let client = self
            .client(options)
            .map_err(|e| BatchTransferError::Setup(e.to_string()))?;
        let stall_timeout = options.stall_timeout;

        info!("Batch transfer starting: {} units", units.len());
        self.handle.block_on(async {
            let client = &client;
            let transfers = units
                .iter_mut()
                .zip(trackers.iter_mut())
                .map(|(unit, tracker)| async move {
                    if let Err(e) = transfer(client, unit, tracker, hooks, stall_timeout).await {
                        warn!("Batch member {} ({}) failed: {}", unit.identity, unit.url, e);
                        unit.output_mut().close();
                        on_error(&BatchTransferError::Member(e), &unit.identity);
                    }
                });
            join_all(transfers).await;
        });

        Ok(())
    }
}
