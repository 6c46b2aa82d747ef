//! Shared fixtures for downloader tests

use super::Downloader;
use crate::engine::scripted::ScriptedEngine;
use crate::host::HostQueue;
use batchfetch_types::{DownloadError, ErrorKind, Settings};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Error(DownloadError),
    Progress {
        total: u64,
        downloaded: u64,
        url: String,
        identity: String,
    },
    Success {
        url: String,
        path: String,
        identity: String,
    },
}

/// Records every callback together with the thread it ran on
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<(ThreadId, Event)>>>,
}

impl Recorder {
    pub fn attach(downloader: &Downloader) -> Self {
        let recorder = Self::default();

        let r = recorder.clone();
        downloader.set_error_callback(move |error| r.push(Event::Error(error.clone())));
        let r = recorder.clone();
        downloader.set_progress_callback(move |total, downloaded, url, identity| {
            r.push(Event::Progress {
                total,
                downloaded,
                url: url.to_string(),
                identity: identity.to_string(),
            })
        });
        let r = recorder.clone();
        downloader.set_success_callback(move |url, path, identity| {
            r.push(Event::Success {
                url: url.to_string(),
                path: path.to_string(),
                identity: identity.to_string(),
            })
        });

        recorder
    }

    fn push(&self, event: Event) {
        self.events.lock().push((thread::current().id(), event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.events.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn errors(&self) -> Vec<DownloadError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors().into_iter().map(|e| e.kind).collect()
    }

    /// `(url, path, identity)` of every success, in order
    pub fn successes(&self) -> Vec<(String, String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Success { url, path, identity } => Some((url, path, identity)),
                _ => None,
            })
            .collect()
    }

    /// `downloaded` of every progress sample for `identity`
    pub fn progress_of(&self, identity: &str) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress {
                    downloaded,
                    identity: id,
                    ..
                } if id == identity => Some(downloaded),
                _ => None,
            })
            .collect()
    }
}

pub(crate) struct Fixture {
    pub engine: Arc<ScriptedEngine>,
    pub queue: Arc<HostQueue>,
    pub downloader: Downloader,
    pub recorder: Recorder,
}

impl Fixture {
    /// Downloader over `engine` whose host is the calling thread
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_settings(engine, Settings::default())
    }

    pub fn with_settings(engine: ScriptedEngine, settings: Settings) -> Self {
        let engine = Arc::new(engine);
        let queue = HostQueue::new();
        let downloader = Downloader::new(engine.clone(), queue.clone(), settings);
        let recorder = Recorder::attach(&downloader);
        Self {
            engine,
            queue,
            downloader,
            recorder,
        }
    }
}

/// Destination string inside `dir` using `/` separators
pub(crate) fn dest(dir: &Path, name: &str) -> String {
    format!("{}/{}", dir.display(), name)
}
