//! Host-thread scheduling
//!
//! Every user callback runs on the host's designated thread. The
//! downloader only needs two things from the host: a way to queue a task
//! for that thread and a way to ask whether it is already on it.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::warn;

/// A unit of work to run on the host thread
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler owned by the embedding application
pub trait HostScheduler: Send + Sync {
    /// Queue `task` to run on the host thread
    fn run_on_host(&self, task: HostTask);

    /// Whether the calling thread is the host thread
    fn is_host_thread(&self) -> bool;
}

/// Task queue bound to the thread that created it.
///
/// Worker threads push tasks; the host drains them from its own loop with
/// [`HostQueue::run_pending`], optionally blocking in
/// [`HostQueue::wait_for_tasks`] until something arrives.
pub struct HostQueue {
    host: ThreadId,
    tasks: Mutex<VecDeque<HostTask>>,
    ready: Condvar,
}

impl HostQueue {
    /// Create a queue whose host is the current thread
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            host: thread::current().id(),
            tasks: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        })
    }

    pub fn host_thread(&self) -> ThreadId {
        self.host
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Run every queued task, including ones queued by the tasks themselves
    /// while draining. Must be called on the host thread; elsewhere it
    /// runs nothing.
    pub fn run_pending(&self) -> usize {
        if !self.is_host_thread() {
            warn!("HostQueue::run_pending called off the host thread");
            return 0;
        }

        let mut ran = 0;
        loop {
            let batch: Vec<HostTask> = self.tasks.lock().drain(..).collect();
            if batch.is_empty() {
                return ran;
            }
            for task in batch {
                task();
                ran += 1;
            }
        }
    }

    /// Block until at least one task is queued or `timeout` elapses.
    /// Returns whether tasks are pending.
    pub fn wait_for_tasks(&self, timeout: Duration) -> bool {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            self.ready.wait_for(&mut tasks, timeout);
        }
        !tasks.is_empty()
    }
}

impl HostScheduler for HostQueue {
    fn run_on_host(&self, task: HostTask) {
        self.tasks.lock().push_back(task);
        self.ready.notify_all();
    }

    fn is_host_thread(&self) -> bool {
        thread::current().id() == self.host
    }
}
