//! Worker identities.
//!
//! Every runtime handle owns one worker identity, started as the thread's
//! main worker. Native workers (threads the worker pool spawned on its own)
//! are tracked separately so shutdown can wait for them to finish.

use crate::subsystems::WorkerPool;
use crossbeam::utils::Backoff;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Unique id of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Wraps a raw worker id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// A worker identity handed out by a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Worker {
    id: WorkerId,
    is_main: bool,
}

impl Worker {
    /// Creates a worker identity.
    pub const fn new(id: WorkerId, is_main: bool) -> Self {
        Self { id, is_main }
    }

    /// The worker's id.
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// True if this worker is the main worker of a runtime thread.
    pub const fn is_main(&self) -> bool {
        self.is_main
    }
}

/// Default [`WorkerPool`].
#[derive(Debug)]
pub struct WorkerRegistry {
    next_id: AtomicU64,
    native_workers: AtomicUsize,
    /// Workers whose thread-local data has not been destroyed yet.
    thread_data: Mutex<HashSet<WorkerId>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            native_workers: AtomicUsize::new(0),
            thread_data: Mutex::new(HashSet::new()),
        }
    }

    /// Number of native workers still running.
    pub fn native_workers(&self) -> usize {
        self.native_workers.load(Ordering::SeqCst)
    }

    /// Number of workers whose thread-local data is still registered.
    pub fn pending_thread_data(&self) -> usize {
        self.thread_data().len()
    }

    fn thread_data(&self) -> MutexGuard<'_, HashSet<WorkerId>> {
        self.thread_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool for WorkerRegistry {
    fn start(&self, is_main: bool) -> Worker {
        let id = WorkerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if !is_main {
            self.native_workers.fetch_add(1, Ordering::SeqCst);
        }
        self.thread_data().insert(id);
        log::trace!("started {} (main: {})", id, is_main);
        Worker::new(id, is_main)
    }

    fn stop(&self, worker: Worker) {
        if !worker.is_main() {
            self.native_workers.fetch_sub(1, Ordering::SeqCst);
        }
        log::trace!("stopped {}", worker.id());
    }

    fn id_of(&self, worker: &Worker) -> WorkerId {
        worker.id()
    }

    fn destroy_thread_local_data_if_needed(&self, id: WorkerId) {
        self.thread_data().remove(&id);
    }

    fn wait_for_all_native_workers_to_terminate(&self) {
        let backoff = Backoff::new();
        while self.native_workers() > 0 {
            backoff.snooze();
        }
    }
}
