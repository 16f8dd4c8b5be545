//! Contracts of the subsystems the lifecycle drives.
//!
//! The lifecycle never looks inside the memory manager, the worker pool or
//! the cleaner pool; it only sequences the calls below. [`Subsystems`]
//! bundles one implementation of each.

use crate::cleaner::CleanerWorker;
use crate::console::StderrConsole;
use crate::error::AllocError;
use crate::memory::{MemoryState, TrackingHeap};
use crate::worker::{Worker, WorkerId, WorkerRegistry};
use std::sync::Arc;

/// Memory manager contract.
pub trait MemoryManager: Send + Sync {
    /// Creates the memory state of a new runtime and makes it current on the
    /// calling thread.
    fn initialize(&self) -> Result<MemoryState, AllocError>;

    /// Makes `state` current again. Must not rely on the thread's locals,
    /// which may already be cleared during thread exit.
    fn restore(&self, state: MemoryState);

    /// Releases `state`.
    fn deinitialize(&self, state: MemoryState);

    /// Runs one full collection on behalf of `state`.
    fn full_collection(&self, state: MemoryState);
}

/// Worker pool contract.
pub trait WorkerPool: Send + Sync {
    /// Starts a worker identity for the calling thread.
    fn start(&self, is_main: bool) -> Worker;

    /// Releases the worker's main resources.
    fn stop(&self, worker: Worker);

    /// Returns the id of `worker`.
    fn id_of(&self, worker: &Worker) -> WorkerId;

    /// Cleans up thread-local remnants keyed by a detached worker id.
    fn destroy_thread_local_data_if_needed(&self, id: WorkerId);

    /// Blocks until every native worker thread terminated.
    fn wait_for_all_native_workers_to_terminate(&self);
}

/// Cleaner (finalizer) pool contract.
pub trait CleanerPool: Send + Sync {
    /// Stops the pool, running pending cleanup actions first iff `drain`.
    fn shutdown(&self, drain: bool);
}

/// Console contract.
pub trait Console: Send + Sync {
    /// Initializes console I/O. Called once per generation of runtimes.
    fn init(&self);

    /// Writes a diagnostic line to the error console.
    fn error(&self, message: &str);
}

/// Foreign object-model bridge initialization.
pub trait InteropBridge: Send + Sync {
    /// Initializes the bridge. Called once per generation of runtimes.
    fn initialize(&self);
}

/// The set of subsystems driven by a [`Lifecycle`](crate::Lifecycle).
#[derive(Clone)]
pub struct Subsystems {
    /// Memory manager.
    pub memory: Arc<dyn MemoryManager>,
    /// Worker pool.
    pub workers: Arc<dyn WorkerPool>,
    /// Cleaner pool.
    pub cleaners: Arc<dyn CleanerPool>,
    /// Error console.
    pub console: Arc<dyn Console>,
    /// Interop bridge, if the runtime was built with one.
    pub bridge: Option<Arc<dyn InteropBridge>>,
}

impl Subsystems {
    /// Replaces the memory manager.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryManager>) -> Self {
        self.memory = memory;
        self
    }

    /// Replaces the worker pool.
    pub fn with_workers(mut self, workers: Arc<dyn WorkerPool>) -> Self {
        self.workers = workers;
        self
    }

    /// Replaces the cleaner pool.
    pub fn with_cleaners(mut self, cleaners: Arc<dyn CleanerPool>) -> Self {
        self.cleaners = cleaners;
        self
    }

    /// Replaces the console.
    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    /// Installs an interop bridge.
    pub fn with_bridge(mut self, bridge: Arc<dyn InteropBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }
}

impl Default for Subsystems {
    fn default() -> Self {
        Self {
            memory: Arc::new(TrackingHeap::new()),
            workers: Arc::new(WorkerRegistry::new()),
            cleaners: Arc::new(CleanerWorker::new()),
            console: Arc::new(StderrConsole::new()),
            bridge: None,
        }
    }
}

impl std::fmt::Debug for Subsystems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subsystems")
            .field("bridge", &self.bridge.is_some())
            .finish_non_exhaustive()
    }
}
