//! Jet Runtime Lifecycle
//!
//! This crate brings per-thread runtime instances into existence, runs the
//! global-variable initializer chain at the right moments, tears instances
//! down on thread exit, and performs the one-time, irreversible process
//! shutdown.
//!
//! # Architecture
//!
//! - **Status**: process-wide `Uninitialized -> Running -> ShuttingDown -> Shutdown`
//! - **Registry**: ordered chain of global-variable initializers
//! - **Handles**: one runtime per thread, kept in thread-local storage
//! - **Lifecycle**: `ensure`, `teardown` and `shutdown` over the above
//! - **Subsystems**: memory manager, worker pool, cleaner pool and console,
//!   driven through traits
//!
//! Protocol violations are not errors: they print a diagnostic and abort
//! the process.
//!
//! # Usage
//!
//! ```rust,no_run
//! use jet_rt_lifecycle::{ensure_runtime, register_global_initializer, shutdown_process, Phase};
//!
//! register_global_initializer(|phase, _memory| {
//!     if phase == Phase::InitGlobal {
//!         // set up module globals
//!     }
//! });
//!
//! ensure_runtime().expect("Failed to create runtime");
//! // managed code runs here
//! shutdown_process();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::sync::OnceLock;

pub mod cleaner;
mod config;
mod console;
mod error;
mod fatal;
mod handle;
mod lifecycle;
pub mod memory;
pub mod platform;
mod registry;
mod status;
mod subsystems;
pub mod worker;

pub use cleaner::{CleanerJob, CleanerWorker};
pub use config::LifecycleConfig;
pub use console::StderrConsole;
pub use error::{AllocError, LifecycleError, Result, Violation};
pub use fatal::FatalPolicy;
pub use handle::{InstanceStatus, RuntimeHandle, RuntimeId};
pub use lifecycle::{Lifecycle, LifecycleStats};
pub use memory::{MemoryState, TrackingHeap};
pub use registry::{Initializer, InitializerRegistry, Phase};
pub use status::GlobalStatus;
pub use subsystems::{CleanerPool, Console, InteropBridge, MemoryManager, Subsystems, WorkerPool};
pub use worker::{Worker, WorkerId, WorkerRegistry};

static GLOBAL: OnceLock<Lifecycle> = OnceLock::new();

/// Installs the process-wide lifecycle manager.
///
/// Must happen before the first call to any of the free functions below,
/// which otherwise create a default manager on first use.
pub fn install(lifecycle: Lifecycle) -> Result<()> {
    GLOBAL
        .set(lifecycle)
        .map_err(|_| LifecycleError::AlreadyInstalled)
}

/// Returns the process-wide lifecycle manager.
pub fn global() -> &'static Lifecycle {
    GLOBAL.get_or_init(|| Lifecycle::new(LifecycleConfig::default(), Subsystems::default()))
}

/// Ensures the calling thread has a runtime.
///
/// Call on every entry from native code into managed code.
pub fn ensure_runtime() -> Result<RuntimeHandle> {
    global().ensure()
}

/// Tears down the calling thread's runtime, if it has one.
pub fn teardown_runtime_if_present() {
    global().teardown_if_present()
}

/// Shuts the process-wide runtime down. Callable once.
pub fn shutdown_process() {
    global().shutdown()
}

/// Registers a global-variable initializer.
///
/// Meant for module load time, before any runtime exists.
pub fn register_global_initializer<F>(initializer: F)
where
    F: Fn(Phase, MemoryState) + Send + Sync + 'static,
{
    global().register_initializer(initializer)
}

/// Returns true if the memory leak checker is enabled.
pub fn memory_leak_checker_enabled() -> bool {
    global().memory_leak_checker_enabled()
}

/// Enables or disables the memory leak checker.
pub fn set_memory_leak_checker(enabled: bool) {
    global().set_memory_leak_checker(enabled)
}

/// Returns true if the cleaners leak checker is enabled.
pub fn cleaners_leak_checker_enabled() -> bool {
    global().cleaners_leak_checker_enabled()
}

/// Enables or disables the cleaners leak checker.
pub fn set_cleaners_leak_checker(enabled: bool) {
    global().set_cleaners_leak_checker(enabled)
}
