//! Error types for the lifecycle controller.
//!
//! Two families live here. [`LifecycleError`] is the only recoverable
//! channel and is returned through `Result`. [`Violation`] describes a broken
//! lifecycle protocol; it is never returned to callers, only reported to the
//! error console right before the process terminates.

use crate::status::GlobalStatus;

/// Failure to acquire a memory-manager state for a new runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("memory state allocation failed: {0}")]
pub struct AllocError(pub String);

/// Errors that a caller may reasonably handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The runtime handle could not be constructed.
    #[error("Failed to construct runtime: {0}")]
    Allocation(#[from] AllocError),

    /// A process-wide lifecycle manager has already been installed or used.
    #[error("A process-wide lifecycle manager is already installed")]
    AlreadyInstalled,

    /// The cleaner worker no longer accepts jobs.
    #[error("Cleaner worker has been shut down")]
    CleanerStopped,
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// A violated lifecycle invariant.
///
/// The `Display` output is the diagnostic written to the error console.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// `ensure` was called after the process-wide shutdown completed.
    #[error("Runtime was shut down. Cannot create new runtimes")]
    RuntimeShutDown,

    /// `shutdown_process` ran after a previous shutdown began.
    #[error("Cannot shutdown runtime twice")]
    ShutdownTwice,

    /// `shutdown_process` ran before any runtime started.
    #[error("Runtime must have been initialized before shutdown")]
    NotInitialized,

    /// `shutdown_process` ran on a thread that owns no runtime.
    #[error("Current thread must have a runtime initialized on it")]
    NoRuntimeOnThread,

    /// A handle was torn down while not running.
    #[error("Runtime {id} must be in the running state, found {found}")]
    NotRunning {
        /// Id of the offending runtime handle.
        id: u64,
        /// Status the handle was found in.
        found: &'static str,
    },

    /// A global status transition started from an unexpected state.
    #[error("Global runtime status must be {expected:?}, found {found:?}")]
    UnexpectedStatus {
        /// The state the transition requires.
        expected: GlobalStatus,
        /// The state actually observed.
        found: GlobalStatus,
    },

    /// Leak checking found other live runtimes at shutdown.
    #[error("Cannot run checkers when there are {0} alive runtimes at the shutdown")]
    LeakedRuntimes(isize),

    /// The thread already owns a runtime created by a different manager.
    #[error("No active runtimes allowed: thread already owns a runtime of another lifecycle")]
    ForeignRuntime,

    /// A runtime was requested while thread-local storage is being destroyed.
    #[error("Cannot create a runtime while the thread is exiting")]
    ThreadExiting,

    /// The alive-runtime counter dropped below zero.
    #[error("Alive runtime count cannot be negative")]
    NegativeAliveCount,
}
