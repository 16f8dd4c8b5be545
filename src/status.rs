//! Process-wide runtime status.
//!
//! The status only ever moves forward:
//! `Uninitialized -> Running -> ShuttingDown -> Shutdown`.
//! Every transition is a single compare-and-swap; no lock guards the cell.

use std::sync::atomic::{AtomicU8, Ordering};

/// The global runtime status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum GlobalStatus {
    /// No runtime has been created yet.
    Uninitialized = 0,
    /// Runtimes may be created.
    Running = 1,
    /// Shutdown has begun; cleaners are being stopped.
    ShuttingDown = 2,
    /// Shutdown completed; no runtime may be created any more.
    Shutdown = 3,
}

impl GlobalStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => GlobalStatus::Uninitialized,
            1 => GlobalStatus::Running,
            2 => GlobalStatus::ShuttingDown,
            _ => GlobalStatus::Shutdown,
        }
    }
}

/// Atomic cell holding a [`GlobalStatus`].
#[derive(Debug)]
pub(crate) struct StatusCell {
    raw: AtomicU8,
}

impl StatusCell {
    pub(crate) const fn new() -> Self {
        Self {
            raw: AtomicU8::new(GlobalStatus::Uninitialized as u8),
        }
    }

    /// Returns the current status.
    pub(crate) fn load(&self) -> GlobalStatus {
        GlobalStatus::from_raw(self.raw.load(Ordering::SeqCst))
    }

    /// Moves `Uninitialized -> Running`.
    ///
    /// Succeeds when runtimes may still be created, which includes the
    /// `ShuttingDown` window. Returns `Err(Shutdown)` once shutdown completed.
    pub(crate) fn try_start(&self) -> Result<(), GlobalStatus> {
        match self.swap(GlobalStatus::Uninitialized, GlobalStatus::Running) {
            GlobalStatus::Shutdown => Err(GlobalStatus::Shutdown),
            _ => Ok(()),
        }
    }

    /// Moves `Running -> ShuttingDown`, returning the prior status on failure.
    pub(crate) fn begin_shutdown(&self) -> Result<(), GlobalStatus> {
        match self.swap(GlobalStatus::Running, GlobalStatus::ShuttingDown) {
            GlobalStatus::Running => Ok(()),
            other => Err(other),
        }
    }

    /// Moves `ShuttingDown -> Shutdown`, returning the prior status on failure.
    pub(crate) fn complete_shutdown(&self) -> Result<(), GlobalStatus> {
        match self.swap(GlobalStatus::ShuttingDown, GlobalStatus::Shutdown) {
            GlobalStatus::ShuttingDown => Ok(()),
            other => Err(other),
        }
    }

    /// Compare-and-swap that always reports the value seen before the call.
    fn swap(&self, current: GlobalStatus, new: GlobalStatus) -> GlobalStatus {
        match self.raw.compare_exchange(
            current as u8,
            new as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(prev) | Err(prev) => GlobalStatus::from_raw(prev),
        }
    }
}
