//! Global-variable initializer chain.
//!
//! Modules register their initializers while the process is still
//! single-threaded, before any runtime exists. The chain is append-only and
//! keeps registration order for every phase, init and deinit alike, since
//! later modules may rely on earlier ones.
//!
//! The mutex only guards the reference to the current chain. It is released
//! before any callback runs, so an initializer may freely call back into the
//! runtime, and running a phase never copies the chain.

use crate::memory::MemoryState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The moment at which the initializer chain is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// First runtime of the process came up.
    InitGlobal = 0,
    /// A runtime came up on the current thread.
    InitThreadLocal = 1,
    /// The runtime on the current thread is going away.
    DeinitThreadLocal = 2,
    /// The last runtime of the process is going away.
    DeinitGlobal = 3,
}

impl Phase {
    /// Returns true for the two initializing phases.
    pub fn is_init(self) -> bool {
        matches!(self, Phase::InitGlobal | Phase::InitThreadLocal)
    }

    /// Returns true for the two process-wide phases.
    pub fn is_global(self) -> bool {
        matches!(self, Phase::InitGlobal | Phase::DeinitGlobal)
    }

    /// Numeric phase code passed across the native boundary.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A registered initializer callback.
pub type Initializer = Arc<dyn Fn(Phase, MemoryState) + Send + Sync + 'static>;

/// Append-only, insertion-ordered chain of initializers.
///
/// Appending copies the chain when a phase is running over it; running a
/// phase only takes another reference to the current chain.
#[derive(Default)]
pub struct InitializerRegistry {
    chain: Mutex<Arc<Vec<Initializer>>>,
}

impl InitializerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `initializer` to the tail of the chain.
    pub fn append(&self, initializer: Initializer) {
        let mut chain = self.chain();
        Arc::make_mut(&mut chain).push(initializer);
    }

    /// Number of registered initializers.
    pub fn len(&self) -> usize {
        self.chain().len()
    }

    /// Returns true if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every initializer in registration order.
    pub fn run_phase(&self, phase: Phase, memory: MemoryState) {
        let snapshot = Arc::clone(&self.chain());
        log::trace!(
            "running {} initializers for {:?} on {:?}",
            snapshot.len(),
            phase,
            memory
        );
        for initializer in snapshot.iter() {
            initializer(phase, memory);
        }
    }

    fn chain(&self) -> MutexGuard<'_, Arc<Vec<Initializer>>> {
        // A panicking initializer never holds this lock, so poison carries no
        // information about the chain itself.
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InitializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializerRegistry")
            .field("len", &self.len())
            .finish()
    }
}
