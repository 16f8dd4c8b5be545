//! Memory-manager states owned by runtime handles.
//!
//! The lifecycle only ever sees a [`MemoryState`] as an opaque token issued
//! by a [`MemoryManager`](crate::MemoryManager). [`TrackingHeap`] is the
//! default manager: it does no allocation of its own, it keeps books on the
//! states it handed out and on which one is current for each thread.

use crate::error::AllocError;
use crate::subsystems::MemoryManager;
use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Opaque handle to a memory-manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryState(u64);

impl MemoryState {
    /// Wraps a raw state id issued by a memory manager.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw state id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

thread_local! {
    static CURRENT_STATE: Cell<Option<MemoryState>> = const { Cell::new(None) };
}

/// Returns the memory state current on this thread, if any.
///
/// Reads as `None` once the thread's locals are being destroyed.
pub fn current_memory_state() -> Option<MemoryState> {
    CURRENT_STATE.try_with(Cell::get).ok().flatten()
}

fn set_current(state: Option<MemoryState>) {
    // Thread-local storage may already be gone during thread exit.
    let _ = CURRENT_STATE.try_with(|current| current.set(state));
}

/// Default [`MemoryManager`] that tracks issued states.
#[derive(Debug)]
pub struct TrackingHeap {
    next_id: AtomicU64,
    live: Mutex<HashSet<MemoryState>>,
    collections: AtomicUsize,
    limit: Option<usize>,
}

impl TrackingHeap {
    /// Creates a heap without a limit on live states.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
            collections: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Creates a heap that refuses to hand out more than `limit` live states.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of states initialized and not yet deinitialized.
    pub fn live_states(&self) -> usize {
        self.live().len()
    }

    /// Number of full collections performed.
    pub fn collections(&self) -> usize {
        self.collections.load(Ordering::Relaxed)
    }

    fn live(&self) -> MutexGuard<'_, HashSet<MemoryState>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TrackingHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for TrackingHeap {
    fn initialize(&self) -> Result<MemoryState, AllocError> {
        let mut live = self.live();
        if let Some(limit) = self.limit {
            if live.len() >= limit {
                return Err(AllocError(format!("{} live memory states", live.len())));
            }
        }
        let state = MemoryState(self.next_id.fetch_add(1, Ordering::Relaxed));
        live.insert(state);
        drop(live);

        set_current(Some(state));
        Ok(state)
    }

    fn restore(&self, state: MemoryState) {
        set_current(Some(state));
    }

    fn deinitialize(&self, state: MemoryState) {
        if !self.live().remove(&state) {
            log::warn!("deinitializing unknown memory state {:?}", state);
        }
        if current_memory_state() == Some(state) {
            set_current(None);
        }
    }

    fn full_collection(&self, state: MemoryState) {
        log::debug!("full collection requested from {:?}", state);
        self.collections.fetch_add(1, Ordering::Relaxed);
    }
}
