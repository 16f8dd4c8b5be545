//! Per-thread runtime handles.
//!
//! A thread owns at most one runtime handle, kept in a thread-local slot.
//! The handle is `!Send`: it is bound to the thread that created it and can
//! neither migrate nor be torn down from elsewhere.
//!
//! The slot doubles as the thread-exit hook. When the thread terminates with
//! a handle still running, the slot's destructor tears it down. By then the
//! slot itself is no longer reachable, so the handle being torn down is
//! published in a second thread-local without a destructor for the duration
//! of that teardown. Lookups made from inside it see the handle in its
//! `Destroying` state, exactly as during an explicit teardown.

use crate::lifecycle::Lifecycle;
use crate::memory::MemoryState;
use crate::worker::{Worker, WorkerId};
use std::cell::{Cell, RefCell};
use std::ptr;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::AccessError;

/// Unique id of a runtime handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn next() -> Self {
        static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// Lifecycle status of one runtime handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstanceStatus {
    /// Being constructed.
    Uninitialized,
    /// Usable.
    Running,
    /// Being torn down; no longer usable.
    Destroying,
}

impl InstanceStatus {
    pub(crate) fn name(self) -> &'static str {
        match self {
            InstanceStatus::Uninitialized => "uninitialized",
            InstanceStatus::Running => "running",
            InstanceStatus::Destroying => "destroying",
        }
    }
}

/// A snapshot of the calling thread's runtime handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeHandle {
    /// Handle id.
    pub id: RuntimeId,
    /// Memory state owned by the handle.
    pub memory: MemoryState,
    /// Worker identity owned by the handle.
    pub worker: WorkerId,
    /// Status at the time of the snapshot.
    pub status: InstanceStatus,
}

/// The handle itself, owned by the thread-local slot.
pub(crate) struct ThreadRuntime {
    id: RuntimeId,
    owner: Lifecycle,
    memory: MemoryState,
    worker: Worker,
    status: Cell<InstanceStatus>,
}

impl ThreadRuntime {
    pub(crate) fn new(owner: Lifecycle, memory: MemoryState, worker: Worker) -> Self {
        Self {
            id: RuntimeId::next(),
            owner,
            memory,
            worker,
            status: Cell::new(InstanceStatus::Uninitialized),
        }
    }

    pub(crate) fn id(&self) -> RuntimeId {
        self.id
    }

    pub(crate) fn memory(&self) -> MemoryState {
        self.memory
    }

    pub(crate) fn worker(&self) -> Worker {
        self.worker
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        self.status.get()
    }

    pub(crate) fn belongs_to(&self, lifecycle: &Lifecycle) -> bool {
        self.owner.same_as(lifecycle)
    }

    pub(crate) fn mark_running(&self) {
        debug_assert_eq!(self.status(), InstanceStatus::Uninitialized);
        self.status.set(InstanceStatus::Running);
    }

    pub(crate) fn mark_destroying(&self) {
        debug_assert_eq!(self.status(), InstanceStatus::Running);
        self.status.set(InstanceStatus::Destroying);
    }

    pub(crate) fn snapshot(&self) -> RuntimeHandle {
        RuntimeHandle {
            id: self.id,
            memory: self.memory,
            worker: self.worker.id(),
            status: self.status(),
        }
    }
}

struct Slot {
    current: RefCell<Option<Rc<ThreadRuntime>>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let Some(runtime) = self.current.get_mut().take() else {
            return;
        };
        if runtime.status() == InstanceStatus::Running {
            log::debug!("{} torn down on thread exit", runtime.id());
            let owner = runtime.owner.clone();
            let _exiting = Exiting::publish(&runtime);
            owner.teardown(runtime);
        }
    }
}

/// Keeps the handle torn down on thread exit reachable from [`current`].
struct Exiting {
    runtime: Rc<ThreadRuntime>,
}

impl Exiting {
    fn publish(runtime: &Rc<ThreadRuntime>) -> Self {
        let runtime = runtime.clone();
        let _ = EXITING.try_with(|exiting| exiting.set(Rc::as_ptr(&runtime)));
        Self { runtime }
    }
}

impl Drop for Exiting {
    fn drop(&mut self) {
        let _ = EXITING.try_with(|exiting| {
            if ptr::eq(exiting.get(), Rc::as_ptr(&self.runtime)) {
                exiting.set(ptr::null());
            }
        });
    }
}

thread_local! {
    static CURRENT: Slot = const {
        Slot {
            current: RefCell::new(None),
        }
    };

    // No drop glue: stays readable while other thread-locals are destroyed.
    static EXITING: Cell<*const ThreadRuntime> = const { Cell::new(ptr::null()) };
}

/// Returns the calling thread's handle, if any.
///
/// During thread exit this is the handle being torn down, if any.
pub(crate) fn current() -> Option<Rc<ThreadRuntime>> {
    match CURRENT.try_with(|slot| slot.current.borrow().clone()) {
        Ok(current) => current,
        Err(_) => exiting(),
    }
}

fn exiting() -> Option<Rc<ThreadRuntime>> {
    let runtime = EXITING.try_with(Cell::get).ok()?;
    if runtime.is_null() {
        return None;
    }
    // SAFETY: the pointer is only published while an `Exiting` guard holds a
    // strong reference to it, and it never leaves this thread.
    unsafe {
        Rc::increment_strong_count(runtime);
        Some(Rc::from_raw(runtime))
    }
}

/// Returns false once the thread's locals are being destroyed, when no new
/// handle can be installed any more.
pub(crate) fn can_install() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Publishes `runtime` as the calling thread's handle.
///
/// Fails once the thread's locals are being destroyed.
pub(crate) fn install(runtime: Rc<ThreadRuntime>) -> Result<(), AccessError> {
    CURRENT.try_with(|slot| {
        *slot.current.borrow_mut() = Some(runtime);
    })
}

/// Clears the slot if it still holds `runtime`.
pub(crate) fn release(runtime: &Rc<ThreadRuntime>) {
    // The slot is already gone when tearing down on thread exit.
    let _ = CURRENT.try_with(|slot| {
        let mut current = slot.current.borrow_mut();
        if current
            .as_ref()
            .is_some_and(|held| Rc::ptr_eq(held, runtime))
        {
            *current = None;
        }
    });
}
