//! Runtime lifecycle orchestration.
//!
//! [`Lifecycle`] owns every piece of process-wide lifecycle state: the
//! global status, the initializer chain, and the counters below.
//!
//! - `census` packs the number of live handles (low 32 bits) with a
//!   generation number (high 32 bits). A generation spans from an alive
//!   count of 0 -> 1 to the matching 1 -> 0; the decrement that empties the
//!   census also opens the next generation, in the same atomic step.
//! - `initializing` counts `ensure` calls in flight, so shutdown can wait
//!   for constructions that raced with it.
//! - `tearing_down` counts teardowns in flight. Shutdown waits for it to
//!   drain, and the last-out teardown waits until it is the only one left
//!   before running the global deinitializers.
//! - `globals_ready` holds `generation + 1` once that generation's global
//!   initializers finished; `globals_done` holds `generation + 1` once its
//!   global deinitializers finished. Later handles of a generation wait for
//!   the former, the first handle of a generation for the latter.
//!
//! Generations are 32-bit and wrap; every marker is compared modulo 2^32.
//!
//! None of this is guarded by a lock. All waits spin with backoff.

use crate::config::LifecycleConfig;
use crate::error::{Result, Violation};
use crate::fatal::{fatal, FatalPolicy};
use crate::handle::{self, InstanceStatus, RuntimeHandle, ThreadRuntime};
use crate::memory::MemoryState;
use crate::registry::{InitializerRegistry, Phase};
use crate::status::{GlobalStatus, StatusCell};
use crate::subsystems::Subsystems;
use crossbeam::utils::Backoff;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, Ordering};
use std::sync::Arc;

const GENERATION_SHIFT: u32 = 32;
const ALIVE_MASK: u64 = (1 << GENERATION_SHIFT) - 1;

/// The generation following `generation`, wrapping at 2^32.
fn next_generation(generation: u64) -> u64 {
    (generation + 1) & ALIVE_MASK
}

/// Counts one in-flight operation for as long as it lives.
struct InFlight<'a>(&'a AtomicIsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicIsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Shared {
    subsystems: Subsystems,
    registry: InitializerRegistry,
    status: StatusCell,
    census: AtomicU64,
    globals_ready: AtomicU64,
    globals_done: AtomicU64,
    initializing: AtomicIsize,
    tearing_down: AtomicIsize,
    memory_leak_checker: AtomicBool,
    cleaners_leak_checker: AtomicBool,
    fatal_policy: FatalPolicy,
}

/// Read-only view of the lifecycle counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleStats {
    /// Global runtime status.
    pub status: GlobalStatus,
    /// Live runtime handles.
    pub alive_runtimes: isize,
    /// `ensure` calls in flight.
    pub initializing_runtimes: isize,
    /// Teardowns in flight.
    pub tearing_down_runtimes: isize,
    /// Registered initializers.
    pub initializers: usize,
}

/// The lifecycle manager.
///
/// Cloning is cheap and yields another reference to the same manager.
///
/// # Example
///
/// ```
/// use jet_rt_lifecycle::{Lifecycle, LifecycleConfig, Subsystems};
///
/// let lifecycle = Lifecycle::new(LifecycleConfig::unchecked(), Subsystems::default());
/// std::thread::spawn(move || {
///     let handle = lifecycle.ensure().expect("runtime");
///     assert_eq!(lifecycle.ensure().unwrap().id, handle.id);
///     lifecycle.shutdown();
/// })
/// .join()
/// .unwrap();
/// ```
#[derive(Clone)]
pub struct Lifecycle {
    shared: Arc<Shared>,
}

impl Lifecycle {
    /// Creates a lifecycle manager driving `subsystems`.
    pub fn new(config: LifecycleConfig, subsystems: Subsystems) -> Self {
        Self {
            shared: Arc::new(Shared {
                subsystems,
                registry: InitializerRegistry::new(),
                status: StatusCell::new(),
                census: AtomicU64::new(0),
                globals_ready: AtomicU64::new(0),
                globals_done: AtomicU64::new(0),
                initializing: AtomicIsize::new(0),
                tearing_down: AtomicIsize::new(0),
                memory_leak_checker: AtomicBool::new(config.memory_leak_checker),
                cleaners_leak_checker: AtomicBool::new(config.cleaners_leak_checker),
                fatal_policy: config.fatal_policy,
            }),
        }
    }

    /// Returns true if both values refer to the same manager.
    pub fn same_as(&self, other: &Lifecycle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The subsystems driven by this manager.
    pub fn subsystems(&self) -> &Subsystems {
        &self.shared.subsystems
    }

    /// Appends an initializer to the chain.
    ///
    /// Initializers must be registered before the first runtime is created.
    /// Later registrations are accepted but only take part in phases that
    /// start after the call.
    pub fn register_initializer<F>(&self, initializer: F)
    where
        F: Fn(Phase, MemoryState) + Send + Sync + 'static,
    {
        if self.shared.status.load() != GlobalStatus::Uninitialized {
            log::warn!("initializer registered after the first runtime started");
        }
        self.shared.registry.append(Arc::new(initializer));
    }

    /// Ensures the calling thread has a runtime and returns it.
    ///
    /// Idempotent: a thread that already owns a runtime gets it back
    /// unchanged. Aborts if the runtime was shut down.
    pub fn ensure(&self) -> Result<RuntimeHandle> {
        if let Some(runtime) = handle::current() {
            if !runtime.belongs_to(self) {
                self.fatal(Violation::ForeignRuntime);
            }
            return Ok(runtime.snapshot());
        }

        let _constructing = InFlight::enter(&self.shared.initializing);

        if self.shared.status.try_start().is_err() {
            self.fatal(Violation::RuntimeShutDown);
        }
        if !handle::can_install() {
            self.fatal(Violation::ThreadExiting);
        }

        let subsystems = &self.shared.subsystems;
        let memory = subsystems.memory.initialize()?;
        let worker = subsystems.workers.start(true);
        let runtime = Rc::new(ThreadRuntime::new(self.clone(), memory, worker));
        if handle::install(runtime.clone()).is_err() {
            self.fatal(Violation::ThreadExiting);
        }

        let census = self.shared.census.fetch_add(1, Ordering::SeqCst);
        let generation = census >> GENERATION_SHIFT;
        if census & ALIVE_MASK == 0 {
            self.init_globals(generation, memory);
        } else {
            let ready = next_generation(generation);
            spin_until(|| self.shared.globals_ready.load(Ordering::SeqCst) == ready);
        }
        self.shared.registry.run_phase(Phase::InitThreadLocal, memory);

        runtime.mark_running();
        log::debug!(
            "{} running on {:?} with {}",
            runtime.id(),
            std::thread::current().id(),
            worker.id()
        );
        Ok(runtime.snapshot())
    }

    /// Tears down the calling thread's runtime, if it has one.
    pub fn teardown_if_present(&self) {
        if let Some(runtime) = handle::current() {
            if !runtime.belongs_to(self) {
                self.fatal(Violation::ForeignRuntime);
            }
            self.teardown(runtime);
        }
    }

    /// Shuts the runtime down for good.
    ///
    /// Must be called once, from a thread that owns a runtime. That runtime
    /// is torn down last. Aborts on a second call, before any runtime
    /// started, or when a leak checker finds other runtimes still alive.
    pub fn shutdown(&self) {
        match self.shared.status.begin_shutdown() {
            Ok(()) => {}
            Err(GlobalStatus::Uninitialized) => self.fatal(Violation::NotInitialized),
            Err(_) => self.fatal(Violation::ShutdownTwice),
        }

        let runtime = match handle::current() {
            Some(runtime) if runtime.belongs_to(self) => runtime,
            _ => self.fatal(Violation::NoRuntimeOnThread),
        };
        log::info!("shutting down runtime from {}", runtime.id());

        let subsystems = &self.shared.subsystems;
        let check_cleaners = self.cleaners_leak_checker_enabled();
        if check_cleaners {
            // Give lingering cleaners a chance to be enqueued.
            subsystems.memory.full_collection(runtime.memory());
        }
        subsystems.cleaners.shutdown(check_cleaners);

        if let Err(found) = self.shared.status.complete_shutdown() {
            self.fatal(Violation::UnexpectedStatus {
                expected: GlobalStatus::ShuttingDown,
                found,
            });
        }

        // No runtime can start any more; let the ones in flight settle.
        spin_until(|| self.shared.initializing.load(Ordering::SeqCst) == 0);
        spin_until(|| self.shared.tearing_down.load(Ordering::SeqCst) == 0);

        if self.memory_leak_checker_enabled() || check_cleaners {
            subsystems.workers.wait_for_all_native_workers_to_terminate();

            // Can only go down from here.
            let others = self.alive_runtimes() - 1;
            if others < 0 {
                self.fatal(Violation::NegativeAliveCount);
            }
            if others > 0 {
                self.fatal(Violation::LeakedRuntimes(others));
            }
        }

        self.teardown(runtime);
        log::info!("runtime shut down");
    }

    /// The calling thread's runtime, if it belongs to this manager.
    pub fn current(&self) -> Option<RuntimeHandle> {
        handle::current()
            .filter(|runtime| runtime.belongs_to(self))
            .map(|runtime| runtime.snapshot())
    }

    /// Current global status.
    pub fn status(&self) -> GlobalStatus {
        self.shared.status.load()
    }

    /// Snapshot of the lifecycle counters.
    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            status: self.shared.status.load(),
            alive_runtimes: self.alive_runtimes(),
            initializing_runtimes: self.shared.initializing.load(Ordering::SeqCst),
            tearing_down_runtimes: self.shared.tearing_down.load(Ordering::SeqCst),
            initializers: self.shared.registry.len(),
        }
    }

    /// Returns true if the memory leak checker is enabled.
    pub fn memory_leak_checker_enabled(&self) -> bool {
        self.shared.memory_leak_checker.load(Ordering::SeqCst)
    }

    /// Enables or disables the memory leak checker.
    pub fn set_memory_leak_checker(&self, enabled: bool) {
        self.shared
            .memory_leak_checker
            .store(enabled, Ordering::SeqCst);
    }

    /// Returns true if the cleaners leak checker is enabled.
    pub fn cleaners_leak_checker_enabled(&self) -> bool {
        self.shared.cleaners_leak_checker.load(Ordering::SeqCst)
    }

    /// Enables or disables the cleaners leak checker.
    pub fn set_cleaners_leak_checker(&self, enabled: bool) {
        self.shared
            .cleaners_leak_checker
            .store(enabled, Ordering::SeqCst);
    }

    /// Tears `runtime` down. Runs on the owning thread, either explicitly or
    /// from the thread-exit hook.
    pub(crate) fn teardown(&self, runtime: Rc<ThreadRuntime>) {
        if runtime.status() != InstanceStatus::Running {
            self.fatal(Violation::NotRunning {
                id: runtime.id().raw(),
                found: runtime.status().name(),
            });
        }
        runtime.mark_destroying();
        let tearing = InFlight::enter(&self.shared.tearing_down);

        let subsystems = &self.shared.subsystems;
        let memory = runtime.memory();
        // Thread-local "current state" may be gone already during thread exit.
        subsystems.memory.restore(memory);

        let (generation, last) = self.leave_census();

        self.shared
            .registry
            .run_phase(Phase::DeinitThreadLocal, memory);
        if last {
            self.deinit_globals(generation, memory);
        }

        let id = runtime.id();
        let worker = runtime.worker();
        let worker_id = subsystems.workers.id_of(&worker);
        subsystems.workers.stop(worker);
        subsystems.memory.deinitialize(memory);
        handle::release(&runtime);
        drop(runtime);
        // The handle is gone; only the detached worker id remains.
        subsystems
            .workers
            .destroy_thread_local_data_if_needed(worker_id);

        drop(tearing);
        log::debug!("{} torn down (last: {})", id, last);
    }

    fn alive_runtimes(&self) -> isize {
        (self.shared.census.load(Ordering::SeqCst) & ALIVE_MASK) as isize
    }

    /// Removes one handle from the census. Returns the handle's generation
    /// and whether it was the last one alive.
    fn leave_census(&self) -> (u64, bool) {
        let census = &self.shared.census;
        let mut current = census.load(Ordering::SeqCst);
        loop {
            let alive = current & ALIVE_MASK;
            if alive == 0 {
                self.fatal(Violation::NegativeAliveCount);
            }
            let generation = current >> GENERATION_SHIFT;
            let next = if alive == 1 {
                next_generation(generation) << GENERATION_SHIFT
            } else {
                current - 1
            };
            match census.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return (generation, alive == 1),
                Err(actual) => current = actual,
            }
        }
    }

    fn init_globals(&self, generation: u64, memory: MemoryState) {
        // The previous generation may still be running its global deinit.
        spin_until(|| self.shared.globals_done.load(Ordering::SeqCst) == generation);
        log::info!("first runtime started, initializing globals (generation {})", generation);

        let subsystems = &self.shared.subsystems;
        subsystems.console.init();
        if let Some(bridge) = &subsystems.bridge {
            bridge.initialize();
        }
        self.shared.registry.run_phase(Phase::InitGlobal, memory);

        self.shared
            .globals_ready
            .store(next_generation(generation), Ordering::SeqCst);
    }

    fn deinit_globals(&self, generation: u64, memory: MemoryState) {
        // Every other teardown of this generation already left the census;
        // let them finish their thread-local deinit first.
        spin_until(|| self.shared.tearing_down.load(Ordering::SeqCst) <= 1);
        log::info!("last runtime stopped, deinitializing globals (generation {})", generation);

        self.shared.registry.run_phase(Phase::DeinitGlobal, memory);
        self.shared
            .globals_done
            .store(next_generation(generation), Ordering::SeqCst);
    }

    fn fatal(&self, violation: Violation) -> ! {
        fatal(
            self.shared.subsystems.console.as_ref(),
            self.shared.fatal_policy,
            violation,
        )
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("stats", &self.stats())
            .field("subsystems", &self.shared.subsystems)
            .finish()
    }
}

fn spin_until(mut done: impl FnMut() -> bool) {
    let backoff = Backoff::new();
    while !done() {
        backoff.snooze();
    }
}
