//! Recording subsystems shared by the integration tests.

#![allow(dead_code)]

use jet_rt_lifecycle::{
    AllocError, CleanerPool, Console, FatalPolicy, InteropBridge, Lifecycle, LifecycleConfig,
    MemoryManager, MemoryState, Phase, Subsystems, Worker, WorkerId, WorkerPool,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Something a subsystem was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MemoryInit(MemoryState),
    Restore(MemoryState),
    MemoryDeinit(MemoryState),
    FullCollection(MemoryState),
    WorkerStart(WorkerId),
    WorkerStop(WorkerId),
    DestroyThreadData(WorkerId),
    WaitWorkers,
    CleanersShutdown { drain: bool },
    ConsoleInit,
    BridgeInit,
    Error(String),
    Phase(Phase),
}

/// Subsystems that log every call.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    next_id: AtomicU64,
    fail_next_alloc: AtomicBool,
    phase_counts: [AtomicUsize; 4],
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        })
    }

    pub fn subsystems(self: &Arc<Self>) -> Subsystems {
        Subsystems::default()
            .with_memory(self.clone())
            .with_workers(self.clone())
            .with_cleaners(self.clone())
            .with_console(self.clone())
            .with_bridge(self.clone())
    }

    /// A lifecycle whose violations panic, with `config`'s leak checkers and
    /// an initializer that records every phase.
    pub fn lifecycle(self: &Arc<Self>, config: LifecycleConfig) -> Lifecycle {
        let lifecycle = Lifecycle::new(
            config.with_fatal_policy(FatalPolicy::Panic),
            self.subsystems(),
        );
        let recorder = self.clone();
        lifecycle.register_initializer(move |phase, _| recorder.record_phase(phase));
        lifecycle
    }

    pub fn fail_next_alloc(&self) {
        self.fail_next_alloc.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn phase_count(&self, phase: Phase) -> usize {
        self.phase_counts[phase.code() as usize].load(Ordering::SeqCst)
    }

    /// Position of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(|event| predicate(event))
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn record_phase(&self, phase: Phase) {
        self.phase_counts[phase.code() as usize].fetch_add(1, Ordering::SeqCst);
        self.record(Event::Phase(phase));
    }
}

impl MemoryManager for Recorder {
    fn initialize(&self) -> Result<MemoryState, AllocError> {
        if self.fail_next_alloc.swap(false, Ordering::SeqCst) {
            return Err(AllocError("injected failure".to_string()));
        }
        let state = MemoryState::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(Event::MemoryInit(state));
        Ok(state)
    }

    fn restore(&self, state: MemoryState) {
        self.record(Event::Restore(state));
    }

    fn deinitialize(&self, state: MemoryState) {
        self.record(Event::MemoryDeinit(state));
    }

    fn full_collection(&self, state: MemoryState) {
        self.record(Event::FullCollection(state));
    }
}

impl WorkerPool for Recorder {
    fn start(&self, is_main: bool) -> Worker {
        let id = WorkerId::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(Event::WorkerStart(id));
        Worker::new(id, is_main)
    }

    fn stop(&self, worker: Worker) {
        self.record(Event::WorkerStop(worker.id()));
    }

    fn id_of(&self, worker: &Worker) -> WorkerId {
        worker.id()
    }

    fn destroy_thread_local_data_if_needed(&self, id: WorkerId) {
        self.record(Event::DestroyThreadData(id));
    }

    fn wait_for_all_native_workers_to_terminate(&self) {
        self.record(Event::WaitWorkers);
    }
}

impl CleanerPool for Recorder {
    fn shutdown(&self, drain: bool) {
        self.record(Event::CleanersShutdown { drain });
    }
}

impl Console for Recorder {
    fn init(&self) {
        self.record(Event::ConsoleInit);
    }

    fn error(&self, message: &str) {
        self.record(Event::Error(message.to_string()));
    }
}

impl InteropBridge for Recorder {
    fn initialize(&self) {
        self.record(Event::BridgeInit);
    }
}

/// Extracts the message of a panic raised by a fatal violation.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
