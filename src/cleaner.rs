//! Cleaner worker.
//!
//! Cleanup actions for unreachable objects run on a dedicated thread, fed
//! through an unbounded channel. The thread is spawned on the first
//! submission. At shutdown the pending actions are either drained or
//! discarded, and the thread is joined before `shutdown` returns.

use crate::error::{LifecycleError, Result};
use crate::subsystems::CleanerPool;
use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// A cleanup action.
pub type CleanerJob = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(CleanerJob),
    Stop,
}

enum State {
    Idle,
    Running {
        sender: Sender<Message>,
        thread: JoinHandle<()>,
    },
    Stopped,
}

#[derive(Debug, Default)]
struct Counters {
    discard: AtomicBool,
    executed: AtomicUsize,
    discarded: AtomicUsize,
    panicked: AtomicUsize,
}

/// Default [`CleanerPool`] backed by one thread.
pub struct CleanerWorker {
    state: Mutex<State>,
    counters: Arc<Counters>,
}

impl CleanerWorker {
    /// Creates an idle cleaner worker.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queues a cleanup action.
    ///
    /// Fails with [`LifecycleError::CleanerStopped`] after shutdown.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state();
        if matches!(*state, State::Idle) {
            *state = self.spawn();
        }
        match &*state {
            State::Running { sender, .. } => sender
                .send(Message::Run(Box::new(job)))
                .map_err(|_| LifecycleError::CleanerStopped),
            _ => {
                log::warn!("cleaner job submitted after cleaner shutdown");
                Err(LifecycleError::CleanerStopped)
            }
        }
    }

    /// Number of cleanup actions that ran.
    pub fn executed(&self) -> usize {
        self.counters.executed.load(Ordering::SeqCst)
    }

    /// Number of cleanup actions dropped by a non-draining shutdown.
    pub fn discarded(&self) -> usize {
        self.counters.discarded.load(Ordering::SeqCst)
    }

    /// Number of cleanup actions that panicked.
    pub fn panicked(&self) -> usize {
        self.counters.panicked.load(Ordering::SeqCst)
    }

    /// Returns true once shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        matches!(*self.state(), State::Stopped)
    }

    fn spawn(&self) -> State {
        let (sender, receiver) = channel::unbounded();
        let counters = self.counters.clone();
        let spawned = thread::Builder::new()
            .name("jet-cleaner".to_string())
            .spawn(move || run_cleaner(receiver, counters));

        match spawned {
            Ok(thread) => State::Running { sender, thread },
            Err(err) => {
                log::error!("failed to spawn cleaner thread: {}", err);
                State::Stopped
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CleanerWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanerWorker")
            .field("counters", &self.counters)
            .finish()
    }
}

impl CleanerPool for CleanerWorker {
    fn shutdown(&self, drain: bool) {
        let previous = std::mem::replace(&mut *self.state(), State::Stopped);
        let State::Running { sender, thread } = previous else {
            return;
        };

        if !drain {
            self.counters.discard.store(true, Ordering::SeqCst);
        }
        // The channel is FIFO, so every job queued before this point is seen
        // before the stop message.
        let _ = sender.send(Message::Stop);
        drop(sender);

        if thread.join().is_err() {
            log::error!("cleaner thread terminated abnormally");
        }
        log::debug!(
            "cleaner stopped (drain: {}, executed: {}, discarded: {})",
            drain,
            self.executed(),
            self.discarded()
        );
    }
}

fn run_cleaner(receiver: Receiver<Message>, counters: Arc<Counters>) {
    for message in receiver.iter() {
        match message {
            Message::Run(job) => {
                if counters.discard.load(Ordering::SeqCst) {
                    counters.discarded.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    counters.panicked.fetch_add(1, Ordering::SeqCst);
                    log::error!("cleaner job panicked");
                }
                counters.executed.fetch_add(1, Ordering::SeqCst);
            }
            Message::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_jobs_run_on_cleaner_thread() {
        let cleaner = CleanerWorker::new();
        let (tx, rx) = mpsc::channel();
        cleaner
            .submit(move || {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();

        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("jet-cleaner"));
        cleaner.shutdown(true);
        assert_eq!(cleaner.executed(), 1);
    }

    #[test]
    fn test_drain_runs_pending_jobs() {
        let cleaner = CleanerWorker::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let c = counter.clone();
            cleaner
                .submit(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        cleaner.shutdown(true);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(cleaner.discarded(), 0);
    }

    #[test]
    fn test_non_draining_shutdown_discards() {
        let cleaner = CleanerWorker::new();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Hold the cleaner thread so the following jobs stay queued.
        cleaner
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();

        for _ in 0..10 {
            cleaner.submit(|| {}).unwrap();
        }

        let releaser = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            release_tx.send(()).unwrap();
        });
        cleaner.shutdown(false);
        releaser.join().unwrap();

        assert_eq!(cleaner.executed(), 1);
        assert_eq!(cleaner.discarded(), 10);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let cleaner = CleanerWorker::new();
        cleaner.shutdown(true);
        assert!(cleaner.is_stopped());
        assert_eq!(
            cleaner.submit(|| {}),
            Err(LifecycleError::CleanerStopped)
        );

        // A second shutdown is a no-op.
        cleaner.shutdown(false);
    }

    #[test]
    fn test_panicking_job_does_not_kill_cleaner() {
        let cleaner = CleanerWorker::new();
        cleaner.submit(|| panic!("cleanup failed")).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        cleaner
            .submit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        cleaner.shutdown(true);
        assert_eq!(cleaner.panicked(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
