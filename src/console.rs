//! Error console used for fatal diagnostics.

use crate::subsystems::Console;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default [`Console`] writing to the process's standard error.
#[derive(Debug, Default)]
pub struct StderrConsole {
    initialized: AtomicBool,
}

impl StderrConsole {
    /// Creates a console.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the first runtime initialized the console.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

impl Console for StderrConsole {
    fn init(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    fn error(&self, message: &str) {
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(out, "{}", message);
        let _ = out.flush();
    }
}
