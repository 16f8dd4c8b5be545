//! Fatal protocol violations.
//!
//! A broken lifecycle invariant is a caller bug, never a recoverable
//! condition. The diagnostic goes to the error console and the log, then
//! the process aborts. Embedders that need to observe violations in their
//! own test harness may switch to [`FatalPolicy::Panic`].

use crate::error::Violation;
use crate::subsystems::Console;

/// What to do after a fatal diagnostic has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// Abort the process.
    #[default]
    Abort,
    /// Panic with the diagnostic as payload.
    Panic,
}

/// Reports `violation` and terminates according to `policy`.
#[cold]
#[inline(never)]
pub(crate) fn fatal(console: &dyn Console, policy: FatalPolicy, violation: Violation) -> ! {
    let message = violation.to_string();
    console.error(&message);
    log::error!("fatal runtime error: {}", message);

    match policy {
        FatalPolicy::Abort => std::process::abort(),
        FatalPolicy::Panic => panic!("{}", message),
    }
}
