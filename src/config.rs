//! Lifecycle configuration.

use crate::fatal::FatalPolicy;

/// Lifecycle configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Check for leaked runtimes at shutdown.
    pub memory_leak_checker: bool,
    /// Check for leaked cleaners at shutdown. Also makes shutdown run a full
    /// collection and drain the cleaner pool.
    pub cleaners_leak_checker: bool,
    /// What happens after a fatal diagnostic was reported.
    pub fatal_policy: FatalPolicy,
}

impl LifecycleConfig {
    /// Configuration with both leak checkers enabled.
    ///
    /// # Example
    ///
    /// ```
    /// use jet_rt_lifecycle::LifecycleConfig;
    ///
    /// let config = LifecycleConfig::checked();
    /// assert!(config.memory_leak_checker);
    /// assert!(config.cleaners_leak_checker);
    /// ```
    pub fn checked() -> Self {
        Self {
            memory_leak_checker: true,
            cleaners_leak_checker: true,
            ..Default::default()
        }
    }

    /// Configuration with both leak checkers disabled.
    pub fn unchecked() -> Self {
        Self {
            memory_leak_checker: false,
            cleaners_leak_checker: false,
            ..Default::default()
        }
    }

    /// Enables or disables the memory leak checker.
    pub fn with_memory_leak_checker(mut self, enabled: bool) -> Self {
        self.memory_leak_checker = enabled;
        self
    }

    /// Enables or disables the cleaners leak checker.
    pub fn with_cleaners_leak_checker(mut self, enabled: bool) -> Self {
        self.cleaners_leak_checker = enabled;
        self
    }

    /// Sets the fatal policy.
    ///
    /// # Example
    ///
    /// ```
    /// use jet_rt_lifecycle::{FatalPolicy, LifecycleConfig};
    ///
    /// let config = LifecycleConfig::default().with_fatal_policy(FatalPolicy::Panic);
    /// assert_eq!(config.fatal_policy, FatalPolicy::Panic);
    /// ```
    pub fn with_fatal_policy(mut self, policy: FatalPolicy) -> Self {
        self.fatal_policy = policy;
        self
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            memory_leak_checker: cfg!(debug_assertions),
            cleaners_leak_checker: cfg!(debug_assertions),
            fatal_policy: FatalPolicy::Abort,
        }
    }
}
