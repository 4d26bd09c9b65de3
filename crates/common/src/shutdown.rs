//! Cancellation state shared with signal handlers
//!
//! Signal handlers only flip atomics here. All cleanup happens on the
//! normal execution path once it notices the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Shutdown request raised from a signal handler
#[derive(Debug)]
pub struct ShutdownSignal {
    /// Whether shutdown has been requested
    signaled: AtomicBool,
    /// The signal number that triggered shutdown (0 if not triggered)
    signal_num: AtomicI32,
}

impl ShutdownSignal {
    /// Create a new shutdown signal in the non-signaled state
    pub fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            signal_num: AtomicI32::new(0),
        }
    }

    /// Check if shutdown has been signaled
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Get the signal number that triggered shutdown (0 if none)
    pub fn signal_number(&self) -> i32 {
        self.signal_num.load(Ordering::Acquire)
    }

    /// Record a shutdown request; async-signal-safe
    pub fn trigger(&self, signal_num: i32) {
        self.signal_num.store(signal_num, Ordering::Release);
        self.signaled.store(true, Ordering::Release);
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the process signal handlers that feed a [`ShutdownSignal`]
pub trait SignalTrap {
    fn install(&mut self, shutdown: Arc<ShutdownSignal>) -> crate::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_initial_state() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_signaled());
        assert_eq!(signal.signal_number(), 0);
    }

    #[test]
    fn test_shutdown_signal_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger(15);
        assert!(signal.is_signaled());
        assert_eq!(signal.signal_number(), 15);
    }
}
