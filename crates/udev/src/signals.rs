//! Process signal handlers for the hotplug path
//!
//! `SIGINT` and `SIGTERM` raise the coordinator's [`ShutdownSignal`];
//! the handlers touch nothing but atomics. `SIGKILL` cannot be caught
//! and is left alone.

use common::{Error, Result, ShutdownSignal, SignalTrap};
use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::Arc;
use tracing::debug;

/// Signals that request an orderly shutdown
pub const TRAPPED_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Signal trap backed by `signal-hook`
///
/// Handlers are unregistered again when the trap is dropped.
#[derive(Debug, Default)]
pub struct HookTrap {
    registered: Vec<SigId>,
}

impl HookTrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently registered handlers
    pub fn registered(&self) -> usize {
        self.registered.len()
    }
}

impl SignalTrap for HookTrap {
    fn install(&mut self, shutdown: Arc<ShutdownSignal>) -> Result<()> {
        for signal in TRAPPED_SIGNALS {
            let shutdown = shutdown.clone();
            // SAFETY: the handler only stores into atomics
            let id = unsafe {
                signal_hook::low_level::register(signal, move || shutdown.trigger(signal))
            }
            .map_err(|e| Error::Signal(format!("failed to trap signal {}: {}", signal, e)))?;
            self.registered.push(id);
        }

        debug!("Installed handlers for signals {:?}", TRAPPED_SIGNALS);
        Ok(())
    }
}

impl Drop for HookTrap {
    fn drop(&mut self) {
        for id in self.registered.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
