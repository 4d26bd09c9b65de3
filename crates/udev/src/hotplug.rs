//! Hotplug event coordinator
//!
//! Handles exactly one kernel hotplug event per process:
//!
//! 1. Filter the event (`DEVPATH`, device class, subsystem blacklist, `ACTION`).
//!    A filtered event is not an error; the process exits 0.
//! 2. Acquire, in order: system bus connection, read/write record store,
//!    signal handlers, naming policy.
//! 3. Dispatch `add`/`remove` to the device node operations.
//! 4. Close the store, then disconnect the bus.
//!
//! Every acquired resource is tracked in [`LifecycleState`] and released
//! exactly once on every exit path. Signal handlers never clean up
//! themselves; they raise a [`ShutdownSignal`] that the coordinator polls
//! between steps, after which it disconnects the bus, closes the store
//! and exits with `20 + signum`.

use common::{DeviceContext, DeviceOps, Error, NamingPolicy, ShutdownSignal, SignalTrap, SystemBus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use udevdb::RecordStore;

/// Subsystems whose events are never handled; the empty entry ends the list
pub const SUBSYSTEM_BLACKLIST: &[&str] = &[
    "net",
    "scsi_host",
    "scsi_device",
    "usb_host",
    "pci_bus",
    "",
];

/// Exit code offset for termination by a trapped signal
pub const SIGNAL_EXIT_BASE: i32 = 20;

/// Hotplug environment as handed over by the kernel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotplugEnv {
    /// `ACTION`
    pub action: Option<String>,
    /// `DEVPATH`
    pub devpath: Option<String>,
    /// `SEQNUM`, informational only
    pub seqnum: Option<String>,
}

impl HotplugEnv {
    /// Read the hotplug variables from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the hotplug variables from a key/value map
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            action: lookup("ACTION"),
            devpath: lookup("DEVPATH"),
            seqnum: lookup("SEQNUM"),
        }
    }
}

/// Hotplug action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    /// Anything else, kept verbatim for reporting
    Unknown(String),
}

impl From<&str> for Action {
    fn from(action: &str) -> Self {
        match action {
            "add" => Action::Add,
            "remove" => Action::Remove,
            other => Action::Unknown(other.to_string()),
        }
    }
}

/// Why an event was not handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    NoDevpath,
    /// Neither a class nor a block device
    NotClassOrBlock(String),
    Blacklisted(String),
    NoAction,
}

/// A hotplug event that passed filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: Action,
    pub devpath: String,
    pub subsystem: String,
    pub seqnum: Option<String>,
}

impl HotplugEvent {
    /// Build the event for `subsystem`, or report why it is ignored
    pub fn from_env(env: &HotplugEnv, subsystem: &str) -> Result<Self, Ignored> {
        let devpath = env
            .devpath
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(Ignored::NoDevpath)?;

        // we only care about class devices and block stuff
        if !devpath.contains("class") && !devpath.contains("block") {
            return Err(Ignored::NotClassOrBlock(devpath.to_string()));
        }

        if is_blacklisted(subsystem) {
            return Err(Ignored::Blacklisted(subsystem.to_string()));
        }

        let action = env.action.as_deref().ok_or(Ignored::NoAction)?;

        Ok(Self {
            action: Action::from(action),
            devpath: devpath.to_string(),
            subsystem: subsystem.to_string(),
            seqnum: env.seqnum.clone(),
        })
    }
}

/// Whether events of `subsystem` are skipped
pub fn is_blacklisted(subsystem: &str) -> bool {
    SUBSYSTEM_BLACKLIST
        .iter()
        .take_while(|entry| !entry.is_empty())
        .any(|entry| *entry == subsystem)
}

/// Turn an operation status into a process exit code
///
/// A positive status means nothing needed doing and counts as success;
/// a negative status is a negated errno.
pub fn exit_code(status: i32) -> i32 {
    if status > 0 { 0 } else { -status }
}

/// Resources currently held by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleState {
    pub bus_connected: bool,
    pub store_open: bool,
    pub signals_installed: bool,
    pub naming_ready: bool,
}

/// Subsystems the coordinator drives
pub struct Collaborators<'a> {
    pub bus: &'a mut dyn SystemBus,
    pub store: &'a mut dyn RecordStore,
    pub naming: &'a mut dyn NamingPolicy,
    pub devices: &'a mut dyn DeviceOps,
    pub signals: &'a mut dyn SignalTrap,
}

/// How an event run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Raw operation status, normalized by [`exit_code`]
    Status(i32),
    /// A trapped signal arrived
    Interrupted(i32),
}

/// Handle one hotplug event and return the process exit code
pub fn run_hotplug(subsystem: &str, env: &HotplugEnv, parts: Collaborators<'_>) -> i32 {
    let event = match HotplugEvent::from_env(env, subsystem) {
        Ok(event) => event,
        Err(reason) => {
            match &reason {
                Ignored::NoDevpath => debug!("no devpath, ignoring event"),
                Ignored::NotClassOrBlock(path) => {
                    debug!("'{}' is not a block or class device", path)
                }
                Ignored::Blacklisted(subsystem) => {
                    debug!("don't care about '{}' devices", subsystem)
                }
                Ignored::NoAction => debug!("no action, ignoring event"),
            }
            return 0;
        }
    };

    debug!(
        "looking at '{}' (subsystem={}, seqnum={})",
        event.devpath,
        event.subsystem,
        event.seqnum.as_deref().unwrap_or("-")
    );

    let mut session = Session::new(parts, Arc::new(ShutdownSignal::new()));
    match session.run(&event) {
        Outcome::Status(status) => exit_code(status),
        Outcome::Interrupted(signum) => SIGNAL_EXIT_BASE + signum,
    }
}

/// One event's worth of acquired resources
///
/// Release methods are idempotent and `Drop` releases whatever is still
/// held, so no exit path can leak or double-release a resource.
struct Session<'a> {
    parts: Collaborators<'a>,
    shutdown: Arc<ShutdownSignal>,
    state: LifecycleState,
}

impl<'a> Session<'a> {
    fn new(parts: Collaborators<'a>, shutdown: Arc<ShutdownSignal>) -> Self {
        Self {
            parts,
            shutdown,
            state: LifecycleState::default(),
        }
    }

    fn run(&mut self, event: &HotplugEvent) -> Outcome {
        if let Err(e) = self.parts.bus.connect() {
            error!("Unable to connect to the system bus: {}", e);
            return Outcome::Status(-e.errno());
        }
        self.state.bus_connected = true;

        if let Err(e) = self.parts.store.init() {
            error!("Unable to initialize record store: {}", e);
            self.disconnect_bus();
            return Outcome::Status(-e.errno());
        }
        self.state.store_open = true;

        if let Err(e) = self.parts.signals.install(self.shutdown.clone()) {
            error!("Unable to install signal handlers: {}", e);
            return self.teardown(-e.errno());
        }
        self.state.signals_installed = true;

        if let Some(outcome) = self.check_interrupt() {
            return outcome;
        }

        if let Err(e) = self.parts.naming.init() {
            error!("Unable to initialize naming policy: {}", e);
            return self.teardown(-e.errno());
        }
        self.state.naming_ready = true;

        if let Some(outcome) = self.check_interrupt() {
            return outcome;
        }

        let status = match self.dispatch(event) {
            Ok(status) => status,
            Err(e) => {
                warn!("{} of '{}' failed: {}", action_name(&event.action), event.devpath, e);
                -e.errno()
            }
        };

        if let Some(outcome) = self.check_interrupt() {
            return outcome;
        }

        self.teardown(status)
    }

    fn dispatch(&mut self, event: &HotplugEvent) -> common::Result<i32> {
        let ctx = DeviceContext {
            store: &mut *self.parts.store,
            naming: &*self.parts.naming,
            bus: &mut *self.parts.bus,
        };

        match &event.action {
            Action::Add => self.parts.devices.add(ctx, &event.devpath, &event.subsystem),
            Action::Remove => self
                .parts
                .devices
                .remove(ctx, &event.devpath, &event.subsystem),
            Action::Unknown(action) => {
                debug!("unknown action '{}'", action);
                Err(Error::UnknownAction(action.clone()))
            }
        }
    }

    /// Poll the shutdown flag; on a hit release everything and report the signal
    fn check_interrupt(&mut self) -> Option<Outcome> {
        if !self.shutdown.is_signaled() {
            return None;
        }

        let signum = self.shutdown.signal_number();
        info!("caught signal {}, shutting down", signum);
        self.disconnect_bus();
        self.close_store();
        Some(Outcome::Interrupted(signum))
    }

    /// Normal release order: store first, then bus
    fn teardown(&mut self, status: i32) -> Outcome {
        self.close_store();
        self.disconnect_bus();
        Outcome::Status(status)
    }

    fn close_store(&mut self) {
        if !std::mem::take(&mut self.state.store_open) {
            return;
        }
        if let Err(e) = self.parts.store.close() {
            error!("Failed to close record store: {}", e);
        }
    }

    fn disconnect_bus(&mut self) {
        if std::mem::take(&mut self.state.bus_connected) {
            self.parts.bus.disconnect();
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close_store();
        self.disconnect_bus();
    }
}

fn action_name(action: &Action) -> &str {
    match action {
        Action::Add => "add",
        Action::Remove => "remove",
        Action::Unknown(action) => action.as_str(),
    }
}
