//! udev front-end
//!
//! A single `udev` invocation either handles one kernel hotplug event
//! (create or remove a device node and remember it) or answers one
//! interactive query against the records of previously created nodes.
//!
//! - [`mode`] decides which of the two an invocation is.
//! - [`hotplug`] is the event coordinator: filtering, resource lifecycle,
//!   signal handling and dispatch to the node operations.
//! - [`query`] is the read-only query and dump interface.
//!
//! The remaining modules are the concrete subsystems the binary wires
//! into the coordinator.

pub mod bus;
pub mod config;
pub mod hotplug;
pub mod mode;
pub mod namedev;
pub mod node;
pub mod query;
pub mod signals;
pub mod sysfs;

pub use config::UdevConfig;
pub use hotplug::{Collaborators, HotplugEnv, HotplugEvent, run_hotplug};
pub use mode::InvocationMode;
pub use query::{QueryType, run_interactive};

/// Version string reported by `-V`
pub const UDEV_VERSION: &str = env!("CARGO_PKG_VERSION");
