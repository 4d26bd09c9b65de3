//! Common utilities for udev
//!
//! This crate holds the seams between the udev front-end and the
//! subsystems it drives (system bus, naming policy, device node
//! operations, signal delivery), the shared error type, logging setup,
//! and recording test doubles for each seam.

pub mod collaborators;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod test_utils;

pub use collaborators::{DeviceContext, DeviceOps, Naming, NamingPolicy, SystemBus};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use shutdown::{ShutdownSignal, SignalTrap};
