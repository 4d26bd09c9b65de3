//! Interfaces of the subsystems driven by the event coordinator
//!
//! The coordinator never reaches these through globals. Each one is
//! handed in explicitly, which is also how tests substitute the
//! recording doubles from [`crate::test_utils`].

use crate::Result;
use udevdb::{DeviceRecord, RecordStore};

/// System message bus used to announce created and removed nodes
pub trait SystemBus {
    /// Connect to the bus
    fn connect(&mut self) -> Result<()>;

    /// Disconnect from the bus; a no-op when not connected
    fn disconnect(&mut self);

    /// Announce a newly created node
    fn send_create(&mut self, record: &DeviceRecord);

    /// Announce a removed node
    fn send_remove(&mut self, record: &DeviceRecord);
}

/// Naming decision for a single device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    /// Node name relative to the device root
    pub name: String,
    /// Space separated symlink names relative to the device root
    pub symlink: String,
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// Policy engine mapping a sysfs device to its node name and permissions
pub trait NamingPolicy {
    /// Prepare the policy (load and check rules)
    fn init(&mut self) -> Result<()>;

    /// Decide name, symlinks and ownership for a device
    fn name_device(&self, devpath: &str, subsystem: &str) -> Result<Naming>;
}

/// Resources lent to a device operation for the duration of one event
pub struct DeviceContext<'a> {
    pub store: &'a mut dyn RecordStore,
    pub naming: &'a dyn NamingPolicy,
    pub bus: &'a mut dyn SystemBus,
}

/// Device node creation and removal
///
/// Status convention: `Ok(0)` means the node was handled, a positive
/// status means there was nothing to do, and an error is reported as
/// its negated errno.
pub trait DeviceOps {
    /// Create the node and record for a device that appeared
    fn add(&mut self, ctx: DeviceContext<'_>, devpath: &str, subsystem: &str) -> Result<i32>;

    /// Remove the node and record for a device that went away
    fn remove(&mut self, ctx: DeviceContext<'_>, devpath: &str, subsystem: &str)
    -> Result<i32>;
}
