//! Persisted device record

use serde::{Deserialize, Serialize};

/// Everything udev remembers about a node it created
///
/// The record is keyed by `path`, the sysfs device path of the kernel
/// device. `symlink` keeps the space-joined list exactly as it is
/// printed by the query interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// sysfs device path (e.g. `/class/tty/ttyS0`)
    pub path: String,
    /// Node name relative to the device root
    pub name: String,
    /// Space separated symlink names relative to the device root
    pub symlink: String,
    /// Node owner
    pub owner: String,
    /// Node group
    pub group: String,
    /// Permission bits of the node
    pub mode: u32,
    /// Device major number
    pub major: u32,
    /// Device minor number
    pub minor: u32,
}

impl DeviceRecord {
    /// Create a record with only path and name set
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Iterate over the individual symlink names
    pub fn symlinks(&self) -> impl Iterator<Item = &str> {
        self.symlink.split_whitespace()
    }
}
