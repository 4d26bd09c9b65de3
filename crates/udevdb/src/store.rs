//! Record store interface

use crate::DeviceRecord;
use crate::error::Result;

/// How a store was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Exclusive read/write access, used while handling a hotplug event
    ReadWrite,
    /// Shared read-only access, used by queries and dumps
    ReadOnly,
}

/// Durable mapping from sysfs device path to [`DeviceRecord`]
///
/// A store starts closed. `init` or `open_read_only` opens it; `close`
/// releases it and must be safe to call more than once.
pub trait RecordStore {
    /// Open for read/write, creating the backing store if needed
    fn init(&mut self) -> Result<()>;

    /// Open for reading only
    fn open_read_only(&mut self) -> Result<()>;

    /// Look up the record for a device path
    fn get(&self, path: &str) -> Result<DeviceRecord>;

    /// Insert or replace the record for `record.path`
    fn add(&mut self, record: DeviceRecord) -> Result<()>;

    /// Remove the record for a device path
    fn delete(&mut self, path: &str) -> Result<()>;

    /// Visit every record in store order, returning how many were visited
    fn dump(&self, visit: &mut dyn FnMut(&DeviceRecord)) -> Result<usize>;

    /// Flush and release the store; a no-op when already closed
    fn close(&mut self) -> Result<()>;

    /// Current open mode, `None` when closed
    fn mode(&self) -> Option<OpenMode>;

    /// Whether the store is currently open
    fn is_open(&self) -> bool {
        self.mode().is_some()
    }
}
