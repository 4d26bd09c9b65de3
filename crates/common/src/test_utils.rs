//! Test utilities for udev
//!
//! Recording doubles for every collaborator of the event coordinator.
//! All doubles created from the same [`CallLog`] append to one shared,
//! ordered list so tests can assert on acquisition and release order.
//!
//! # Example
//!
//! ```
//! use common::SystemBus;
//! use common::test_utils::{Call, CallLog, RecordingBus};
//!
//! let log = CallLog::new();
//! let mut bus = RecordingBus::new(&log);
//! bus.connect().unwrap();
//! bus.disconnect();
//! assert_eq!(log.calls(), vec![Call::BusConnect, Call::BusDisconnect]);
//! ```

use crate::{DeviceContext, DeviceOps, Error, Naming, NamingPolicy, Result, ShutdownSignal};
use crate::{SignalTrap, SystemBus};
use nix::errno::Errno;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use udevdb::{DeviceRecord, MemoryStore, OpenMode, RecordStore};

/// A single observed collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    BusConnect,
    BusDisconnect,
    BusSendCreate(String),
    BusSendRemove(String),
    StoreInit,
    StoreOpenReadOnly,
    StoreClose,
    NamingInit,
    SignalInstall,
    DeviceAdd(String, String),
    DeviceRemove(String, String),
}

/// Shared, ordered log of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    /// Snapshot of all calls so far
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    /// How many times `call` was observed
    pub fn count(&self, call: &Call) -> usize {
        self.0.borrow().iter().filter(|c| *c == call).count()
    }

    /// Index of the first occurrence of `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.0.borrow().iter().position(|c| c == call)
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Create a fully populated record for testing
pub fn create_mock_record(path: &str, name: &str) -> DeviceRecord {
    DeviceRecord {
        path: path.to_string(),
        name: name.to_string(),
        symlink: format!("link/{}", name),
        owner: "root".to_string(),
        group: "root".to_string(),
        mode: 0o600,
        major: 4,
        minor: 64,
    }
}

/// System bus that only records calls
pub struct RecordingBus {
    log: CallLog,
    fail_connect: bool,
}

impl RecordingBus {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_connect: false,
        }
    }

    /// Make `connect` fail
    pub fn failing(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_connect: true,
        }
    }
}

impl SystemBus for RecordingBus {
    fn connect(&mut self) -> Result<()> {
        self.log.record(Call::BusConnect);
        if self.fail_connect {
            return Err(Error::Bus("connection refused".to_string()));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.log.record(Call::BusDisconnect);
    }

    fn send_create(&mut self, record: &DeviceRecord) {
        self.log.record(Call::BusSendCreate(record.path.clone()));
    }

    fn send_remove(&mut self, record: &DeviceRecord) {
        self.log.record(Call::BusSendRemove(record.path.clone()));
    }
}

/// Memory store that records open/close calls
pub struct RecordingStore {
    inner: MemoryStore,
    log: CallLog,
    fail_open: bool,
}

impl RecordingStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            inner: MemoryStore::new(),
            log: log.clone(),
            fail_open: false,
        }
    }

    pub fn with_records(log: &CallLog, records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        Self {
            inner: MemoryStore::with_records(records),
            log: log.clone(),
            fail_open: false,
        }
    }

    /// Make `init` and `open_read_only` fail with a permission error
    pub fn failing(log: &CallLog) -> Self {
        Self {
            fail_open: true,
            ..Self::new(log)
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl RecordStore for RecordingStore {
    fn init(&mut self) -> udevdb::Result<()> {
        self.log.record(Call::StoreInit);
        if self.fail_open {
            return Err(std::io::Error::from_raw_os_error(Errno::EACCES as i32).into());
        }
        self.inner.init()
    }

    fn open_read_only(&mut self) -> udevdb::Result<()> {
        self.log.record(Call::StoreOpenReadOnly);
        if self.fail_open {
            return Err(std::io::Error::from_raw_os_error(Errno::EACCES as i32).into());
        }
        self.inner.open_read_only()
    }

    fn get(&self, path: &str) -> udevdb::Result<DeviceRecord> {
        self.inner.get(path)
    }

    fn add(&mut self, record: DeviceRecord) -> udevdb::Result<()> {
        self.inner.add(record)
    }

    fn delete(&mut self, path: &str) -> udevdb::Result<()> {
        self.inner.delete(path)
    }

    fn dump(&self, visit: &mut dyn FnMut(&DeviceRecord)) -> udevdb::Result<usize> {
        self.inner.dump(visit)
    }

    fn close(&mut self) -> udevdb::Result<()> {
        self.log.record(Call::StoreClose);
        self.inner.close()
    }

    fn mode(&self) -> Option<OpenMode> {
        self.inner.mode()
    }
}

/// Naming policy that names every device after its last path component
pub struct RecordingNamer {
    log: CallLog,
    fail_init: bool,
}

impl RecordingNamer {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_init: false,
        }
    }

    pub fn failing(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            fail_init: true,
        }
    }
}

impl NamingPolicy for RecordingNamer {
    fn init(&mut self) -> Result<()> {
        self.log.record(Call::NamingInit);
        if self.fail_init {
            return Err(Error::Naming("bad rule".to_string()));
        }
        Ok(())
    }

    fn name_device(&self, devpath: &str, _subsystem: &str) -> Result<Naming> {
        let name = devpath.rsplit('/').next().unwrap_or(devpath).to_string();
        Ok(Naming {
            name,
            symlink: String::new(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o600,
        })
    }
}

/// Device operations that record dispatch and return a canned outcome
pub struct RecordingDeviceOps {
    log: CallLog,
    outcome: std::result::Result<i32, Errno>,
    hook: Option<Box<dyn FnMut()>>,
}

impl RecordingDeviceOps {
    /// Succeed with the given status
    pub fn returning(log: &CallLog, status: i32) -> Self {
        Self {
            log: log.clone(),
            outcome: Ok(status),
            hook: None,
        }
    }

    /// Fail with the given errno
    pub fn failing(log: &CallLog, errno: Errno) -> Self {
        Self {
            log: log.clone(),
            outcome: Err(errno),
            hook: None,
        }
    }

    /// Run `hook` in the middle of every dispatched operation
    pub fn with_hook(mut self, hook: impl FnMut() + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    fn finish(&mut self, devpath: &str) -> Result<i32> {
        if let Some(hook) = self.hook.as_mut() {
            hook();
        }
        self.outcome.map_err(|source| Error::Node {
            path: devpath.to_string(),
            source,
        })
    }
}

impl DeviceOps for RecordingDeviceOps {
    fn add(&mut self, _ctx: DeviceContext<'_>, devpath: &str, subsystem: &str) -> Result<i32> {
        self.log
            .record(Call::DeviceAdd(devpath.to_string(), subsystem.to_string()));
        self.finish(devpath)
    }

    fn remove(&mut self, _ctx: DeviceContext<'_>, devpath: &str, subsystem: &str) -> Result<i32> {
        self.log
            .record(Call::DeviceRemove(devpath.to_string(), subsystem.to_string()));
        self.finish(devpath)
    }
}

/// Signal trap that records installation without touching process state
pub struct RecordingTrap {
    log: CallLog,
    installed: Option<Arc<ShutdownSignal>>,
}

impl RecordingTrap {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            installed: None,
        }
    }

    /// Shutdown flag handed over by the coordinator, once installed
    pub fn shutdown(&self) -> Option<Arc<ShutdownSignal>> {
        self.installed.clone()
    }
}

impl SignalTrap for RecordingTrap {
    fn install(&mut self, shutdown: Arc<ShutdownSignal>) -> Result<()> {
        self.log.record(Call::SignalInstall);
        self.installed = Some(shutdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_log_is_shared() {
        let log = CallLog::new();
        let mut bus = RecordingBus::new(&log);
        let mut store = RecordingStore::new(&log);

        bus.connect().unwrap();
        store.init().unwrap();
        store.close().unwrap();
        bus.disconnect();

        assert_eq!(
            log.calls(),
            vec![
                Call::BusConnect,
                Call::StoreInit,
                Call::StoreClose,
                Call::BusDisconnect
            ]
        );
        assert_eq!(log.position(&Call::StoreClose), Some(2));
    }

    #[test]
    fn test_failing_store() {
        let log = CallLog::new();
        let mut store = RecordingStore::failing(&log);
        let err = store.init().unwrap_err();
        assert_eq!(err.errno(), Errno::EACCES as i32);
        assert!(!store.is_open());
    }

    #[test]
    fn test_device_ops_outcome() {
        let log = CallLog::new();
        let mut store = RecordingStore::new(&log);
        let namer = RecordingNamer::new(&log);
        let mut bus = RecordingBus::new(&log);
        let mut ops = RecordingDeviceOps::failing(&log, Errno::EPERM);

        let ctx = DeviceContext {
            store: &mut store,
            naming: &namer,
            bus: &mut bus,
        };
        let err = ops.add(ctx, "/class/tty/ttyS0", "tty").unwrap_err();
        assert_eq!(err.errno(), Errno::EPERM as i32);
        assert_eq!(
            log.count(&Call::DeviceAdd("/class/tty/ttyS0".into(), "tty".into())),
            1
        );
    }
}
