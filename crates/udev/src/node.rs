//! Device node creation and removal
//!
//! On `add` the node is created under the device root with the major
//! and minor numbers read from sysfs, owned and permissioned as the
//! naming policy decided, and every symlink is pointed at it with a
//! relative target. The record is stored and the bus notified last, so
//! a record always describes a node that was actually made.
//!
//! On `remove` the stored record tells which node and symlinks to
//! unlink; files that are already gone are not an error.

use crate::sysfs::Sysfs;
use common::{DeviceContext, DeviceOps, Error, Result};
use nix::sys::stat::{Mode, SFlag, makedev, mknod};
use nix::unistd::{Gid, Group, Uid, User, chown};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use udevdb::DeviceRecord;

/// Status for a device that has no node to create
pub const STATUS_NO_NODE: i32 = 1;

/// Node operations on a real device root
#[derive(Debug, Clone)]
pub struct NodeOps {
    sysfs: Sysfs,
    udev_root: PathBuf,
}

impl NodeOps {
    pub fn new(sysfs: Sysfs, udev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs,
            udev_root: udev_root.into(),
        }
    }

    /// Absolute path of a name relative to the device root
    pub fn node_path(&self, name: &str) -> PathBuf {
        self.udev_root.join(name)
    }

    fn create_node(&self, record: &DeviceRecord, block: bool) -> Result<()> {
        let path = self.node_path(&record.name);
        create_parent(&path)?;
        remove_if_exists(&path)?;

        let kind = if block { SFlag::S_IFBLK } else { SFlag::S_IFCHR };
        let dev = makedev(u64::from(record.major), u64::from(record.minor));
        mknod(&path, kind, Mode::from_bits_truncate(record.mode), dev).map_err(|source| {
            Error::Node {
                path: path.display().to_string(),
                source,
            }
        })?;

        // mknod is subject to the umask
        fs::set_permissions(&path, fs::Permissions::from_mode(record.mode))?;

        let uid = resolve_user(&record.owner);
        let gid = resolve_group(&record.group);
        chown(&path, Some(uid), Some(gid)).map_err(|source| Error::Node {
            path: path.display().to_string(),
            source,
        })?;

        debug!(
            "Created {} node {} ({}:{}, mode {:#o})",
            if block { "block" } else { "char" },
            path.display(),
            record.major,
            record.minor,
            record.mode
        );
        Ok(())
    }

    fn create_symlinks(&self, record: &DeviceRecord) -> Result<()> {
        for link in record.symlinks() {
            let path = self.node_path(link);
            create_parent(&path)?;
            remove_if_exists(&path)?;
            let target = relative_target(link, &record.name);
            symlink(&target, &path)?;
            debug!("Linked {} -> {}", path.display(), target.display());
        }
        Ok(())
    }

    fn remove_node(&self, record: &DeviceRecord) -> Result<()> {
        for link in record.symlinks() {
            remove_if_exists(&self.node_path(link))?;
        }
        remove_if_exists(&self.node_path(&record.name))?;
        Ok(())
    }
}

impl DeviceOps for NodeOps {
    fn add(&mut self, ctx: DeviceContext<'_>, devpath: &str, subsystem: &str) -> Result<i32> {
        let Some((major, minor)) = self.sysfs.dev_numbers(devpath)? else {
            debug!("'{}' has no dev attribute, nothing to create", devpath);
            return Ok(STATUS_NO_NODE);
        };

        let naming = ctx.naming.name_device(devpath, subsystem)?;
        let record = DeviceRecord {
            path: devpath.to_string(),
            name: naming.name,
            symlink: naming.symlink,
            owner: naming.owner,
            group: naming.group,
            mode: naming.mode,
            major,
            minor,
        };

        self.create_node(&record, devpath.starts_with("/block"))?;
        self.create_symlinks(&record)?;
        ctx.store.add(record.clone())?;
        ctx.bus.send_create(&record);

        info!("Created node {} for {}", record.name, devpath);
        Ok(0)
    }

    fn remove(&mut self, ctx: DeviceContext<'_>, devpath: &str, _subsystem: &str) -> Result<i32> {
        let record = ctx.store.get(devpath)?;

        self.remove_node(&record)?;
        ctx.store.delete(devpath)?;
        ctx.bus.send_remove(&record);

        info!("Removed node {} for {}", record.name, devpath);
        Ok(0)
    }
}

/// Symlink target for `link` pointing at `name`, both relative to the device root
pub fn relative_target(link: &str, name: &str) -> PathBuf {
    let depth = Path::new(link)
        .parent()
        .map(|p| p.components().count())
        .unwrap_or(0);

    let mut target = PathBuf::new();
    for _ in 0..depth {
        target.push("..");
    }
    target.push(name);
    target
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn resolve_user(owner: &str) -> Uid {
    if let Ok(uid) = owner.parse() {
        return Uid::from_raw(uid);
    }
    match User::from_name(owner) {
        Ok(Some(user)) => user.uid,
        Ok(None) => {
            warn!("Unknown user '{}', using root", owner);
            Uid::from_raw(0)
        }
        Err(e) => {
            warn!("Failed to look up user '{}': {}, using root", owner, e);
            Uid::from_raw(0)
        }
    }
}

fn resolve_group(group: &str) -> Gid {
    if let Ok(gid) = group.parse() {
        return Gid::from_raw(gid);
    }
    match Group::from_name(group) {
        Ok(Some(group)) => group.gid,
        Ok(None) => {
            warn!("Unknown group '{}', using root", group);
            Gid::from_raw(0)
        }
        Err(e) => {
            warn!("Failed to look up group '{}': {}, using root", group, e);
            Gid::from_raw(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{Call, CallLog, RecordingBus, RecordingNamer, RecordingStore};
    use nix::errno::Errno;
    use udevdb::RecordStore;
    use tempfile::tempdir;

    #[test]
    fn test_relative_target() {
        assert_eq!(relative_target("modem", "ttyUSB0"), PathBuf::from("ttyUSB0"));
        assert_eq!(
            relative_target("serial/by-id/usb-0", "ttyUSB0"),
            PathBuf::from("../../ttyUSB0")
        );
        assert_eq!(
            relative_target("cdrom", "scsi/cd0"),
            PathBuf::from("scsi/cd0")
        );
    }

    #[test]
    fn test_resolve_numeric_ids() {
        assert_eq!(resolve_user("0"), Uid::from_raw(0));
        assert_eq!(resolve_group("5"), Gid::from_raw(5));
        assert_eq!(resolve_user("no-such-user-here"), Uid::from_raw(0));
    }

    #[test]
    fn test_add_without_dev_attribute_is_noop() {
        let sysfs = tempdir().unwrap();
        let root = tempdir().unwrap();
        fs::create_dir_all(sysfs.path().join("class/net/eth0")).unwrap();

        let log = CallLog::new();
        let mut store = RecordingStore::new(&log);
        store.init().unwrap();
        let namer = RecordingNamer::new(&log);
        let mut bus = RecordingBus::new(&log);
        let mut ops = NodeOps::new(Sysfs::new(sysfs.path()), root.path());

        let ctx = DeviceContext {
            store: &mut store,
            naming: &namer,
            bus: &mut bus,
        };
        assert_eq!(ops.add(ctx, "/class/net/eth0", "net").unwrap(), STATUS_NO_NODE);
        assert!(store.inner().is_empty());
        assert_eq!(log.count(&Call::BusSendCreate("/class/net/eth0".into())), 0);
    }

    #[test]
    fn test_remove_unlinks_node_and_symlinks() {
        let sysfs = tempdir().unwrap();
        let root = tempdir().unwrap();
        fs::write(root.path().join("ttyUSB0"), b"").unwrap();
        symlink("ttyUSB0", root.path().join("modem")).unwrap();

        let mut record = DeviceRecord::new("/class/tty/ttyUSB0", "ttyUSB0");
        record.symlink = "modem serial/0".to_string();

        let log = CallLog::new();
        let mut store = RecordingStore::with_records(&log, [record]);
        store.init().unwrap();
        let namer = RecordingNamer::new(&log);
        let mut bus = RecordingBus::new(&log);
        let mut ops = NodeOps::new(Sysfs::new(sysfs.path()), root.path());

        let ctx = DeviceContext {
            store: &mut store,
            naming: &namer,
            bus: &mut bus,
        };
        assert_eq!(ops.remove(ctx, "/class/tty/ttyUSB0", "tty").unwrap(), 0);

        assert!(!root.path().join("ttyUSB0").exists());
        assert!(fs::symlink_metadata(root.path().join("modem")).is_err());
        assert!(store.inner().is_empty());
        assert_eq!(
            log.count(&Call::BusSendRemove("/class/tty/ttyUSB0".into())),
            1
        );
    }

    #[test]
    fn test_remove_unknown_device() {
        let sysfs = tempdir().unwrap();
        let root = tempdir().unwrap();

        let log = CallLog::new();
        let mut store = RecordingStore::new(&log);
        store.init().unwrap();
        let namer = RecordingNamer::new(&log);
        let mut bus = RecordingBus::new(&log);
        let mut ops = NodeOps::new(Sysfs::new(sysfs.path()), root.path());

        let ctx = DeviceContext {
            store: &mut store,
            naming: &namer,
            bus: &mut bus,
        };
        let err = ops.remove(ctx, "/block/sdz", "block").unwrap_err();
        assert_eq!(err.errno(), Errno::ENODEV as i32);
    }

    #[test]
    fn test_add_creates_node_when_privileged() {
        if !Uid::effective().is_root() {
            return;
        }

        let sysfs = tempdir().unwrap();
        let root = tempdir().unwrap();
        let dir = sysfs.path().join("class/mem/null2");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("dev"), "1:3\n").unwrap();

        let log = CallLog::new();
        let mut store = RecordingStore::new(&log);
        store.init().unwrap();
        let namer = RecordingNamer::new(&log);
        let mut bus = RecordingBus::new(&log);
        let mut ops = NodeOps::new(Sysfs::new(sysfs.path()), root.path());

        let ctx = DeviceContext {
            store: &mut store,
            naming: &namer,
            bus: &mut bus,
        };
        match ops.add(ctx, "/class/mem/null2", "mem") {
            Ok(status) => assert_eq!(status, 0),
            // containers may withhold CAP_MKNOD even from root
            Err(Error::Node { source: Errno::EPERM, .. }) => return,
            Err(e) => panic!("unexpected error: {}", e),
        }

        let meta = fs::symlink_metadata(root.path().join("null2")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o600);
        assert_eq!(store.get("/class/mem/null2").unwrap().major, 1);
        assert_eq!(log.count(&Call::BusSendCreate("/class/mem/null2".into())), 1);
    }
}
