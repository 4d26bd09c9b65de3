//! sysfs attribute access
//!
//! Device paths handed over by the kernel (`DEVPATH`) are relative to
//! the sysfs mount point, e.g. `/class/tty/ttyS0` lives at
//! `/sys/class/tty/ttyS0`.

use common::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Read-only view of a sysfs tree
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a device
    pub fn device_dir(&self, devpath: &str) -> PathBuf {
        self.root.join(devpath.trim_start_matches('/'))
    }

    /// Read an attribute with surrounding whitespace removed
    ///
    /// A missing attribute is `None`.
    pub fn read_attribute(&self, devpath: &str, attribute: &str) -> Result<Option<String>> {
        let path = self.device_dir(devpath).join(attribute);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Sysfs(format!("{}: {}", path.display(), e))),
        }
    }

    /// Major and minor number from the `dev` attribute
    ///
    /// Devices without a `dev` attribute have no node and yield `None`.
    pub fn dev_numbers(&self, devpath: &str) -> Result<Option<(u32, u32)>> {
        let Some(dev) = self.read_attribute(devpath, "dev")? else {
            return Ok(None);
        };

        parse_dev(&dev)
            .map(Some)
            .ok_or_else(|| Error::Sysfs(format!("malformed dev attribute '{}' for {}", dev, devpath)))
    }
}

/// Parse `MAJOR:MINOR`
fn parse_dev(dev: &str) -> Option<(u32, u32)> {
    let (major, minor) = dev.split_once(':')?;
    Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
}
