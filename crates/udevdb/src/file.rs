//! File-backed record store
//!
//! The whole store is read into memory when opened and written back on
//! `close` if anything changed. The write goes to a sibling temporary
//! file which is then renamed over the store, so readers never observe
//! a half-written image.
//!
//! Concurrent hotplug invocations are serialized with an advisory lock
//! on `<store>.lock`: read/write opens take it exclusively, read-only
//! opens take it shared. Blocking on the lock is the only wait in this
//! crate.

use crate::codec::{decode_store, encode_store};
use crate::error::{Result, StoreError};
use crate::{DeviceRecord, OpenMode, RecordStore};
use nix::fcntl::{Flock, FlockArg};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Record store persisted to a single file
pub struct FileStore {
    /// Store file
    path: PathBuf,
    /// Records keyed by device path
    records: BTreeMap<String, DeviceRecord>,
    /// Open mode, `None` when closed
    mode: Option<OpenMode>,
    /// Records changed since open
    dirty: bool,
    /// Held advisory lock, released on drop
    lock: Option<Flock<File>>,
}

impl FileStore {
    /// Create a closed store for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            mode: None,
            dirty: false,
            lock: None,
        }
    }

    /// Store file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn open(&mut self, mode: OpenMode) -> Result<()> {
        if self.mode.is_some() {
            self.close()?;
        }

        if mode == OpenMode::ReadWrite {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = self.sibling(".lock");
        let lock_file = match mode {
            OpenMode::ReadWrite => OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?,
            OpenMode::ReadOnly => match File::open(&lock_path) {
                Ok(file) => file,
                // Nothing has ever written the store; there is nobody to wait for.
                Err(e) if e.kind() == ErrorKind::NotFound => return self.load(mode, None),
                Err(e) => return Err(e.into()),
            },
        };

        let arg = match mode {
            OpenMode::ReadWrite => FlockArg::LockExclusive,
            OpenMode::ReadOnly => FlockArg::LockShared,
        };
        let lock = Flock::lock(lock_file, arg).map_err(|(_, errno)| StoreError::Io(errno.into()))?;

        self.load(mode, Some(lock))
    }

    fn load(&mut self, mode: OpenMode, lock: Option<Flock<File>>) -> Result<()> {
        let image = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        self.records = decode_store(&image)?
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();
        self.mode = Some(mode);
        self.dirty = false;
        self.lock = lock;

        debug!(
            "Opened record store {} ({:?}, {} records)",
            self.path.display(),
            mode,
            self.records.len()
        );
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let image = encode_store(self.records.values())?;
        let tmp = self.sibling(".tmp");
        fs::write(&tmp, image)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            "Wrote {} records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn writable(&mut self) -> Result<&mut BTreeMap<String, DeviceRecord>> {
        match self.mode {
            Some(OpenMode::ReadWrite) => {
                self.dirty = true;
                Ok(&mut self.records)
            }
            Some(OpenMode::ReadOnly) => Err(StoreError::ReadOnly),
            None => Err(StoreError::NotOpen),
        }
    }
}

impl RecordStore for FileStore {
    fn init(&mut self) -> Result<()> {
        self.open(OpenMode::ReadWrite)
    }

    fn open_read_only(&mut self) -> Result<()> {
        self.open(OpenMode::ReadOnly)
    }

    fn get(&self, path: &str) -> Result<DeviceRecord> {
        if self.mode.is_none() {
            return Err(StoreError::NotOpen);
        }
        self.records
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn add(&mut self, record: DeviceRecord) -> Result<()> {
        self.writable()?.insert(record.path.clone(), record);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        if self.mode == Some(OpenMode::ReadWrite) && !self.records.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.writable()?.remove(path);
        Ok(())
    }

    fn dump(&self, visit: &mut dyn FnMut(&DeviceRecord)) -> Result<usize> {
        if self.mode.is_none() {
            return Err(StoreError::NotOpen);
        }
        self.records.values().for_each(|r| visit(r));
        Ok(self.records.len())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mode) = self.mode.take() else {
            return Ok(());
        };

        let result = if mode == OpenMode::ReadWrite && self.dirty {
            self.persist()
        } else {
            Ok(())
        };

        self.records.clear();
        self.dirty = false;
        self.lock = None;
        debug!("Closed record store {}", self.path.display());
        result
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close record store {}: {}", self.path.display(), e);
        }
    }
}
