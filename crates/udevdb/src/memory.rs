//! In-memory record store

use crate::error::{Result, StoreError};
use crate::{DeviceRecord, OpenMode, RecordStore};
use std::collections::BTreeMap;

/// Record store that lives only as long as the value
///
/// Records survive `close` and re-open, so a test can seed the store,
/// close it and hand it to the code under test.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, DeviceRecord>,
    mode: Option<OpenMode>,
}

impl MemoryStore {
    /// Create an empty, closed store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a closed store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.path.clone(), r)).collect(),
            mode: None,
        }
    }

    /// Number of stored records, regardless of open state
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn writable(&mut self) -> Result<&mut BTreeMap<String, DeviceRecord>> {
        match self.mode {
            Some(OpenMode::ReadWrite) => Ok(&mut self.records),
            Some(OpenMode::ReadOnly) => Err(StoreError::ReadOnly),
            None => Err(StoreError::NotOpen),
        }
    }
}

impl RecordStore for MemoryStore {
    fn init(&mut self) -> Result<()> {
        self.mode = Some(OpenMode::ReadWrite);
        Ok(())
    }

    fn open_read_only(&mut self) -> Result<()> {
        self.mode = Some(OpenMode::ReadOnly);
        Ok(())
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
        self.writable()?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn dump(&self, visit: &mut dyn FnMut(&DeviceRecord)) -> Result<usize> {
        if self.mode.is_none() {
            return Err(StoreError::NotOpen);
        }
        self.records.values().for_each(|r| visit(r));
        Ok(self.records.len())
    }

    fn close(&mut self) -> Result<()> {
        self.mode = None;
        Ok(())
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_store_rejects_access() {
        let store = MemoryStore::with_records([DeviceRecord::new("/block/sda", "sda")]);
        assert!(matches!(store.get("/block/sda"), Err(StoreError::NotOpen)));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut store = MemoryStore::new();
        store.open_read_only().unwrap();
        let err = store.add(DeviceRecord::new("/block/sda", "sda")).unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
    }

    #[test]
    fn test_records_survive_reopen() {
        let mut store = MemoryStore::new();
        store.init().unwrap();
        store.add(DeviceRecord::new("/block/sda", "sda")).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        store.open_read_only().unwrap();
        assert_eq!(store.get("/block/sda").unwrap().name, "sda");
    }

    #[test]
    fn test_delete_missing() {
        let mut store = MemoryStore::new();
        store.init().unwrap();
        assert!(matches!(
            store.delete("/block/sdz"),
            Err(StoreError::NotFound(_))
        ));
    }
}
