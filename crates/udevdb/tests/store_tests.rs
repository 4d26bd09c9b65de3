//! File store integration tests
//!
//! Run with: `cargo test -p udevdb --test store_tests`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;
use udevdb::{DeviceRecord, FileStore, OpenMode, RecordStore, StoreError};

fn record(path: &str, name: &str, owner: &str) -> DeviceRecord {
    DeviceRecord {
        path: path.to_string(),
        name: name.to_string(),
        symlink: String::new(),
        owner: owner.to_string(),
        group: "root".to_string(),
        mode: 0o600,
        major: 4,
        minor: 64,
    }
}

#[test]
fn test_records_persist_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("udevdb");

    let mut writer = FileStore::new(&path);
    writer.init().unwrap();
    writer
        .add(record("/class/tty/ttyS0", "ttyS0", "root"))
        .unwrap();
    writer.add(record("/block/sda", "sda", "disk")).unwrap();
    writer.close().unwrap();

    let mut reader = FileStore::new(&path);
    reader.open_read_only().unwrap();
    assert_eq!(reader.mode(), Some(OpenMode::ReadOnly));
    assert_eq!(reader.get("/block/sda").unwrap().owner, "disk");
    assert!(matches!(
        reader.get("/class/tty/ttyS9"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_dump_visits_in_path_order() {
    let dir = tempdir().unwrap();
    let mut store = FileStore::new(dir.path().join("udevdb"));
    store.init().unwrap();
    store.add(record("/class/tty/ttyS1", "ttyS1", "root")).unwrap();
    store.add(record("/block/sdb", "sdb", "root")).unwrap();
    store.add(record("/class/input/mouse0", "mouse0", "root")).unwrap();

    let mut seen = Vec::new();
    let count = store.dump(&mut |r| seen.push(r.path.clone())).unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        seen,
        vec!["/block/sdb", "/class/input/mouse0", "/class/tty/ttyS1"]
    );
}

#[test]
fn test_delete_is_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("udevdb");

    let mut store = FileStore::new(&path);
    store.init().unwrap();
    store.add(record("/block/sda", "sda", "root")).unwrap();
    store.close().unwrap();

    store.init().unwrap();
    store.delete("/block/sda").unwrap();
    store.close().unwrap();

    store.open_read_only().unwrap();
    assert_eq!(store.dump(&mut |_| {}).unwrap(), 0);
}

#[test]
fn test_corrupt_file_fails_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("udevdb");
    std::fs::write(&path, b"garbage that is not a store").unwrap();

    let mut store = FileStore::new(&path);
    let err = store.open_read_only().unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(!store.is_open());
}

#[test]
fn test_operations_after_close_fail() {
    let dir = tempdir().unwrap();
    let mut store = FileStore::new(dir.path().join("udevdb"));
    store.init().unwrap();
    store.close().unwrap();

    assert!(matches!(store.get("/block/sda"), Err(StoreError::NotOpen)));
    assert!(matches!(
        store.add(record("/block/sda", "sda", "root")),
        Err(StoreError::NotOpen)
    ));
    // close stays a no-op
    store.close().unwrap();
}

#[test]
fn test_writers_are_serialized() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("udevdb");

    let mut first = FileStore::new(&path);
    first.init().unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let acquired_clone = acquired.clone();
    let second_path = path.clone();
    let handle = thread::spawn(move || {
        let mut second = FileStore::new(second_path);
        second.init().unwrap();
        acquired_clone.store(true, Ordering::SeqCst);
        second.get("/block/sda").unwrap()
    });

    thread::sleep(Duration::from_millis(200));
    assert!(
        !acquired.load(Ordering::SeqCst),
        "second writer must wait for the first to close"
    );

    first.add(record("/block/sda", "sda", "root")).unwrap();
    first.close().unwrap();

    let seen = handle.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert_eq!(seen.name, "sda");
}
