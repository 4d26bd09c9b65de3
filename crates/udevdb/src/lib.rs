//! Device record store for udev
//!
//! This crate persists the mapping from a sysfs device path to the node
//! that was created for it (name, symlinks, owner, group). Records are
//! serialized with postcard and framed with a length prefix and CRC32
//! so that a torn write is detected on the next open.
//!
//! # Example
//!
//! ```
//! use udevdb::{DeviceRecord, MemoryStore, RecordStore};
//!
//! let mut store = MemoryStore::new();
//! store.init().unwrap();
//! store.add(DeviceRecord::new("/class/tty/ttyS0", "ttyS0")).unwrap();
//!
//! let record = store.get("/class/tty/ttyS0").unwrap();
//! assert_eq!(record.name, "ttyS0");
//! store.close().unwrap();
//! ```

pub mod codec;
pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod store;

pub use codec::{FORMAT_VERSION, MAGIC, MAX_FRAME_SIZE, decode_store, encode_store};
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::DeviceRecord;
pub use store::{OpenMode, RecordStore};
