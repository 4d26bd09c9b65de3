//! Record store error types

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record is stored for the device path
    #[error("No record for device path: {0}")]
    NotFound(String),

    /// Operation attempted before `init`/`open_read_only` or after `close`
    #[error("Record store is not open")]
    NotOpen,

    /// Mutation attempted on a store opened read-only
    #[error("Record store is opened read-only")]
    ReadOnly,

    /// The store file failed an integrity check
    #[error("Corrupt record store: {0}")]
    Corrupt(String),

    /// The store file was written by an incompatible format version
    #[error("Unsupported store format version: {found} (expected {expected})")]
    IncompatibleVersion { found: u16, expected: u16 },

    /// Frame length exceeds maximum allowed size
    #[error("Record frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Serialization error from postcard
    #[error("Record encoding error: {0}")]
    Codec(#[from] postcard::Error),

    /// I/O error on the store or lock file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// errno-style magnitude used when this error becomes a process exit code
    pub fn errno(&self) -> i32 {
        let errno = match self {
            StoreError::NotFound(_) => Errno::ENODEV,
            StoreError::NotOpen => Errno::EBADF,
            StoreError::ReadOnly => Errno::EROFS,
            StoreError::Corrupt(_)
            | StoreError::IncompatibleVersion { .. }
            | StoreError::FrameTooLarge { .. }
            | StoreError::Codec(_) => Errno::EIO,
            StoreError::Io(e) => return e.raw_os_error().unwrap_or(Errno::EIO as i32),
        };
        errno as i32
    }
}

/// Type alias for store results
pub type Result<T> = std::result::Result<T, StoreError>;
