//! Common error types

use nix::errno::Errno;
use thiserror::Error;
use udevdb::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("System bus error: {0}")]
    Bus(String),

    #[error("Sysfs error: {0}")]
    Sysfs(String),

    #[error("Naming error: {0}")]
    Naming(String),

    #[error("Device node error on {path}: {source}")]
    Node {
        path: String,
        #[source]
        source: Errno,
    },

    #[error("Signal handler error: {0}")]
    Signal(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Unknown query type '{0}'")]
    InvalidQueryType(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// errno-style magnitude reported as the process exit code
    pub fn errno(&self) -> i32 {
        let errno = match self {
            Error::Store(e) => return e.errno(),
            Error::Node { source, .. } => *source,
            Error::Io(e) => return e.raw_os_error().unwrap_or(Errno::EIO as i32),
            Error::Sysfs(_) => Errno::ENODEV,
            Error::Bus(_) | Error::Signal(_) => Errno::EIO,
            Error::Config(_)
            | Error::Naming(_)
            | Error::UnknownAction(_)
            | Error::InvalidQueryType(_)
            | Error::Usage(_) => Errno::EINVAL,
        };
        errno as i32
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_passthrough() {
        let err = Error::from(StoreError::NotFound("/block/sda".into()));
        assert_eq!(err.errno(), Errno::ENODEV as i32);

        let err = Error::Node {
            path: "/dev/sda".into(),
            source: Errno::EPERM,
        };
        assert_eq!(err.errno(), Errno::EPERM as i32);
        assert!(err.to_string().contains("/dev/sda"));
    }

    #[test]
    fn test_usage_errors_are_einval() {
        assert_eq!(Error::UnknownAction("change".into()).errno(), 22);
        assert_eq!(Error::InvalidQueryType("mode".into()).errno(), 22);
        assert_eq!(Error::Usage("no path".into()).errno(), 22);
    }
}
