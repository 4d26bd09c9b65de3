//! System bus notifier
//!
//! Announces created and removed nodes as a single datagram per event:
//!
//! ```text
//! add\0DEVPATH=/class/tty/ttyS0\0DEVNAME=ttyS0\0
//! ```
//!
//! Delivery is best effort. A missing listener never fails an event.

use common::{Error, Result, SystemBus};
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use tracing::{debug, warn};
use udevdb::DeviceRecord;

/// Bus notifier over a Unix datagram socket
#[derive(Debug, Default)]
pub struct DatagramBus {
    /// Listener address; `None` disables notifications
    target: Option<PathBuf>,
    socket: Option<UnixDatagram>,
}

impl DatagramBus {
    pub fn new(target: Option<PathBuf>) -> Self {
        Self {
            target,
            socket: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, action: &str, record: &DeviceRecord) {
        let (Some(socket), Some(target)) = (&self.socket, &self.target) else {
            return;
        };

        let message = format_message(action, record);
        match socket.send_to(message.as_bytes(), target) {
            Ok(_) => debug!("Sent {} notification for {}", action, record.path),
            Err(e) => warn!(
                "Failed to send {} notification to {}: {}",
                action,
                target.display(),
                e
            ),
        }
    }
}

/// Wire form of a notification
pub fn format_message(action: &str, record: &DeviceRecord) -> String {
    format!(
        "{}\0DEVPATH={}\0DEVNAME={}\0",
        action, record.path, record.name
    )
}

impl SystemBus for DatagramBus {
    fn connect(&mut self) -> Result<()> {
        let Some(target) = &self.target else {
            debug!("No system bus configured, notifications disabled");
            return Ok(());
        };

        let socket = UnixDatagram::unbound()
            .map_err(|e| Error::Bus(format!("Failed to create socket: {}", e)))?;
        debug!("Connected to system bus at {}", target.display());
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!("Disconnected from system bus");
        }
    }

    fn send_create(&mut self, record: &DeviceRecord) {
        self.send("add", record);
    }

    fn send_remove(&mut self, record: &DeviceRecord) {
        self.send("remove", record);
    }
}
