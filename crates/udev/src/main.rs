//! udev
//!
//! Invoked by the kernel hotplug helper as `udev <subsystem>` with the
//! event in `ACTION`, `DEVPATH` and `SEQNUM`, or interactively with
//! query options:
//!
//! ```text
//! udev -q name -p /class/tty/ttyS0     node name of a device
//! udev -q name -r -p /block/sda        node path including the device root
//! udev -d                              dump all records
//! udev -r                              print the device root
//! ```
//!
//! CONFIGURATION:
//!     1. File named by `UDEV_CONFIG_FILE`
//!     2. /etc/udev/udev.toml
//!     3. ~/.config/udev/udev.toml
//!     4. Built-in defaults
//!
//! `UDEV_ROOT`, `UDEV_DB` and `SYSFS_PATH` override the loaded values.

use anyhow::{Context, Result};
use common::setup_logging;
use nix::errno::Errno;
use std::env;
use std::io;
use std::process::ExitCode;
use tracing::debug;
use udev::bus::DatagramBus;
use udev::namedev::RuleNamer;
use udev::node::NodeOps;
use udev::signals::HookTrap;
use udev::sysfs::Sysfs;
use udev::{Collaborators, HotplugEnv, InvocationMode, UdevConfig, run_hotplug, run_interactive};
use udevdb::FileStore;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("udev: {:#}", e);
            Errno::EINVAL as i32
        }
    };

    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

fn run(args: &[String]) -> Result<i32> {
    let config = UdevConfig::load_for_invocation(|key| env::var(key).ok())
        .context("Failed to load configuration")?;

    setup_logging(&config.log_level).context("Failed to setup logging")?;

    debug!("udev v{}", udev::UDEV_VERSION);
    debug!(
        "udev_root={}, udev_db={}, sysfs={}",
        config.udev_root.display(),
        config.udev_db.display(),
        config.sysfs_root.display()
    );

    let mut store = FileStore::new(&config.udev_db);

    let code = match InvocationMode::select(args) {
        InvocationMode::Hotplug => {
            let subsystem = args.get(1).map(String::as_str).unwrap_or_default();
            let env = HotplugEnv::from_env();

            let mut bus = DatagramBus::new(config.bus.socket.clone());
            let mut naming = RuleNamer::from_config(&config);
            let mut devices = NodeOps::new(Sysfs::new(&config.sysfs_root), &config.udev_root);
            let mut signals = HookTrap::new();

            run_hotplug(
                subsystem,
                &env,
                Collaborators {
                    bus: &mut bus,
                    store: &mut store,
                    naming: &mut naming,
                    devices: &mut devices,
                    signals: &mut signals,
                },
            )
        }
        InvocationMode::Interactive => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            run_interactive(args, &mut store, &config.udev_root, &mut out)
        }
    };

    debug!("exiting with status {}", code);
    Ok(code)
}
