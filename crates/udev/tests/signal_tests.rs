//! Signal trap tests against real signal delivery
//!
//! Handlers are process wide, so everything runs inside a single test.
//!
//! Run with: `cargo test -p udev --test signal_tests`

use common::test_utils::{
    Call, CallLog, RecordingBus, RecordingDeviceOps, RecordingNamer, RecordingStore,
};
use common::{ShutdownSignal, SignalTrap};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::low_level::raise;
use std::sync::Arc;
use udev::signals::{HookTrap, TRAPPED_SIGNALS};
use udev::{Collaborators, HotplugEnv, run_hotplug};
use udevdb::RecordStore;

#[test]
fn test_trapped_signals_raise_shutdown() {
    // direct installation
    {
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut trap = HookTrap::new();
        trap.install(shutdown.clone()).unwrap();
        assert_eq!(trap.registered(), TRAPPED_SIGNALS.len());
        assert!(!shutdown.is_signaled());

        raise(SIGTERM).unwrap();
        assert!(shutdown.is_signaled());
        assert_eq!(shutdown.signal_number(), SIGTERM);
    }

    // delivery in the middle of a hotplug event
    let log = CallLog::new();
    let mut bus = RecordingBus::new(&log);
    let mut store = RecordingStore::new(&log);
    let mut naming = RecordingNamer::new(&log);
    let mut devices = RecordingDeviceOps::returning(&log, 0).with_hook(|| {
        let _ = raise(SIGINT);
    });
    let mut trap = HookTrap::new();

    let env = HotplugEnv {
        action: Some("add".to_string()),
        devpath: Some("/class/tty/ttyS0".to_string()),
        seqnum: None,
    };
    let code = run_hotplug(
        "tty",
        &env,
        Collaborators {
            bus: &mut bus,
            store: &mut store,
            naming: &mut naming,
            devices: &mut devices,
            signals: &mut trap,
        },
    );

    assert_eq!(code, 20 + SIGINT);
    assert_eq!(log.count(&Call::StoreClose), 1);
    assert_eq!(log.count(&Call::BusDisconnect), 1);
    assert!(!store.is_open());
}
