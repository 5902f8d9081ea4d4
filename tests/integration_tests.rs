/*
 * Integration tests for Hotplugger
 *
 * These drive the arbiter the way drivers and operators do: through
 * registration, conflict resolution and the control surface together.
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use hp_core::{
    global, Attribute, ControlSurface, ControllerDescriptor, DescriptorRef, FlagController,
    HotplugError, Hotplugger, LockPolicy, SysfsController,
};
use serial_test::serial;
use tempfile::TempDir;

fn driver(hp: &Hotplugger, name: &str, whitelist: &[&str]) -> (DescriptorRef, FlagController) {
    let flag = FlagController::new(true);
    let d = ControllerDescriptor::new(name, flag.clone())
        .with_whitelist(whitelist.iter().copied())
        .into_ref();
    hp.register(&d).unwrap();
    (d, flag)
}

#[test]
fn test_exclusive_requester_disables_everyone() {
    let hp = Hotplugger::default();
    let (x, fx) = driver(&hp, "x", &[]);
    let (_, fy) = driver(&hp, "y", &["x"]);
    let (_, fz) = driver(&hp, "z", &[]);

    let report = hp.resolve_conflicts(&x).unwrap();

    assert!(fx.is_enabled());
    assert!(!fy.is_enabled());
    assert!(!fz.is_enabled());
    assert_eq!(report.disabled, vec!["y", "z"]);

    let surface = ControlSurface::new(&hp);
    assert_eq!(surface.show(Attribute::AvailableDrivers), "[x] y z \n");
    assert_eq!(surface.show(Attribute::DisableDriver), "y z \n");
}

#[test]
fn test_mutual_whitelist_keeps_peer_running() {
    let hp = Hotplugger::default();
    let (x, fx) = driver(&hp, "x", &["y"]);
    let (_, fy) = driver(&hp, "y", &["x"]);
    let (_, fz) = driver(&hp, "z", &[]);

    let report = hp.resolve_conflicts(&x).unwrap();

    assert!(fx.is_enabled());
    assert!(fy.is_enabled());
    assert!(!fz.is_enabled());
    assert_eq!(report.exempt, vec!["y"]);
    assert_eq!(report.disabled, vec!["z"]);
}

#[test]
fn test_one_sided_whitelist_is_not_enough() {
    let hp = Hotplugger::default();
    let (a, _) = driver(&hp, "a", &["b"]);
    let (_, fb) = driver(&hp, "b", &[]);

    hp.resolve_conflicts(&a).unwrap();
    assert!(!fb.is_enabled());
}

#[test]
fn test_registration_order_does_not_matter() {
    let hp = Hotplugger::default();
    let (_, fz) = driver(&hp, "z", &[]);
    let (_, fy) = driver(&hp, "y", &[]);
    let (x, _) = driver(&hp, "x", &[]);

    hp.resolve_conflicts(&x).unwrap();
    assert!(!fy.is_enabled());
    assert!(!fz.is_enabled());
}

#[test]
fn test_operator_workflow_through_surface() {
    let hp = Hotplugger::default();
    let (x, fx) = driver(&hp, "alucard", &[]);
    let (_, fy) = driver(&hp, "msm_hotplug", &[]);
    let surface = ControlSurface::new(&hp);

    // freeze, then confirm nothing moves
    surface.store(Attribute::Enabled, "0\n").unwrap();
    assert!(matches!(hp.resolve_conflicts(&x), Err(HotplugError::Disabled)));
    assert!(matches!(
        surface.store(Attribute::DisableDriver, "msm_hotplug"),
        Err(HotplugError::Disabled)
    ));
    assert!(fx.is_enabled() && fy.is_enabled());

    // thaw and switch one driver off by hand
    surface.store(Attribute::Enabled, "1\n").unwrap();
    surface.store(Attribute::DisableDriver, "MSM_HOTPLUG\n").unwrap();
    assert!(!fy.is_enabled());
    assert_eq!(surface.show(Attribute::EnableDriver), "alucard \n");

    // turning it back on does not touch alucard
    surface.store(Attribute::EnableDriver, "msm_hotplug").unwrap();
    assert!(fx.is_enabled() && fy.is_enabled());
}

#[test]
fn test_unregister_switches_off_and_counts_down() {
    let hp = Hotplugger::default();
    let (x, fx) = driver(&hp, "x", &[]);
    driver(&hp, "y", &[]);
    let before = hp.count_registered();

    hp.unregister(&x);

    assert!(!fx.is_enabled());
    assert_eq!(hp.count_registered(), before - 1);
    assert!(hp.find("x").is_none());
    assert!(matches!(
        hp.resolve_conflicts(&x),
        Err(HotplugError::InvalidArgument(_))
    ));
}

#[test]
fn test_duplicate_names_rejected() {
    let hp = Hotplugger::default();
    let (x, _) = driver(&hp, "x", &[]);

    // same descriptor again is a no-op
    hp.register(&x).unwrap();
    assert_eq!(hp.count_registered(), 1);

    let clash = ControllerDescriptor::new("X", FlagController::new(false)).into_ref();
    assert!(matches!(
        hp.register(&clash),
        Err(HotplugError::DuplicateName(_))
    ));
}

#[test]
fn test_sysfs_drivers_resolve() {
    let dir = TempDir::new().unwrap();
    let knob = |name: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, "1\n").unwrap();
        path
    };
    let a_path = knob("a_enabled");
    let b_path = knob("b_enabled");

    let hp = Hotplugger::default();
    let a = ControllerDescriptor::new("a", SysfsController::new(&a_path)).into_ref();
    let b = ControllerDescriptor::new("b", SysfsController::new(&b_path)).into_ref();
    hp.register(&a).unwrap();
    hp.register(&b).unwrap();

    hp.resolve_conflicts(&a).unwrap();

    assert_eq!(std::fs::read_to_string(&a_path).unwrap().trim(), "1");
    assert_eq!(std::fs::read_to_string(&b_path).unwrap().trim(), "0");
}

#[test]
fn test_contended_resolution_reports_busy() {
    let hp = Arc::new(Hotplugger::new(LockPolicy {
        retry_budget: 3,
        backoff: Duration::from_millis(1),
    }));
    let (x, _) = driver(&hp, "x", &[]);
    let (_, fy) = driver(&hp, "y", &[]);

    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = {
        let hp = Arc::clone(&hp);
        thread::spawn(move || {
            let _guard = hp.registry().lock();
            locked_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
    };

    locked_rx.recv().unwrap();
    match hp.resolve_conflicts(&x) {
        Err(e @ HotplugError::Busy { attempts: 3 }) => assert!(e.is_retryable()),
        other => panic!("expected Busy, got {:?}", other),
    }
    assert!(fy.is_enabled());

    release_tx.send(()).unwrap();
    holder.join().unwrap();

    // once the lock is free the retry succeeds
    hp.resolve_conflicts(&x).unwrap();
    assert!(!fy.is_enabled());
}

#[test]
fn test_concurrent_registration_keeps_names_unique() {
    let hp = Arc::new(Hotplugger::default());
    let barrier = Arc::new(Barrier::new(8));
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let hp = Arc::clone(&hp);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                let d = ControllerDescriptor::new("contested", FlagController::new(true)).into_ref();
                barrier.wait();
                if hp.register(&d).is_ok() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(hp.count_registered(), 1);
}

#[test]
#[serial]
fn test_process_wide_instance() {
    let hp = global();
    let d = ControllerDescriptor::new("integration_global", FlagController::new(true)).into_ref();
    hp.register(&d).unwrap();
    assert!(global().find("integration_global").is_some());

    hp.unregister(&d);
    assert!(global().find("integration_global").is_none());
    assert!(!d.is_enabled());
}
