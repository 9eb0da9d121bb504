use hoard_memory::leak::{LeakLedger, LedgerConfig};
use hoard_memory::pool::TypedPool;
use hoard_memory::track_alloc;

#[derive(Debug)]
struct Texture {
    _id: u32,
}

#[test]
fn test_pool_objects_tracked_until_destroyed() {
    let ledger = LeakLedger::new();
    let pool = TypedPool::<Texture>::new(4).unwrap();

    let a = pool.create(Texture { _id: 1 }).unwrap();
    let b = pool.create(Texture { _id: 2 }).unwrap();
    track_alloc!(ledger, a, Texture);
    track_alloc!(ledger, b, Texture);
    assert_eq!(ledger.leak_count(), 2);

    unsafe { pool.destroy(a).unwrap() };
    assert!(ledger.track_deallocation(a.as_ptr() as usize));

    let leaks = ledger.leaks();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].address, b.as_ptr() as usize);
    assert_eq!(leaks[0].size, size_of::<Texture>());
    assert!(leaks[0].type_name.ends_with("Texture"));
    assert!(leaks[0].file.ends_with("leak_ledger.rs"));
    assert!(!ledger.check_for_leaks());

    unsafe { pool.destroy(b).unwrap() };
    ledger.track_deallocation(b.as_ptr() as usize);
    assert!(ledger.check_for_leaks());
}

#[test]
fn test_report_groups_by_type() {
    let ledger = LeakLedger::new();
    ledger.track_allocation(0x10, 128, "assets::Mesh");
    ledger.track_allocation(0x20, 128, "assets::Mesh");
    ledger.track_allocation(0x30, 1024, "assets::Sound");

    let mut out = Vec::new();
    assert!(!ledger.check_for_leaks_to(&mut out));
    let report = String::from_utf8(out).unwrap();

    assert!(report.starts_with("=== Memory Leak Report ===\n3 leak(s), 1.25 KB total\n"));
    assert!(report.contains("\nMesh: 2 leak(s), 256 B\n"));
    assert!(report.contains("\nSound: 1 leak(s), 1.00 KB\n"));
    assert!(report.contains("  0x30: 1024 bytes at "));
    assert!(report.find("Mesh").unwrap() < report.find("Sound").unwrap());
}

#[test]
fn test_clean_report_to_file() {
    let ledger = LeakLedger::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leaks.txt");

    assert!(ledger.check_for_leaks_to_file(&path));
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "No memory leaks detected\n");
}

#[test]
fn test_leak_report_to_file() {
    let ledger = LeakLedger::new();
    ledger.track_allocation(0xbeef, 8, "u64");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leaks.txt");

    assert!(!ledger.check_for_leaks_to_file(&path));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("0xbeef: 8 bytes"));
}

#[test]
fn test_runtime_toggle() {
    let ledger = LeakLedger::with_config(LedgerConfig::production());
    assert!(!ledger.is_enabled());
    ledger.track_allocation(0x1, 4, "u32");
    assert_eq!(ledger.leak_count(), 0);

    ledger.set_enabled(true);
    ledger.track_allocation(0x1, 4, "u32");
    ledger.set_enabled(false);

    // entries made while enabled still clear while disabled
    assert!(ledger.is_tracked(0x1));
    assert!(ledger.track_deallocation(0x1));
    assert_eq!(ledger.leak_count(), 0);
}

#[test]
fn test_untracked_release_is_ignored() {
    let ledger = LeakLedger::new();
    assert!(!ledger.track_deallocation(0x4000));
    assert_eq!(ledger.leaked_bytes(), 0);
}

#[test]
fn test_ledger_is_shared_across_threads() {
    let ledger = LeakLedger::new();
    std::thread::scope(|s| {
        for t in 0..4usize {
            let ledger = &ledger;
            s.spawn(move || {
                for i in 0..100usize {
                    ledger.track_allocation((t << 16) | (i << 4), 16, "Node");
                }
                for i in (0..100usize).step_by(2) {
                    ledger.track_deallocation((t << 16) | (i << 4));
                }
            });
        }
    });

    assert_eq!(ledger.leak_count(), 4 * 50);
    assert_eq!(ledger.leaked_bytes(), 4 * 50 * 16);
}

#[test]
fn test_development_preset() {
    let config = LedgerConfig::development();
    assert!(config.enabled);
    assert!(config.capture_stack_traces);
    assert!(config.check_on_drop);

    let ledger = LeakLedger::with_config(LedgerConfig {
        check_on_drop: false,
        ..config
    });
    ledger.track_allocation(0x99, 1, "u8");
    let leaks = ledger.leaks();
    let record = &leaks[0];
    if cfg!(feature = "stack-traces") {
        assert!(record.stack_trace.is_some());
    } else {
        assert!(record.stack_trace.is_none());
    }
}
