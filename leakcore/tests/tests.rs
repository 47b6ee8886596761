mod support;

use std::collections::HashSet;
use leakcore::*;
use rand::seq::SliceRandom;
use rand::Rng;
use support::*;

fn stack(ips: &[usize]) -> CapturedStack {
    CapturedStack::from_frames(ips)
}

#[test]
fn free_twice_removes_once() {
    let mut t = Tracker::new();
    t.insert(0x10, 32, stack(&[0x1001])).unwrap();
    t.insert(0x20, 8, stack(&[0x1002])).unwrap();

    let first = t.remove(0x10).expect("tracked");
    assert_eq!(first.size, 32);
    assert!(t.remove(0x10).is_none());
    assert!(t.remove(0xdead).is_none());

    assert_eq!(t.live().len(), 1);
    assert!(t.live().contains(0x20));
    let stats = t.stats();
    assert_eq!(stats.frees, 1);
    assert_eq!(stats.freed_bytes, 32);
    assert_eq!(stats.allocations, 2);
}

#[test]
fn duplicate_registration_is_tolerated() {
    let mut t = Tracker::new();
    assert!(t.insert(0x40, 16, stack(&[0x1001])).unwrap());
    assert!(!t.insert(0x40, 99, stack(&[0x2001])).unwrap());
    assert_eq!(t.live().get(0x40).unwrap().size, 16);
    assert_eq!(t.stats().allocations, 1);
}

#[test]
fn only_allow_listed_stacks_are_reported() {
    let mut t = Tracker::new();
    // Innermost frame in libother, caller in libtest: matches.
    t.insert(0x100, 10, stack(&[0x2010, 0x1010])).unwrap();
    // Entirely libother: live, but filtered out.
    t.insert(0x200, 20, stack(&[0x2020, 0x2021])).unwrap();
    // Unresolvable frames never match.
    t.insert(0x300, 30, stack(&[0x7777])).unwrap();

    let (text, summary) = report(&mut t, "libtest.so\n", &two_libs());
    assert_eq!(summary.leaks, 1);
    assert_eq!(summary.bytes, 10);
    assert_eq!(summary.live, 3);
    assert!(text.contains("Leak 1, size 10"));
    assert!(!text.contains("size 20"));
    assert!(!text.contains("size 30"));
    assert_eq!(t.filter().entries().collect::<Vec<_>>(), vec!["libtest.so"]);
}

#[test]
fn totals_add_up() {
    let mut t = Tracker::new();
    let sizes = [1usize, 7, 4096, 33, 250];
    for (i, size) in sizes.iter().enumerate() {
        t.insert(0x1_0000 + i * 0x100, *size, stack(&[0x1000 + i])).unwrap();
    }
    // Noise that must not count.
    t.insert(0x9_0000, 12345, stack(&[0x2000])).unwrap();

    let (text, summary) = report(&mut t, "libtest", &two_libs());
    assert_eq!(summary.leaks, sizes.len());
    assert_eq!(summary.bytes, sizes.iter().sum::<usize>());
    assert_eq!(text.matches("Leak ").count(), sizes.len());
    assert_eq!(
        text.lines().last().unwrap(),
        format!("=== Total leaks 5, leak size {} byte ===", 1 + 7 + 4096 + 33 + 250)
    );
}

#[test]
fn report_layout() {
    let mut t = Tracker::new();
    // Two tracker frames on top, then libtest, libother, then garbage.
    t.insert(0x500, 64, stack(&[0x9001, 0x9002, 0x1abc, 0x2def, 0x5555])).unwrap();

    let (text, _) = report(&mut t, "libtest.so", &two_libs());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Leak 1, size 64");
    assert_eq!(lines[1], format!("#0 {TEST_LIB} fn_1abc"));
    assert_eq!(lines[2], format!("#1 {OTHER_LIB} fn_2def"));
    assert_eq!(lines[3], "#2 Unknown Unknown");
    assert_eq!(lines[4], "");
    assert_eq!(lines[5], "=== Total leaks 1, leak size 64 byte ===");
}

#[test]
fn stack_of_only_tracker_frames_is_kept_whole() {
    let mut t = Tracker::new();
    t.insert(0x600, 8, stack(&[0x9001, 0x9002])).unwrap();

    let (text, s) = report(&mut t, "libmemleak", &two_libs());
    assert_eq!(s.leaks, 1);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Leak 1, size 8");
    assert_eq!(lines[1], format!("#0 {SELF_LIB} fn_9001"));
    assert_eq!(lines[2], format!("#1 {SELF_LIB} fn_9002"));
    assert_eq!(lines[3], "");
}

#[test]
fn missing_or_empty_config_reports_nothing() {
    let mut t = Tracker::new();
    t.insert(0x10, 1, stack(&[0x1001])).unwrap();

    let (text, summary) = report(&mut t, "  \n\n", &two_libs());
    assert_eq!(summary.leaks, 0);
    assert_eq!(text.trim(), "=== Total leaks 0, leak size 0 byte ===");

    let dir = tempfile::tempdir().unwrap();
    let mut out = Vec::new();
    let summary = t.report(&dir.path().join("nope.txt"), &two_libs(), &mut out).unwrap();
    assert_eq!(summary.leaks, 0);
    assert!(t.filter().is_empty());
    // Still live, just not reported.
    assert_eq!(summary.live, 1);
}

#[test]
fn filter_is_reloaded_every_report() {
    let mut t = Tracker::new();
    t.insert(0x10, 5, stack(&[0x1001])).unwrap();
    t.insert(0x20, 6, stack(&[0x2001])).unwrap();

    let (_, s) = report(&mut t, "libtest", &two_libs());
    assert_eq!((s.leaks, s.bytes), (1, 5));
    let (_, s) = report(&mut t, "libother", &two_libs());
    assert_eq!((s.leaks, s.bytes), (1, 6));
    let (_, s) = report(&mut t, "libtest libother", &two_libs());
    assert_eq!((s.leaks, s.bytes), (2, 11));
}

#[test]
fn filter_tokens() {
    let text = (0..40).map(|i| format!("lib{i}.so")).collect::<Vec<_>>().join("\n");
    let f = StackFilter::parse(&text);
    assert_eq!(f.len(), FILTER_SIZE);
    assert_eq!(f.entries().next(), Some("lib0.so"));
    assert_eq!(f.entries().last(), Some("lib15.so"));

    let f = StackFilter::parse(" a.so\tb.so\n\n a.so c.so ");
    assert_eq!(f.entries().collect::<Vec<_>>(), vec!["a.so", "b.so", "c.so"]);

    // Only the first sixteen tokens are read, repeats included.
    let f = StackFilter::parse(&format!("{}b.so\n", "a.so\n".repeat(FILTER_SIZE)));
    assert_eq!(f.entries().collect::<Vec<_>>(), vec!["a.so"]);

    let cfg = config("libtest.so\n");
    let mut f = StackFilter::load(cfg.path()).unwrap();
    assert!(f.matches(&stack(&[0x2000, 0x1fff]), &two_libs()));
    assert!(!f.matches(&stack(&[0x2000]), &two_libs()));
    assert!(!f.matches(&CapturedStack::empty(), &two_libs()));
    f.reload(&cfg.path().with_extension("missing"));
    assert!(f.is_empty());
}

#[test]
fn colliding_addresses_stay_discoverable() {
    let mut rng = rand::thread_rng();
    let mut reg: Registry<usize, Collide> = Registry::with_buckets_and_hasher(64, Collide);
    let mut keys: Vec<usize> = Vec::new();
    let mut seen = HashSet::new();
    while keys.len() < 500 {
        let k = rng.gen_range(1..usize::MAX >> 4) << 4;
        if seen.insert(k) {
            keys.push(k);
        }
    }
    for k in &keys {
        assert_eq!(reg.bucket_of(*k), 0);
        assert!(reg.insert(*k, *k / 16).unwrap());
    }

    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(200);
    for k in gone {
        assert_eq!(reg.remove(*k), Some(*k / 16));
    }

    assert_eq!(reg.len(), kept.len());
    for k in gone {
        assert!(!reg.contains(*k));
    }
    for k in kept {
        assert_eq!(reg.get(*k), Some(&(*k / 16)));
    }
    let walked: HashSet<usize> = reg.iter().map(|(k, _)| k).collect();
    assert_eq!(walked, kept.iter().copied().collect::<HashSet<_>>());
}

#[test]
fn colliding_tracker_reports_survivors() {
    let registry = Registry::with_buckets_and_hasher(16, Collide);
    let mut t = Tracker::with_registry(registry);
    for i in 0..10 {
        t.insert(0x1000 * (i + 1), i + 1, stack(&[0x1000 + i])).unwrap();
    }
    for i in (0..10).step_by(2) {
        t.remove(0x1000 * (i + 1));
    }
    let (_, s) = report(&mut t, "libtest", &two_libs());
    // Survivors are i = 1, 3, 5, 7, 9 with sizes 2, 4, 6, 8, 10.
    assert_eq!((s.leaks, s.bytes), (5, 30));
}
