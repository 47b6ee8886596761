#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::io::Write;
use std::ops::Range;
use leakcore::*;
use tempfile::NamedTempFile;

/// Maps synthetic instruction pointers to module paths.
pub struct Modules {
    pub ranges:     Vec<(Range<usize>, &'static str)>,
    /// Module for anything outside `ranges`; `None` leaves it unresolved.
    pub fallback:   Option<&'static str>,
    pub own:        Option<&'static str>,
}

impl Modules {
    pub fn new(ranges: Vec<(Range<usize>, &'static str)>) -> Self {
        Self { ranges, fallback: None, own: None }
    }

    /// Every address belongs to `module`.
    pub fn everything(module: &'static str) -> Self {
        Self { ranges: vec![], fallback: Some(module), own: None }
    }
}

impl Symbolizer for Modules {
    fn symbolicate(&self, ip: usize) -> Symbol {
        let module = self.ranges
            .iter()
            .find(|(r, _)| r.contains(&ip))
            .map(|(_, m)| *m)
            .or(self.fallback)
            .map(String::from);
        let name = module.as_ref().map(|_| format!("fn_{ip:x}"));

        Symbol { module, name }
    }

    fn own_module(&self) -> Option<String> {
        self.own.map(String::from)
    }
}

pub const TEST_LIB:     &str = "/system/lib/libtest.so";
pub const OTHER_LIB:    &str = "/usr/lib/libother.so";
pub const SELF_LIB:     &str = "/opt/memleak/libmemleak.so";

/// 0x1000.. is libtest, 0x2000.. is libother, 0x9000.. is the tracker.
pub fn two_libs() -> Modules {
    let mut m = Modules::new(vec![
        (0x1000..0x2000, TEST_LIB),
        (0x2000..0x3000, OTHER_LIB),
        (0x9000..0xa000, SELF_LIB),
    ]);
    m.own = Some(SELF_LIB);
    m
}

pub fn config(text: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

pub fn report<S: BuildHasher>(tracker: &mut Tracker<S>, filter: &str, sym: &dyn Symbolizer) -> (String, ReportSummary) {
    let cfg = config(filter);
    let mut out = Vec::new();
    let summary = tracker.report(cfg.path(), sym, &mut out).unwrap();

    (String::from_utf8(out).unwrap(), summary)
}

/// Everything lands in bucket 0.
#[derive(Clone, Copy, Default)]
pub struct Collide;

pub struct Zero;

impl Hasher for Zero {
    fn finish(&self) -> u64 { 0 }
    fn write(&mut self, _: &[u8]) {}
}

impl BuildHasher for Collide {
    type Hasher = Zero;
    fn build_hasher(&self) -> Zero { Zero }
}
