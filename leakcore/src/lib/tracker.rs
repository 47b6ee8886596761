use std::hash::BuildHasher;
use std::io::Write;
use std::path::Path;
use crate::error::LeakError;
use crate::filter::StackFilter;
use crate::registry::{AddressHasher, Registry};
use crate::report::{self, ReportSummary};
use crate::stack::CapturedStack;
use crate::symbols::Symbolizer;

/// One live allocation: where it is, how big, and who asked for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub address:    usize,
    pub size:       usize,
    pub stack:      CapturedStack,
}

/// Running totals since load. Only tracked calls are counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub allocations:        usize,
    pub frees:              usize,
    pub allocated_bytes:    usize,
    pub freed_bytes:        usize,
    /// Allocations left untracked because bookkeeping itself failed.
    pub dropped:            usize,
}

/// Everything guarded by the global tracking lock: the live registry, the
/// allow-list it is reported through, and the counters.
pub struct Tracker<S = AddressHasher> {
    live:   Registry<AllocationRecord, S>,
    filter: StackFilter,
    stats:  Stats,
}

impl Tracker {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BuildHasher> Tracker<S> {
    pub fn with_registry(live: Registry<AllocationRecord, S>) -> Self {
        Self { live, filter: StackFilter::default(), stats: Stats::default() }
    }

    pub fn live(&self) -> &Registry<AllocationRecord, S> {
        &self.live
    }

    /// The allow-list loaded by the latest report.
    pub fn filter(&self) -> &StackFilter {
        &self.filter
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Registers a fresh allocation. `Ok(false)` means `address` was
    /// already live; the first record wins.
    pub fn insert(&mut self, address: usize, size: usize, stack: CapturedStack) -> Result<bool, LeakError> {
        let record = AllocationRecord { address, size, stack };
        match self.live.insert(address, record) {
            Ok(fresh)   => {
                if fresh {
                    self.stats.allocations += 1;
                    self.stats.allocated_bytes = self.stats.allocated_bytes.saturating_add(size);
                }
                Ok(fresh)
            },
            Err(e)      => {
                self.stats.dropped += 1;
                Err(e)
            }
        }
    }

    /// Forgets `address`. Untracked addresses (double frees included) are
    /// not an error.
    pub fn remove(&mut self, address: usize) -> Option<AllocationRecord> {
        let record = self.live.remove(address)?;
        self.stats.frees += 1;
        self.stats.freed_bytes = self.stats.freed_bytes.saturating_add(record.size);

        Some(record)
    }

    /// Reloads the allow-list from `filter_path`, then writes one entry per
    /// matching live record followed by the totals. The caller holds the
    /// lock this tracker lives behind for the whole run.
    pub fn report<W: Write>(
        &mut self,
        filter_path:    &Path,
        symbolizer:     &dyn Symbolizer,
        out:            &mut W,
    ) -> Result<ReportSummary, LeakError> {
        self.filter.reload(filter_path);
        report::write(&self.live, &self.filter, self.stats, symbolizer, out)
    }
}
