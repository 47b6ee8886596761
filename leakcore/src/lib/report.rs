use std::hash::BuildHasher;
use std::io::Write;
use log::info;
use crate::error::LeakError;
use crate::filter::StackFilter;
use crate::registry::Registry;
use crate::symbols::{Symbol, Symbolizer};
use crate::tracker::{AllocationRecord, Stats};

const UNKNOWN: &str = "Unknown";

/// Outcome of one report run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Live records that passed the filter.
    pub leaks:  usize,
    /// Sum of their sizes.
    pub bytes:  usize,
    /// Live records, filtered or not.
    pub live:   usize,
    pub stats:  Stats,
}

// Text layout, one record at a time:
//
//   Leak <n>, size <bytes>
//   #<i> <module|Unknown> <symbol|Unknown>     (innermost first)
//   <blank>
//
// then `=== Total leaks <n>, leak size <bytes> byte ===`.
pub(crate) fn write<W, S>(
    live:       &Registry<AllocationRecord, S>,
    filter:     &StackFilter,
    stats:      Stats,
    symbolizer: &dyn Symbolizer,
    out:        &mut W,
) -> Result<ReportSummary, LeakError>
where
    W: Write,
    S: BuildHasher,
{
    let own = symbolizer.own_module();
    let mut summary = ReportSummary { live: live.len(), stats, ..Default::default() };

    for (_, record) in live.iter() {
        if !filter.matches(&record.stack, symbolizer) {
            continue;
        }
        summary.leaks += 1;
        summary.bytes = summary.bytes.saturating_add(record.size);

        writeln!(out, "Leak {}, size {}", summary.leaks, record.size)?;
        let frames: Vec<Symbol> = record.stack
            .frames()
            .iter()
            .map(|ip| symbolizer.symbolicate(*ip))
            .collect();
        // Our own frames sit on top: they're the capture, not the caller.
        // A stack that is nothing but ours is printed whole.
        let first = frames.iter()
            .position(|sym| own.is_none() || sym.module != own)
            .unwrap_or(0);
        for (i, sym) in frames[first..].iter().enumerate() {
            writeln!(
                out,
                "#{i} {} {}",
                sym.module.as_deref().unwrap_or(UNKNOWN),
                sym.name.as_deref().unwrap_or(UNKNOWN),
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "=== Total leaks {}, leak size {} byte ===", summary.leaks, summary.bytes)?;
    out.flush()?;

    info!(
        "{} live allocations ({} tracked, {} freed, {} bytes allocated, {} bytes freed, {} untracked)",
        summary.live,
        stats.allocations,
        stats.frees,
        stats.allocated_bytes,
        stats.freed_bytes,
        stats.dropped,
    );

    Ok(summary)
}
