//! Read-only statistics view over an arena's block lists.
//!
//! Mirrors `FastAllocator::Statistics`/`AllStatistics` in the original
//! source: a pure walk over `used_blocks`/`free_blocks`, summing
//! per-block used/free/wasted/allocated bytes filtered by source and
//! huge-pages flag. No locks are taken; values are momentary and safe
//! to read concurrently with allocation (the walk only dereferences
//! stable `next` links and reads each block's atomics).

use std::fmt;

use crate::block::Block;
use crate::BlockSource;

/// Byte breakdown for one `(source, huge_pages)` projection, or the
/// `Any` projection across every block regardless of source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub bytes_used: usize,
    pub bytes_free: usize,
    pub bytes_wasted: usize,
}

impl Statistics {
    pub fn bytes_allocated_total(&self) -> usize {
        self.bytes_used + self.bytes_free + self.bytes_wasted
    }

    pub(crate) fn collect(
        used_blocks: Option<&Block>,
        free_blocks: Option<&Block>,
        filter: Option<(BlockSource, bool)>,
    ) -> Statistics {
        let mut stats = Statistics::default();
        if let Some(head) = used_blocks {
            stats.bytes_used += head.sum_used_bytes(filter);
            stats.bytes_free += head.sum_free_bytes(filter);
            stats.bytes_wasted += head.sum_wasted_bytes(filter);
        }
        if let Some(head) = free_blocks {
            stats.bytes_free += head.sum_allocated_bytes(filter);
            stats.bytes_wasted += head.sum_wasted_bytes(filter);
        }
        stats
    }
}

impl core::ops::Add for Statistics {
    type Output = Statistics;
    fn add(self, other: Statistics) -> Statistics {
        Statistics {
            bytes_used: self.bytes_used + other.bytes_used,
            bytes_free: self.bytes_free + other.bytes_free,
            bytes_wasted: self.bytes_wasted + other.bytes_wasted,
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used = {:.3} MB, free = {:.3} MB, wasted = {:.3} MB, total = {:.3} MB",
            self.bytes_used as f64 * 1e-6,
            self.bytes_free as f64 * 1e-6,
            self.bytes_wasted as f64 * 1e-6,
            self.bytes_allocated_total() as f64 * 1e-6,
        )
    }
}

/// Full statistics breakdown across every source, as produced by
/// [`crate::Arena::all_statistics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AllStatistics {
    pub bytes_used: usize,
    pub bytes_wasted: usize,
    pub all: Statistics,
    pub aligned_heap: Statistics,
    pub os_mapped_4k: Statistics,
    pub os_mapped_2m: Statistics,
    pub shared: Statistics,
}

impl fmt::Display for AllStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "alloc : used = {:.3} MB, wasted = {:.3} MB, total = {:.3} MB",
            self.bytes_used as f64 * 1e-6,
            self.bytes_wasted as f64 * 1e-6,
            (self.bytes_used + self.bytes_wasted) as f64 * 1e-6,
        )?;
        writeln!(f, "  total      : {}", self.all)?;
        writeln!(f, "  aligned    : {}", self.aligned_heap)?;
        writeln!(f, "  os-mapped 4K: {}", self.os_mapped_4k)?;
        writeln!(f, "  os-mapped 2M: {}", self.os_mapped_2m)?;
        write!(f, "  shared     : {}", self.shared)
    }
}
