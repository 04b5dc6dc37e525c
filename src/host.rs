//! Host-provided services the arena is built against.
//!
//! These are the "external collaborators" named in the specification:
//! the allocator never talks to a device or the OS directly except
//! through this narrow surface, so a host can plug in accounting or a
//! mock without the allocator's concurrency protocol changing.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Notified of every allocation/free delta the arena performs.
///
/// `delta_bytes` is positive for growth and negative for a release;
/// `commit` distinguishes a newly-committed extent (crossing a block's
/// previously allocated high-water mark) from a reservation/free that
/// doesn't represent fresh committed memory.
pub trait MemoryMonitor: Send + Sync {
    fn memory_monitor(&self, delta_bytes: isize, commit: bool);
}

/// A [`MemoryMonitor`] that does nothing, for hosts that don't track
/// allocation deltas (tests, or a builder run outside of a device).
#[derive(Debug, Default)]
pub struct NullMonitor;

impl MemoryMonitor for NullMonitor {
    fn memory_monitor(&self, _delta_bytes: isize, _commit: bool) {}
}

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_ID: Cell<usize> = const { Cell::new(0) };
}

/// A stable per-thread identifier used for slot selection.
///
/// The original allocator reads a thread-local storage register
/// directly (`%fs:0`/`%gs:0`) for speed. Doing the equivalent in safe
/// Rust would mean per-architecture inline assembly for a value that is
/// only ever used to pick one of up to 8 slots by its low bits, so this
/// assigns a small incrementing id to each thread on first use instead
/// — same slot-selection behavior, no unsafe platform-specific reads.
#[inline]
pub fn thread_id() -> usize {
    THREAD_ID.with(|id| {
        let mut v = id.get();
        if v == 0 {
            v = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            id.set(v);
        }
        v
    })
}
