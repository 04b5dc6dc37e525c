//! The per-thread handle layer: [`ThreadPair`] (the leaked thread-local
//! state) and [`CachedAllocator`] (the short-lived, borrowing handle a
//! caller actually holds and calls `alloc` through).
//!
//! `ThreadPair` never owns or dereferences a pointer back to the
//! [`crate::Arena`] it was last used with — it only keeps an identity
//! tag (the arena's address plus its reset epoch) to detect "this
//! thread is now allocating against a different arena, or the same
//! arena after a reset" and clear its bump streams accordingly. All
//! real access to the arena happens through `CachedAllocator`'s borrow,
//! so there is no non-owning raw pointer ever dereferenced — a
//! deliberate, safer rewrite of the original's weak back-reference.

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::arena::{Arena, Counters};
use crate::bumper::ThreadBumper;
use crate::error::{AllocError, Result};

pub(crate) struct ThreadPair {
    tag: Cell<(usize, usize)>,
    slot: Cell<usize>,
    single_mode: Cell<bool>,
    /// The currently-bound arena's counters, held so that rebinding away
    /// (to a different arena, or the same arena after a reset) can flush
    /// this pair's accumulated bumper activity without ever
    /// dereferencing the arena itself — the `Arc` keeps the counters
    /// alive independently of the arena's own lifetime.
    bound_counters: Cell<Option<Arc<Counters>>>,
    b0: ThreadBumper,
    b1: ThreadBumper,
}

impl ThreadPair {
    fn new() -> Self {
        ThreadPair {
            tag: Cell::new((0, usize::MAX)),
            slot: Cell::new(0),
            single_mode: Cell::new(true),
            bound_counters: Cell::new(None),
            b0: ThreadBumper::new(),
            b1: ThreadBumper::new(),
        }
    }

    /// Flushes both bumpers' accumulated counters into whichever arena
    /// this pair was previously bound to (if any), then binds to the new
    /// one. Mirrors `bind`'s "if previously bound to a different Arena,
    /// flush counters" step; our non-owning tag design makes the
    /// no-longer-bound check implicit (the caller only calls this when
    /// the tag has already changed).
    fn rebind(&self, tag: (usize, usize), slot: usize, single_mode: bool, alloc_block_size: usize, counters: Arc<Counters>) {
        if let Some(prev) = self.bound_counters.take() {
            let (used0, wasted0) = self.b0.take_counters();
            let (used1, wasted1) = self.b1.take_counters();
            prev.flush(used0 + used1, wasted0 + wasted1);
        }
        self.bound_counters.set(Some(counters));
        self.tag.set(tag);
        self.slot.set(slot);
        self.single_mode.set(single_mode);
        self.b0.init(alloc_block_size);
        self.b1.init(alloc_block_size);
    }
}

thread_local! {
    static THREAD_PAIR: Cell<Option<NonNull<ThreadPair>>> = const { Cell::new(None) };
}

fn thread_pair() -> NonNull<ThreadPair> {
    THREAD_PAIR.with(|cell| {
        if let Some(p) = cell.get() {
            p
        } else {
            let leaked: &'static mut ThreadPair = Box::leak(Box::new(ThreadPair::new()));
            let p = NonNull::from(leaked);
            cell.set(Some(p));
            p
        }
    })
}

/// A per-thread allocation handle borrowed from an [`Arena`].
///
/// Cheap to obtain repeatedly (it's a thread-local lookup plus a
/// pointer/epoch comparison) — callers are expected to call
/// [`Arena::cached_allocator`] once per build step rather than caching
/// it themselves across threads.
pub struct CachedAllocator<'a> {
    arena: &'a Arena,
    pair: NonNull<ThreadPair>,
}

impl<'a> CachedAllocator<'a> {
    pub(crate) fn new(arena: &'a Arena, slot: usize, single_mode: bool) -> Self {
        let pair = thread_pair();
        let tag = (arena as *const Arena as usize, arena.epoch());
        let pair_ref = unsafe { pair.as_ref() };
        if pair_ref.tag.get() != tag {
            pair_ref.rebind(tag, slot, single_mode, arena.default_block_size(), arena.counters());
        }
        CachedAllocator { arena, pair }
    }

    fn pair(&self) -> &ThreadPair {
        unsafe { self.pair.as_ref() }
    }

    /// Allocates `bytes` aligned to `align` from this thread's primary
    /// bump stream, refilling from the arena on exhaustion and falling
    /// back to a dedicated allocation for requests too large to ever
    /// fit in a slab. An alias for [`Self::alloc0`].
    pub fn alloc(&self, bytes: usize, align: usize) -> Result<*mut u8> {
        self.alloc0(bytes, align)
    }

    /// Allocates from the first bump stream.
    pub fn alloc0(&self, bytes: usize, align: usize) -> Result<*mut u8> {
        self.alloc_stream(bytes, align, false)
    }

    /// Allocates from the second, independent bump stream. Identical to
    /// [`Self::alloc0`] when the arena was initialized without two
    /// streams (`single_mode`): both calls then share stream 0.
    pub fn alloc1(&self, bytes: usize, align: usize) -> Result<*mut u8> {
        self.alloc_stream(bytes, align, true)
    }

    fn alloc_stream(&self, bytes: usize, align: usize, secondary: bool) -> Result<*mut u8> {
        if align > crate::MAX_ALIGNMENT {
            return Err(AllocError::InvalidAlignment { align, max: crate::MAX_ALIGNMENT });
        }
        if bytes > crate::MAX_ALLOCATION_SIZE {
            return Err(AllocError::AllocationTooLarge {
                requested: bytes,
                max: crate::MAX_ALLOCATION_SIZE,
            });
        }

        let pair = self.pair();
        let use_secondary = secondary && !pair.single_mode.get();
        let bumper = if use_secondary { &pair.b1 } else { &pair.b0 };

        // The heuristic ratio from the original's `ThreadLocal::malloc`:
        // preserved exactly rather than tied to a fixed constant, so it
        // scales with however this arena was actually sized.
        if 4 * bytes > bumper.alloc_block_size() {
            return self.arena.alloc_dedicated(bytes, align);
        }

        if let Some(ptr) = bumper.try_alloc(bytes, align) {
            return Ok(ptr.as_ptr());
        }

        let (ptr, len) = self.arena.refill(pair.slot.get(), bumper.alloc_block_size().max(bytes), align)?;
        bumper.install(ptr, len);
        bumper
            .try_alloc(bytes, align)
            .map(|p| p.as_ptr())
            .ok_or(AllocError::AllocationTooLarge { requested: bytes, max: len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullMonitor;
    use std::sync::Arc;

    #[test]
    fn repeated_allocs_are_disjoint_and_aligned() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        arena.init_estimate(1 << 16, false, false);
        let cached = arena.cached_allocator();
        let mut ptrs = Vec::new();
        for _ in 0..256 {
            let p = cached.alloc(32, 16).unwrap();
            assert_eq!(p as usize % 16, 0);
            ptrs.push(p as usize);
        }
        ptrs.sort_unstable();
        ptrs.dedup();
        assert_eq!(ptrs.len(), 256);
    }

    #[test]
    fn oversized_request_is_rejected() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        arena.init_estimate(1 << 16, false, false);
        let cached = arena.cached_allocator();
        let err = cached.alloc(crate::MAX_ALLOCATION_SIZE + 1, 16).unwrap_err();
        assert!(matches!(err, AllocError::AllocationTooLarge { .. }));
    }
}
