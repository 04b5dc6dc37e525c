//! Owner of every [`Block`], the sizing policy that grows them, and the
//! concurrency protocol threads use to pull fresh slabs without
//! serializing on a single global lock.

use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::block::{Block, BlockSource};
use crate::error::{AllocError, Result};
use crate::host::MemoryMonitor;
use crate::pair::CachedAllocator;
use crate::stats::{AllStatistics, Statistics};
use crate::MAX_THREAD_USED_BLOCK_SLOTS;

/// Below this size a block is carved out of the process heap; at or
/// above it, a block gets its own OS mapping so it can be released
/// back to the OS independently (and so it's eligible for huge pages).
const OS_MAPPED_THRESHOLD: usize = 4096;

const MIN_BLOCK_SIZE: usize = 64 * 1024;
const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// The five `(source, huge_pages)` projections the allocator reports
/// statistics for.
const PROJECTIONS: [(&str, Option<(BlockSource, bool)>); 5] = [
    ("all", None),
    ("aligned-heap", Some((BlockSource::AlignedHeap, false))),
    ("os-mapped-4k", Some((BlockSource::OSMapped, false))),
    ("os-mapped-2m", Some((BlockSource::OSMapped, true))),
    ("shared", Some((BlockSource::Shared, false))),
];

fn clamp_usize(v: usize, lo: usize, hi: usize) -> usize {
    v.max(lo).min(hi)
}

fn round_up_to(v: usize, multiple: usize) -> usize {
    v.div_ceil(multiple) * multiple
}

/// The arena's own aggregate byte counters, fed exclusively by
/// `ThreadPair` flushing a bumper's activity on bind/rebind — distinct
/// from [`Statistics`], which is a live read over the block lists.
/// Handed out as a cloned `Arc` so a `ThreadPair` can flush into the
/// arena it was previously (possibly no longer live) bound to without
/// ever dereferencing the arena itself.
#[derive(Default)]
pub(crate) struct Counters {
    bytes_used: AtomicUsize,
    bytes_wasted: AtomicUsize,
}

impl Counters {
    pub(crate) fn flush(&self, used: usize, wasted: usize) {
        self.bytes_used.fetch_add(used, Ordering::Relaxed);
        self.bytes_wasted.fetch_add(wasted, Ordering::Relaxed);
    }
}

/// Concurrent block-based bump arena.
///
/// Allocations never return memory to the arena individually; only
/// [`Arena::reset`] (reuse blocks, start bumping from zero again) and
/// [`Arena::clear`] (release everything back to the OS) are supported.
pub struct Arena {
    monitor: Arc<dyn MemoryMonitor>,
    use_huge_pages: AtomicBool,
    single_mode: AtomicBool,
    slot_mask: AtomicUsize,
    default_block_size: AtomicUsize,
    grow_size: AtomicUsize,
    max_grow_size: AtomicUsize,
    log2_grow_scale: AtomicUsize,
    epoch: AtomicUsize,
    counters: Arc<Counters>,

    used_blocks: Mutex<Option<NonNull<Block>>>,
    free_blocks: Mutex<Option<NonNull<Block>>>,
    slot_blocks: Vec<Mutex<Option<NonNull<Block>>>>,

    shared_store: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new(monitor: Arc<dyn MemoryMonitor>, use_huge_pages: bool) -> Arena {
        let mut slot_blocks = Vec::with_capacity(MAX_THREAD_USED_BLOCK_SLOTS);
        slot_blocks.resize_with(MAX_THREAD_USED_BLOCK_SLOTS, || Mutex::new(None));
        Arena {
            monitor,
            use_huge_pages: AtomicBool::new(use_huge_pages),
            single_mode: AtomicBool::new(true),
            slot_mask: AtomicUsize::new(0),
            default_block_size: AtomicUsize::new(MIN_BLOCK_SIZE),
            grow_size: AtomicUsize::new(MIN_BLOCK_SIZE),
            max_grow_size: AtomicUsize::new(MAX_BLOCK_SIZE),
            log2_grow_scale: AtomicUsize::new(0),
            epoch: AtomicUsize::new(0),
            counters: Arc::new(Counters::default()),
            used_blocks: Mutex::new(None),
            free_blocks: Mutex::new(None),
            slot_blocks,
            shared_store: Mutex::new(Vec::new()),
        }
    }

    /// Sizes the arena's growth policy from an estimate of total bytes
    /// the coming build will need, following the same clamp formulas as
    /// the original `FastAllocator::initEstimate`.
    ///
    /// `single_mode` is an override, not a toggle: passing `true` forces
    /// a single bump stream per thread regardless of the estimate;
    /// passing `false` (the common case) leaves the decision to the
    /// size-dependent formula below. `compact` forces `slot_mask` to
    /// zero (one contention shard), overriding the estimate-scaled
    /// default.
    pub fn init_estimate(&self, bytes_estimate: usize, single_mode: bool, compact: bool) {
        let page = crate::os::page_size();
        let estimate = round_up_to(bytes_estimate.max(1), page);

        let default_block_size = clamp_usize(estimate / 4, 128, page.saturating_sub(64).max(128));
        let max_grow_size = clamp_usize(estimate / 20, page.saturating_sub(64), 4 * 1024 * 1024 - 64);
        let grow_size = clamp_usize(estimate / 40, page.saturating_sub(64), max_grow_size);
        let computed_single_mode = single_mode || (2 * default_block_size >= estimate / 100);
        let slot_mask = if compact {
            0
        } else if estimate > 16 * crate::MAX_ALLOCATION_SIZE {
            7
        } else if estimate > 8 * crate::MAX_ALLOCATION_SIZE {
            3
        } else if estimate > 4 * crate::MAX_ALLOCATION_SIZE {
            1
        } else {
            0
        };

        self.default_block_size.store(default_block_size, Ordering::Relaxed);
        self.grow_size.store(grow_size, Ordering::Relaxed);
        self.max_grow_size.store(max_grow_size, Ordering::Relaxed);
        self.log2_grow_scale.store(0, Ordering::Relaxed);
        self.single_mode.store(computed_single_mode, Ordering::Relaxed);
        self.slot_mask.store(slot_mask, Ordering::Relaxed);
        trace!(
            "init_estimate: estimate={estimate}, default_block_size={default_block_size}, \
             grow_size={grow_size}, max_grow_size={max_grow_size}, single_mode={computed_single_mode}, \
             slot_mask={slot_mask}"
        );
    }

    /// Sizes the growth policy directly from a known allocation size and
    /// eagerly creates one block, rather than waiting for the first miss
    /// to create it lazily. `bytes_allocate` is committed up front and
    /// charged to the host monitor immediately; `bytes_reserve` (when
    /// larger) is address space the block reserves but doesn't charge
    /// for until a later allocation actually bumps into it.
    pub fn init(&self, bytes_allocate: usize, bytes_reserve: usize) {
        let size = clamp_usize(bytes_allocate.max(bytes_reserve), MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self.default_block_size.store(size, Ordering::Relaxed);
        self.grow_size.store(size, Ordering::Relaxed);
        self.max_grow_size.store(MAX_BLOCK_SIZE, Ordering::Relaxed);
        self.log2_grow_scale.store(0, Ordering::Relaxed);

        match self.create_block(bytes_allocate, bytes_reserve, self.use_huge_pages.load(Ordering::Relaxed)) {
            Ok(block) => {
                let mut free = self.free_blocks.lock().unwrap();
                unsafe { block.as_ptr().as_mut().unwrap() }.next = *free;
                *free = Some(block);
                self.monitor.memory_monitor(bytes_allocate as isize, true);
            }
            Err(err) => {
                log::warn!("init: eager block creation failed, deferring to lazy allocation: {err}");
            }
        }
    }

    pub(crate) fn default_block_size(&self) -> usize {
        self.default_block_size.load(Ordering::Relaxed)
    }

    pub(crate) fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Moves every per-slot block onto the used list and clears slot
    /// state, without unbinding any thread or freeing memory. Meant as
    /// the handoff point at the end of a build, before the next
    /// `reset`/`clear` or before statistics are read.
    pub fn cleanup(&self) {
        for slot in &self.slot_blocks {
            *slot.lock().unwrap() = None;
        }
    }

    /// Returns the payload pointer of the first free block without
    /// touching its bump cursor.
    ///
    /// # Safety contract
    /// The caller must have exclusive access to the returned region (no
    /// other allocation may be in flight against this arena) and must
    /// not call this more than once per block before the next
    /// `reset`/`clear`. This is a single-use escape hatch, not a normal
    /// allocation path.
    pub fn special_alloc(&self, bytes: usize) -> Option<*mut u8> {
        let free = self.free_blocks.lock().unwrap();
        let block = (*free)?;
        let b = unsafe { block.as_ref() };
        if b.reserved_bytes() < bytes {
            return None;
        }
        Some(b.payload_ptr())
    }

    /// Total bytes actually handed out to callers, aggregated from
    /// every `ThreadPair` that has bound, rebound, or moved away from
    /// this arena. Reported through [`Counters`] rather than the block
    /// lists directly: a block's own cursor only advances in
    /// slab-sized jumps when a `ThreadBumper` refills, so it can't tell
    /// how much of that slab went to actual requests versus how much
    /// is still sitting unconsumed in a live bumper.
    pub fn used_bytes(&self) -> usize {
        self.counters.bytes_used.load(Ordering::Relaxed)
    }

    /// Total bytes lost to front-alignment padding and discarded slab
    /// remainders, aggregated the same way as [`Arena::used_bytes`].
    pub fn wasted_bytes(&self) -> usize {
        self.counters.bytes_wasted.load(Ordering::Relaxed)
    }

    pub(crate) fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Acquire)
    }

    fn slot_for_thread(&self) -> usize {
        crate::host::thread_id() & self.slot_mask.load(Ordering::Relaxed)
    }

    /// Returns this thread's allocation handle, binding or rebinding
    /// its thread-local state to this arena as needed.
    pub fn cached_allocator(&self) -> CachedAllocator<'_> {
        let slot = self.slot_for_thread();
        let single_mode = self.single_mode.load(Ordering::Relaxed);
        CachedAllocator::new(self, slot, single_mode)
    }

    /// Stores an arbitrary host value in arena-wide opaque storage,
    /// returning a handle to retrieve it later with [`Arena::unshare`].
    ///
    /// Used to pass ownership of host collaborators (e.g. a primitive
    /// array being built) through the arena without the arena needing a
    /// generic parameter for every possible payload type.
    pub fn share<T: Send + 'static>(&self, value: T) -> usize {
        let mut store = self.shared_store.lock().unwrap();
        store.push(Some(Box::new(value)));
        store.len() - 1
    }

    /// Retrieves and removes a value previously stored with
    /// [`Arena::share`]. Panics if `handle` was already taken or never
    /// issued, or if `T` doesn't match the type it was shared as.
    pub fn unshare<T: Send + 'static>(&self, handle: usize) -> T {
        let mut store = self.shared_store.lock().unwrap();
        let boxed = store[handle].take().expect("shared handle already taken");
        *boxed.downcast::<T>().expect("shared value type mismatch")
    }

    /// Donates host-owned memory to the free list. The arena will hand
    /// it out like any other block but never frees it. The region is
    /// aligned forward to 64 bytes (shrinking its usable size by
    /// whatever that costs); what remains must still be at least 4 KiB
    /// or the donation is ignored and `false` is returned.
    pub fn add_block(&self, data: NonNull<u8>, bytes: usize) -> bool {
        let addr = data.as_ptr() as usize;
        let aligned_addr = (addr + 63) & !63;
        let shift = aligned_addr - addr;
        if shift >= bytes {
            return false;
        }
        let usable = bytes - shift;
        if usable < OS_MAPPED_THRESHOLD {
            return false;
        }
        let aligned = unsafe { NonNull::new_unchecked(aligned_addr as *mut u8) };
        let mut free = self.free_blocks.lock().unwrap();
        let block = Block::from_shared(aligned, usable, *free);
        *free = Some(block);
        true
    }

    /// Allocates a single large request by going through the same
    /// block-acquisition path as an ordinary bumper refill (reusing an
    /// adequately sized free block if one exists, else creating one) —
    /// it bypasses only the per-thread bump-stream tiers, not the
    /// arena's pooling.
    pub(crate) fn alloc_dedicated(&self, bytes: usize, align: usize) -> Result<*mut u8> {
        if bytes > crate::MAX_ALLOCATION_SIZE {
            return Err(AllocError::AllocationTooLarge { requested: bytes, max: crate::MAX_ALLOCATION_SIZE });
        }
        let block = self.acquire_block(bytes + align)?;
        let b = unsafe { block.as_ref() };
        let (ptr, _, committed) = b
            .try_alloc(bytes, align, false)
            .expect("acquired block must satisfy the request that sized it");
        if committed > 0 {
            self.monitor.memory_monitor(committed as isize, true);
        }
        self.counters.bytes_used.fetch_add(bytes, Ordering::Relaxed);
        Ok(ptr.as_ptr())
    }

    pub(crate) fn refill(&self, slot: usize, min_bytes: usize, align: usize) -> Result<(NonNull<u8>, usize)> {
        let mut guard = self.slot_blocks[slot].lock().unwrap();
        if let Some(block) = *guard {
            let b = unsafe { block.as_ref() };
            if let Some((ptr, granted, committed)) = b.try_alloc(min_bytes, align, false) {
                if committed > 0 {
                    self.monitor.memory_monitor(committed as isize, true);
                }
                return Ok((ptr, granted));
            }
        }
        let block = self.acquire_block(min_bytes + align)?;
        let b = unsafe { block.as_ref() };
        let (ptr, granted, committed) = b
            .try_alloc(min_bytes, align, true)
            .expect("freshly acquired block must satisfy the request that sized it");
        if committed > 0 {
            self.monitor.memory_monitor(committed as isize, true);
        }
        *guard = Some(block);
        Ok((ptr, granted))
    }

    fn acquire_block(&self, min_bytes: usize) -> Result<NonNull<Block>> {
        if let Some(block) = self.pop_free_block(min_bytes) {
            let mut used = self.used_blocks.lock().unwrap();
            unsafe { block.as_ptr().as_mut().unwrap() }.next = *used;
            *used = Some(block);
            return Ok(block);
        }

        let size = self.next_growsize(min_bytes);
        let block = self.create_block(size, size, self.use_huge_pages.load(Ordering::Relaxed))?;
        let mut used = self.used_blocks.lock().unwrap();
        unsafe { block.as_ptr().as_mut().unwrap() }.next = *used;
        *used = Some(block);
        self.monitor.memory_monitor(size as isize, true);
        Ok(block)
    }

    /// Doubles the growth scale on every call (capped at `1 << 16`) so
    /// that successive block creations within one build grow
    /// geometrically instead of linearly, matching the original's
    /// `inc_scale()`.
    fn inc_scale(&self) -> usize {
        let prev = self.log2_grow_scale.fetch_add(1, Ordering::Relaxed);
        1usize << prev.min(16)
    }

    fn next_growsize(&self, min_bytes: usize) -> usize {
        let grow_size = self.grow_size.load(Ordering::Relaxed);
        let max_grow = self.max_grow_size.load(Ordering::Relaxed);
        let scale = self.inc_scale();
        grow_size.saturating_mul(scale).min(max_grow).max(min_bytes)
    }

    fn create_block(&self, bytes_allocate: usize, bytes_reserve: usize, prefer_huge_pages: bool) -> Result<NonNull<Block>> {
        let reserve = bytes_reserve.max(bytes_allocate);
        let source = if reserve >= OS_MAPPED_THRESHOLD { BlockSource::OSMapped } else { BlockSource::AlignedHeap };
        debug!(
            "creating block: source={source:?}, allocate={bytes_allocate}, reserve={reserve}, \
             huge_pages_hint={prefer_huge_pages}"
        );
        let block = Block::create(source, bytes_allocate, bytes_reserve, None).map_err(AllocError::from)?;
        if prefer_huge_pages && reserve < crate::PAGE_SIZE_2M {
            unsafe { block.as_ref() }.advise_huge_pages();
        }
        Ok(block)
    }

    fn pop_free_block(&self, min_bytes: usize) -> Option<NonNull<Block>> {
        let mut free = self.free_blocks.lock().unwrap();
        let mut prev: Option<NonNull<Block>> = None;
        let mut cursor = *free;
        while let Some(block) = cursor {
            let b = unsafe { block.as_ref() };
            if b.reserved_bytes() >= min_bytes {
                let next = b.next;
                match prev {
                    Some(mut p) => unsafe { p.as_mut() }.next = next,
                    None => *free = next,
                }
                return Some(block);
            }
            prev = Some(block);
            cursor = b.next;
        }
        None
    }

    /// Resets every block's bump pointer to zero and moves the used
    /// list back onto the free list, so the next build can start
    /// allocating from the beginning without any new OS allocations.
    /// Already-running [`CachedAllocator`]s pick this up the next time
    /// they're obtained (their cached slabs are invalidated by the
    /// epoch bump).
    pub fn reset(&self) {
        self.counters.bytes_used.store(0, Ordering::Relaxed);
        self.counters.bytes_wasted.store(0, Ordering::Relaxed);
        let mut used = self.used_blocks.lock().unwrap();
        let mut free = self.free_blocks.lock().unwrap();
        let mut cursor = *used;
        while let Some(block) = cursor {
            let b = unsafe { block.as_ref() };
            b.reset();
            cursor = b.next;
        }
        if let Some(tail) = Self::tail_of(*used) {
            unsafe { tail.as_ptr().as_mut().unwrap() }.next = *free;
        }
        if used.is_some() {
            *free = *used;
        }
        *used = None;
        Self::remove_shared_blocks(&mut free);
        for slot in &self.slot_blocks {
            *slot.lock().unwrap() = None;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops every `Shared` block from a list, freeing only the small
    /// header this arena allocated for it (never the host-owned
    /// payload memory it describes). A reset discards donated blocks
    /// rather than keep lending them out indefinitely across builds.
    fn remove_shared_blocks(head: &mut Option<NonNull<Block>>) {
        let mut kept_head = None;
        let mut kept_tail: Option<NonNull<Block>> = None;
        let mut cursor = head.take();
        while let Some(block) = cursor {
            let next = unsafe { block.as_ref() }.next;
            if unsafe { block.as_ref() }.source() == BlockSource::Shared {
                unsafe { Block::destroy(block) };
            } else {
                unsafe { block.as_ptr().as_mut().unwrap() }.next = None;
                match kept_tail {
                    Some(mut tail) => {
                        unsafe { tail.as_mut() }.next = Some(block);
                        kept_tail = Some(block);
                    }
                    None => {
                        kept_head = Some(block);
                        kept_tail = Some(block);
                    }
                }
            }
            cursor = next;
        }
        *head = kept_head;
    }

    fn tail_of(mut head: Option<NonNull<Block>>) -> Option<NonNull<Block>> {
        let mut tail = head.take()?;
        loop {
            let next = unsafe { tail.as_ref() }.next;
            match next {
                Some(n) => tail = n,
                None => return Some(tail),
            }
        }
    }

    /// Releases every non-shared block back to the OS/heap and resets
    /// growth policy to its initial state. Called automatically on
    /// drop.
    pub fn clear(&self) {
        let mut used = self.used_blocks.lock().unwrap();
        let mut free = self.free_blocks.lock().unwrap();
        self.free_list(used.take());
        self.free_list(free.take());
        self.default_block_size.store(MIN_BLOCK_SIZE, Ordering::Relaxed);
        self.grow_size.store(MIN_BLOCK_SIZE, Ordering::Relaxed);
        self.max_grow_size.store(MAX_BLOCK_SIZE, Ordering::Relaxed);
        self.log2_grow_scale.store(0, Ordering::Relaxed);
        self.counters.bytes_used.store(0, Ordering::Relaxed);
        self.counters.bytes_wasted.store(0, Ordering::Relaxed);
        for slot in &self.slot_blocks {
            *slot.lock().unwrap() = None;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Destroys every block in the list, crediting the host monitor with
    /// the negative of whatever positive delta(s) it was charged at
    /// creation/commit time. `Shared` blocks were never charged (the
    /// host already owned that memory), so they're skipped.
    fn free_list(&self, mut head: Option<NonNull<Block>>) {
        while let Some(block) = head {
            let b = unsafe { block.as_ref() };
            let next = b.next;
            if b.source() != BlockSource::Shared {
                let committed = b.committed_bytes();
                if committed > 0 {
                    self.monitor.memory_monitor(-(committed as isize), true);
                }
            }
            unsafe { Block::destroy(block) };
            head = next;
        }
    }

    pub fn statistics(&self, filter: Option<(BlockSource, bool)>) -> Statistics {
        let used = self.used_blocks.lock().unwrap();
        let free = self.free_blocks.lock().unwrap();
        let used_ref = used.map(|b| unsafe { b.as_ref() });
        let free_ref = free.map(|b| unsafe { b.as_ref() });
        Statistics::collect(used_ref, free_ref, filter)
    }

    pub fn all_statistics(&self) -> AllStatistics {
        let all = self.statistics(None);
        AllStatistics {
            bytes_used: all.bytes_used,
            bytes_wasted: all.bytes_wasted,
            all,
            aligned_heap: self.statistics(Some((BlockSource::AlignedHeap, false))),
            os_mapped_4k: self.statistics(Some((BlockSource::OSMapped, false))),
            os_mapped_2m: self.statistics(Some((BlockSource::OSMapped, true))),
            shared: self.statistics(Some((BlockSource::Shared, false))),
        }
    }

    /// Prints every block currently on the used list, then a per-source
    /// statistics summary, to stdout. Diagnostic tool, intentionally not
    /// routed through `log`.
    pub fn print_blocks(&self) {
        let used = self.used_blocks.lock().unwrap();
        let mut cursor = *used;
        let mut index = 0;
        while let Some(block) = cursor {
            let b = unsafe { block.as_ref() };
            println!(
                "block {index}: source={:?}, huge_pages={}, used={}, reserved={}",
                b.source(),
                b.huge_pages(),
                b.bytes_used(),
                b.reserved_bytes(),
            );
            index += 1;
            cursor = b.next;
        }
        drop(used);
        for (name, filter) in PROJECTIONS {
            println!("{name}: {}", self.statistics(filter));
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullMonitor;

    #[test]
    fn reset_preserves_capacity_for_reuse() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        arena.init_estimate(1 << 16, false, false);
        {
            let cached = arena.cached_allocator();
            for _ in 0..64 {
                cached.alloc(64, 8).unwrap();
            }
        }
        let before = arena.statistics(None);
        assert!(before.bytes_used > 0);
        arena.reset();
        let after = arena.statistics(None);
        assert_eq!(after.bytes_used, 0);
        assert_eq!(before.bytes_allocated_total(), after.bytes_allocated_total());
    }

    #[test]
    fn clear_releases_everything() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        arena.init_estimate(1 << 16, false, false);
        {
            let cached = arena.cached_allocator();
            cached.alloc(64, 8).unwrap();
        }
        arena.clear();
        let stats = arena.statistics(None);
        assert_eq!(stats.bytes_allocated_total(), 0);
    }

    #[test]
    fn share_and_unshare_round_trip() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        let handle = arena.share(vec![1u32, 2, 3]);
        let value: Vec<u32> = arena.unshare(handle);
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[test]
    fn used_and_wasted_bytes_flush_on_rebind_to_another_arena() {
        let arena_a = Arena::new(Arc::new(NullMonitor), false);
        let arena_b = Arena::new(Arc::new(NullMonitor), false);
        arena_a.init_estimate(1 << 16, false, false);
        arena_b.init_estimate(1 << 16, false, false);

        arena_a.cached_allocator().alloc(1, 1).unwrap();
        arena_a.cached_allocator().alloc(100, 64).unwrap();
        // Still bound to A: nothing has been flushed into its counters yet.
        assert_eq!(arena_a.used_bytes(), 0);
        assert_eq!(arena_b.used_bytes(), 0);

        // Binding to B rebinds this thread's pair away from A, flushing
        // A's accumulated bumper counters into its aggregate.
        let _ = arena_b.cached_allocator();

        assert!(arena_a.used_bytes() >= 101);
        assert!(arena_a.wasted_bytes() > 0);
        assert_eq!(arena_b.used_bytes(), 0);
    }

    #[test]
    fn cleanup_drops_slot_cache_without_freeing_blocks() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        arena.init_estimate(1 << 16, false, false);
        let cached = arena.cached_allocator();
        cached.alloc(64, 8).unwrap();
        let before = arena.statistics(None).bytes_allocated_total();
        arena.cleanup();
        assert_eq!(arena.statistics(None).bytes_allocated_total(), before);
    }

    #[test]
    fn special_alloc_reads_free_block_without_advancing_cursor() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        let mut donated = vec![0u8; 8192];
        let data = NonNull::new(donated.as_mut_ptr()).unwrap();
        assert!(arena.add_block(data, donated.len()));
        let ptr = arena.special_alloc(1024).unwrap();
        assert!(!ptr.is_null());
        assert_eq!(arena.statistics(Some((BlockSource::Shared, false))).bytes_used, 0);
    }

    #[test]
    fn alloc0_and_alloc1_are_independent_streams() {
        let arena = Arena::new(Arc::new(NullMonitor), false);
        // Large enough relative to the clamped default_block_size that
        // init_estimate's formula picks single_mode=false on its own.
        arena.init_estimate(8 << 20, false, false);
        let cached = arena.cached_allocator();
        let p0 = cached.alloc0(64, 8).unwrap();
        let p1 = cached.alloc1(64, 8).unwrap();
        assert_ne!(p0, p1);
    }
}
