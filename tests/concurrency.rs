use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use bvh_arena::{Arena, BlockSource, MemoryMonitor, NullMonitor};

struct CountingMonitor {
    bytes: AtomicIsize,
}

impl MemoryMonitor for CountingMonitor {
    fn memory_monitor(&self, delta_bytes: isize, _commit: bool) {
        self.bytes.fetch_add(delta_bytes, Ordering::Relaxed);
    }
}

#[test]
fn ten_thousand_single_thread_allocations_are_disjoint() {
    let arena = Arena::new(Arc::new(NullMonitor), false);
    arena.init_estimate(1 << 20, false, false);
    let cached = arena.cached_allocator();

    let mut seen = Vec::with_capacity(10_000);
    for i in 0..10_000 {
        let size = 8 + (i % 64);
        let ptr = cached.alloc(size, 8).unwrap();
        assert_eq!(ptr as usize % 8, 0);
        seen.push((ptr as usize, size));
    }
    seen.sort_unstable();
    for w in seen.windows(2) {
        let (prev_ptr, prev_size) = w[0];
        let (next_ptr, _) = w[1];
        assert!(next_ptr >= prev_ptr + prev_size, "overlapping allocations");
    }
}

#[test]
fn shared_block_is_dropped_from_the_pool_after_reset() {
    let arena = Arena::new(Arc::new(NullMonitor), false);
    arena.init_estimate(1 << 16, false, false);

    let mut donated = vec![0u8; 8192];
    let data = std::ptr::NonNull::new(donated.as_mut_ptr()).unwrap();
    assert!(arena.add_block(data, donated.len()));

    {
        let cached = arena.cached_allocator();
        cached.alloc(128, 16).unwrap();
    }

    let before = arena.statistics(Some((BlockSource::Shared, false)));
    assert!(before.bytes_allocated_total() > donated.len() - 64);
    assert!(before.bytes_allocated_total() <= donated.len());

    arena.reset();

    // Shared blocks don't survive a reset: the next allocation must
    // come from a freshly created block instead of the donated one.
    let after_shared = arena.statistics(Some((BlockSource::Shared, false)));
    assert_eq!(after_shared.bytes_allocated_total(), 0);

    let cached = arena.cached_allocator();
    cached.alloc(128, 16).unwrap();
    assert_eq!(arena.statistics(Some((BlockSource::Shared, false))).bytes_used, 0);
}

#[test]
fn allocation_over_the_limit_is_rejected() {
    let arena = Arena::new(Arc::new(NullMonitor), false);
    arena.init_estimate(1 << 16, false, false);
    let cached = arena.cached_allocator();

    let err = cached.alloc(5 * 1024 * 1024, 16).unwrap_err();
    match err {
        bvh_arena::AllocError::AllocationTooLarge { requested, max } => {
            assert_eq!(requested, 5 * 1024 * 1024);
            assert_eq!(max, bvh_arena::MAX_ALLOCATION_SIZE);
        }
        other => panic!("expected AllocationTooLarge, got {:?}", other),
    }
}

#[test]
fn large_allocation_gets_a_dedicated_block() {
    let monitor = Arc::new(CountingMonitor { bytes: AtomicIsize::new(0) });
    let arena = Arena::new(monitor.clone(), false);
    arena.init_estimate(1 << 16, false, false);
    let cached = arena.cached_allocator();

    // well above the bumper's growth-step bypass threshold, but within
    // the single-allocation cap
    let big = bvh_arena::MAX_ALLOCATION_SIZE - 4096;
    let ptr = cached.alloc(big, 64).unwrap();
    assert_eq!(ptr as usize % 64, 0);

    let stats = arena.statistics(Some((BlockSource::OSMapped, false)));
    assert!(stats.bytes_used >= big || arena.statistics(Some((BlockSource::OSMapped, true))).bytes_used >= big);
    assert!(monitor.bytes.load(Ordering::Relaxed) as usize >= big);
}

#[test]
fn clear_reports_a_negative_delta_matching_prior_commits() {
    let monitor = Arc::new(CountingMonitor { bytes: AtomicIsize::new(0) });
    let arena = Arena::new(monitor.clone(), false);
    arena.init_estimate(1 << 16, false, false);
    {
        let cached = arena.cached_allocator();
        for _ in 0..64 {
            cached.alloc(64, 8).unwrap();
        }
    }
    assert!(monitor.bytes.load(Ordering::Relaxed) > 0);
    arena.clear();
    assert_eq!(monitor.bytes.load(Ordering::Relaxed), 0);
}

#[test]
fn eight_threads_allocating_concurrently_never_collide() {
    let arena = Arc::new(Arena::new(Arc::new(NullMonitor), false));
    arena.init_estimate(64 << 20, false, false);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let arena = Arc::clone(&arena);
            scope.spawn(move || {
                let cached = arena.cached_allocator();
                let mut last: Option<usize> = None;
                for _ in 0..100_000 {
                    let ptr = cached.alloc(16, 8).unwrap() as usize;
                    if let Some(prev) = last {
                        assert_ne!(prev, ptr);
                    }
                    last = Some(ptr);
                }
            });
        }
    });

    let stats = arena.statistics(None);
    assert!(stats.bytes_used >= 8 * 100_000 * 16);
}

#[test]
fn thread_rebinds_when_moving_between_arenas() {
    let arena_a = Arena::new(Arc::new(NullMonitor), false);
    let arena_b = Arena::new(Arc::new(NullMonitor), false);
    arena_a.init_estimate(1 << 16, false, false);
    arena_b.init_estimate(1 << 16, false, false);

    let p1 = arena_a.cached_allocator().alloc(64, 8).unwrap();
    let p2 = arena_b.cached_allocator().alloc(64, 8).unwrap();
    let p3 = arena_a.cached_allocator().alloc(64, 8).unwrap();

    assert_ne!(p1, p2);
    assert_ne!(p2, p3);
    assert!(arena_a.statistics(None).bytes_used >= 128);
    assert!(arena_b.statistics(None).bytes_used >= 64);
}
