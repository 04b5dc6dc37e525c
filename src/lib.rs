//! # bvh-arena
//!
//! A concurrent, block-based bump allocator used as the working-memory
//! arena for a parallel BVH (bounding volume hierarchy) builder.
//!
//! ## Overview
//!
//! The allocator serves the inner loop of a tree builder running on many
//! worker threads, each allocating millions of small, short-lived objects
//! (nodes, primitive records) whose lifetimes all end together at the end
//! of a build. It is a three-tier hierarchy:
//!
//! ```text
//!   per-thread bump pointer (ThreadBumper)
//!       -> per-thread-slot reserved block (Arena::slot_block)
//!           -> global block pool (Arena::used_blocks / free_blocks)
//! ```
//!
//! There is no general `free()`: individual objects can never be
//! released. Only a full-arena [`Arena::reset`] (for reuse across
//! builds) or [`Arena::clear`] (full teardown) is supported.
//!
//! ## Crate structure
//!
//! ```text
//!   bvh_arena
//!   ├── block    - Block: a contiguous bump-allocated region
//!   ├── bumper   - ThreadBumper: a thread-local slice consumer
//!   ├── pair     - ThreadPair/CachedAllocator: the per-thread handle
//!   ├── arena    - Arena: owns blocks, sizing policy, concurrency protocol
//!   ├── stats    - read-only statistics view over the block lists
//!   ├── host     - host-provided services (memory monitor, thread id)
//!   ├── os       - host-provided OS page allocator (mmap/VirtualAlloc)
//!   └── error    - AllocError
//! ```
//!
//! ## Quick start
//!
//! ```
//! use bvh_arena::{Arena, NullMonitor};
//! use std::sync::Arc;
//!
//! let arena = Arena::new(Arc::new(NullMonitor), false);
//! arena.init_estimate(1 << 20, false, false);
//!
//! let cached = arena.cached_allocator();
//! let ptr = cached.alloc(128, 16).unwrap();
//! assert_eq!(ptr as usize % 16, 0);
//!
//! arena.reset();
//! ```

mod arena;
mod block;
mod bumper;
mod error;
mod host;
mod os;
mod pair;
mod stats;

pub use arena::Arena;
pub use block::BlockSource;
pub use error::{AllocError, Result};
pub use host::{MemoryMonitor, NullMonitor};
pub use pair::CachedAllocator;
pub use stats::{AllStatistics, Statistics};

/// Maximum supported allocation alignment, in bytes.
pub const MAX_ALIGNMENT: usize = 64;

/// Maximum size of a single allocation request.
pub const MAX_ALLOCATION_SIZE: usize = 4 * 1024 * 1024 - MAX_ALIGNMENT;

/// Maximum number of per-thread contention-sharding slots.
pub const MAX_THREAD_USED_BLOCK_SLOTS: usize = 8;

/// Size of a huge (transparent huge page eligible) page hint.
pub const PAGE_SIZE_2M: usize = 2 * 1024 * 1024;
