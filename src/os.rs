//! Host-provided page allocator.
//!
//! Mirrors the teacher crate's `os.rs`: the aligned-heap path goes
//! through the process allocator (so it composes with whatever global
//! allocator the host installed), the OS-mapped path goes straight to
//! `mmap`/`VirtualAlloc` for blocks large enough to be worth their own
//! virtual memory mapping, and huge-page hints are best-effort and
//! logged, never fatal.

use std::alloc::{self, Layout};
use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

use log::warn;

use crate::PAGE_SIZE_2M;

/// Host page size, queried once and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            let result = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if result > 0 {
                return result as usize;
            }
        }
        4096
    })
}

fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Allocates `bytes` from the process heap, aligned to `align`.
///
/// Used for blocks small enough that mapping their own virtual memory
/// region would risk fragmenting the address space (see
/// `vm.max_map_count` under Linux, referenced in the spec's rationale
/// for downgrading small `OSMapped` requests to `AlignedHeap`).
pub fn aligned_heap_alloc(bytes: usize, align: usize) -> io::Result<NonNull<u8>> {
    let layout = Layout::from_size_align(bytes, align)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let ptr = unsafe { alloc::alloc(layout) };
    NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

/// Frees memory previously returned by [`aligned_heap_alloc`]. The
/// caller must pass the exact `(bytes, align)` used at allocation time.
///
/// # Safety
/// `ptr` must have been returned by a prior call to
/// [`aligned_heap_alloc`] with the same `bytes`/`align`, and must not
/// have been freed already.
pub unsafe fn aligned_heap_free(ptr: NonNull<u8>, bytes: usize, align: usize) {
    let layout = Layout::from_size_align_unchecked(bytes, align);
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
}

/// Requests an anonymous mapping of `bytes`, returning whether the OS
/// backed it with huge pages.
#[cfg(unix)]
pub fn os_map(bytes: usize) -> io::Result<(NonNull<u8>, bool)> {
    let bytes = align_up(bytes, page_size());
    unsafe {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        #[cfg(target_os = "linux")]
        {
            if bytes >= PAGE_SIZE_2M {
                let _ = libc::madvise(ptr, bytes, libc::MADV_HUGEPAGE);
            }
        }
        Ok((NonNull::new_unchecked(ptr as *mut u8), false))
    }
}

#[cfg(windows)]
pub fn os_map(bytes: usize) -> io::Result<(NonNull<u8>, bool)> {
    use winapi::um::memoryapi::VirtualAlloc;
    use winapi::um::winnt::{MEM_COMMIT, MEM_LARGE_PAGES, MEM_RESERVE, PAGE_READWRITE};

    let bytes = align_up(bytes, page_size());
    unsafe {
        let mut huge_pages = false;
        let mut ptr = std::ptr::null_mut();
        if bytes >= PAGE_SIZE_2M {
            ptr = VirtualAlloc(
                std::ptr::null_mut(),
                bytes,
                MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
                PAGE_READWRITE,
            );
            huge_pages = !ptr.is_null();
        }
        if ptr.is_null() {
            ptr = VirtualAlloc(
                std::ptr::null_mut(),
                bytes,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            );
        }
        NonNull::new(ptr as *mut u8)
            .map(|p| (p, huge_pages))
            .ok_or_else(io::Error::last_os_error)
    }
}

/// Returns a mapping created by [`os_map`] back to the OS.
///
/// # Safety
/// `ptr`/`bytes` must match a prior [`os_map`] call exactly.
#[cfg(unix)]
pub unsafe fn os_unmap(ptr: NonNull<u8>, bytes: usize, _huge_pages: bool) {
    let bytes = align_up(bytes, page_size());
    if unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, bytes) } != 0 {
        warn!(
            "munmap failed: {}, addr {:p}, size {}",
            errno::errno(),
            ptr.as_ptr(),
            bytes
        );
    }
}

#[cfg(windows)]
pub unsafe fn os_unmap(ptr: NonNull<u8>, _bytes: usize, _huge_pages: bool) {
    use winapi::shared::minwindef::LPVOID;
    use winapi::um::memoryapi::VirtualFree;
    use winapi::um::winnt::MEM_RELEASE;

    if VirtualFree(ptr.as_ptr() as LPVOID, 0, MEM_RELEASE) == 0 {
        warn!("VirtualFree failed for {:p}", ptr.as_ptr());
    }
}

/// Hints that `bytes` starting at `addr` should be backed by
/// transparent huge pages. Best effort: failure is logged, never fatal,
/// since the block is already perfectly usable as regular pages.
#[cfg(all(unix, target_os = "linux"))]
pub fn os_advise(addr: *mut u8, bytes: usize) {
    let err = unsafe { libc::madvise(addr as *mut libc::c_void, bytes, libc::MADV_HUGEPAGE) };
    if err != 0 {
        warn!(
            "madvise(MADV_HUGEPAGE) hint failed: {}, addr {:p}, size {}",
            errno::errno(),
            addr,
            bytes
        );
    }
}

#[cfg(not(all(unix, target_os = "linux")))]
pub fn os_advise(_addr: *mut u8, _bytes: usize) {}
