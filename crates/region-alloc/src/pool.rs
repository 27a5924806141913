//! Pool allocator implementation.
//!
//! This module provides a fixed-size chunk allocator. The region is split
//! into `chunk_count` chunks of `chunk_size` bytes, and the free chunks are
//! threaded into an intrusive singly-linked list: the first pointer-sized
//! bytes of a free chunk hold the address of the next free chunk, and the
//! same bytes carry caller data while the chunk is allocated.
//!
//! # Memory Layout
//!
//! ```text
//! free_head ──┐
//!             ▼
//! ┌─────────┬─────────┬─────────┬─────────┐
//! │ next ───┼▶in use  │ next ───┼▶null    │
//! │  ...    │ (data)  │  ...    │  ...    │
//! └─────────┴─────────┴─────────┴─────────┘
//!   chunk 0   chunk 1   chunk 2   chunk 3
//! ```
//!
//! No chunk carries a header: metadata lives in unused chunks only, so the
//! useful-byte ratio of an allocated chunk is 100%, and fragmentation is
//! impossible because every chunk is interchangeable.
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(1), pop the free-list head
//! - **Deallocation**: O(1), push onto the free-list head
//! - **Reset**: O(n), rethreads the list over every chunk
//!
//! # Usage Example
//!
//! ```
//! use core::alloc::Layout;
//!
//! use region_alloc::{PoolAllocator, RegionAllocator as _};
//!
//! let mut pool = PoolAllocator::new(64, 32, 16).unwrap();
//!
//! let layout = Layout::from_size_align(48, 16).unwrap();
//! if let Some(ptr) = pool.allocate(layout) {
//!     // Use the chunk...
//!
//!     unsafe {
//!         pool.deallocate(ptr);
//!     }
//! }
//! ```

use core::{alloc::Layout, ptr};

use align::align_up;
use snafu::ensure;

use crate::{
    CreateError, InvalidAlignmentSnafu, RegionAllocator, RegionTooSmallSnafu, ReserveFailedSnafu,
    ZeroSizeSnafu, region::Region,
};

/// Rounds the requested chunk size up so every chunk can hold a free-list
/// pointer and starts on an `align` boundary.
///
/// The alignment itself is floored at pointer alignment: the intrusive
/// next-pointer is stored with aligned writes, so chunks must sit on
/// pointer boundaries regardless of what the caller asked for.
fn effective_layout(chunk_size: usize, align: usize) -> (usize, usize) {
    let align = align.max(align_of::<*mut u8>());
    let chunk_size = align_up(chunk_size.max(size_of::<*mut u8>()), align);
    (chunk_size, align)
}

/// A fixed-size chunk allocator with an intrusive free list.
///
/// Both `allocate` and `deallocate` are O(1). The layout passed to
/// [`allocate`](RegionAllocator::allocate) is ignored apart from the
/// zero-size check: every chunk has the size and alignment fixed at
/// construction.
///
/// # Thread Safety
///
/// The allocator is `Send` but not `Sync`; wrap it in a
/// [`LockedAllocator`](crate::sync::LockedAllocator) for concurrent use.
pub struct PoolAllocator {
    region: Region,
    chunk_size: usize,
    chunk_count: usize,
    free_count: usize,
    free_head: *mut u8,
}

unsafe impl Send for PoolAllocator {}

impl PoolAllocator {
    /// Creates a pool owning a fresh region of `chunk_count` chunks.
    ///
    /// The effective chunk size is `chunk_size` rounded up to hold a
    /// pointer and to the chunk alignment; query it with
    /// [`chunk_size`](Self::chunk_size).
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_count` is zero, `align` is not a power
    /// of two, or the backing reservation fails.
    pub fn new(chunk_size: usize, chunk_count: usize, align: usize) -> Result<Self, CreateError> {
        ensure!(align::is_power_of_two(align), InvalidAlignmentSnafu { align });
        ensure!(chunk_count != 0, ZeroSizeSnafu);
        let (chunk_size, align) = effective_layout(chunk_size, align);
        let Some(total) = chunk_size.checked_mul(chunk_count) else {
            return ReserveFailedSnafu {
                size: usize::MAX,
                align,
            }
            .fail();
        };
        let region = Region::reserve(total, align)?;
        let mut pool = Self {
            region,
            chunk_size,
            chunk_count,
            free_count: chunk_count,
            free_head: ptr::null_mut(),
        };
        pool.thread_free_list();
        Ok(pool)
    }

    /// Creates a pool over an externally supplied buffer.
    ///
    /// The base is aligned up inside the buffer and the chunk count is
    /// derived from the usable length; trailing bytes that do not fit a
    /// whole chunk are ignored. The buffer is never released by the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `align` is not a power of two or the usable
    /// part of the buffer cannot hold a single chunk.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid for reads and writes for the
    /// lifetime of the pool and must not be accessed through any other
    /// path while the pool is live.
    pub unsafe fn from_raw(
        base: *mut u8,
        size: usize,
        chunk_size: usize,
        align: usize,
    ) -> Result<Self, CreateError> {
        ensure!(align::is_power_of_two(align), InvalidAlignmentSnafu { align });
        let (chunk_size, align) = effective_layout(chunk_size, align);
        let aligned = align::align_ptr_up(base, align);
        let usable = size.saturating_sub(aligned.addr() - base.addr());
        let chunk_count = usable / chunk_size;
        ensure!(
            chunk_count != 0,
            RegionTooSmallSnafu {
                size,
                min: chunk_size,
            }
        );
        let region = unsafe { Region::from_raw(aligned, chunk_count * chunk_size) };
        let mut pool = Self {
            region,
            chunk_size,
            chunk_count,
            free_count: chunk_count,
            free_head: ptr::null_mut(),
        };
        pool.thread_free_list();
        Ok(pool)
    }

    /// Rebuilds the intrusive free list over every chunk in address order.
    fn thread_free_list(&mut self) {
        let base = self.region.base();
        debug_assert!(align::is_aligned_to(base, align_of::<*mut u8>()));
        for index in 0..self.chunk_count - 1 {
            let chunk = base.map_addr(|addr| addr + index * self.chunk_size);
            let next = chunk.map_addr(|addr| addr + self.chunk_size);
            // SAFETY: every chunk is in-region, pointer-aligned, and large
            // enough to hold the next-chunk address.
            unsafe {
                chunk.cast::<*mut u8>().write(next);
            }
        }
        let last = base.map_addr(|addr| addr + (self.chunk_count - 1) * self.chunk_size);
        unsafe {
            last.cast::<*mut u8>().write(ptr::null_mut());
        }
        self.free_head = base;
        self.free_count = self.chunk_count;
    }

    /// Size of each chunk in bytes, after rounding.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks in the pool.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Number of chunks currently available.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_count
    }
}

impl RegionAllocator for PoolAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<*mut u8> {
        if layout.size() == 0 {
            return None;
        }
        debug_assert!(
            layout.size() <= self.chunk_size,
            "request exceeds the chunk size"
        );
        if self.free_head.is_null() {
            return None;
        }
        let chunk = self.free_head;
        // SAFETY: a free chunk stores the next free chunk's address in its
        // first pointer-sized bytes.
        self.free_head = unsafe { chunk.cast::<*mut u8>().read() };
        self.free_count -= 1;
        Some(chunk)
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(self.owns(ptr), "pointer does not belong to this pool");
        // SAFETY: the chunk is no longer in use, so its first bytes are
        // free to carry the list link again.
        unsafe {
            ptr.cast::<*mut u8>().write(self.free_head);
        }
        self.free_head = ptr;
        self.free_count += 1;
    }

    fn reset(&mut self) {
        self.thread_free_list();
    }

    fn owns(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr)
            && (ptr.addr() - self.region.base().addr()).is_multiple_of(self.chunk_size)
    }

    fn total_size(&self) -> usize {
        self.region.size()
    }

    fn used_size(&self) -> usize {
        (self.chunk_count - self.free_count) * self.chunk_size
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn any_layout() -> Layout {
        Layout::from_size_align(1, 1).unwrap()
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let mut pool = PoolAllocator::new(64, 3, 8).unwrap();
        assert_eq!(pool.free_count(), 3);

        let a = pool.allocate(any_layout()).unwrap();
        assert_eq!(pool.free_count(), 2);
        let b = pool.allocate(any_layout()).unwrap();
        assert_eq!(pool.free_count(), 1);
        let c = pool.allocate(any_layout()).unwrap();
        assert_eq!(pool.free_count(), 0);

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);

        assert!(pool.allocate(any_layout()).is_none());
        assert_eq!(pool.free_count(), 0);

        unsafe {
            pool.deallocate(b);
        }
        assert_eq!(pool.free_count(), 1);

        let reused = pool.allocate(any_layout()).unwrap();
        assert_eq!(reused, b);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_chunks_come_out_in_address_order() {
        let mut pool = PoolAllocator::new(32, 4, 8).unwrap();
        let first = pool.allocate(any_layout()).unwrap();
        let second = pool.allocate(any_layout()).unwrap();
        let third = pool.allocate(any_layout()).unwrap();
        assert_eq!(second.addr() - first.addr(), pool.chunk_size());
        assert_eq!(third.addr() - second.addr(), pool.chunk_size());
    }

    #[test]
    fn test_chunk_size_rounding() {
        // A one-byte request still yields pointer-sized chunks.
        let pool = PoolAllocator::new(1, 4, 1).unwrap();
        assert_eq!(pool.chunk_size(), size_of::<*mut u8>());

        // Alignment dominates when it is larger than the request.
        let pool = PoolAllocator::new(24, 4, 32).unwrap();
        assert_eq!(pool.chunk_size(), 32);
        assert_eq!(pool.total_size(), 128);
    }

    #[test]
    fn test_chunk_alignment() {
        let mut pool = PoolAllocator::new(48, 8, 64).unwrap();
        while let Some(ptr) = pool.allocate(any_layout()) {
            assert_eq!(ptr.addr() % 64, 0);
        }
    }

    #[test]
    fn test_zero_size_returns_none() {
        let mut pool = PoolAllocator::new(64, 2, 8).unwrap();
        let layout = Layout::from_size_align(0, 1).unwrap();
        assert!(pool.allocate(layout).is_none());
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_owns_requires_chunk_boundary() {
        let mut pool = PoolAllocator::new(64, 2, 8).unwrap();
        let ptr = pool.allocate(any_layout()).unwrap();
        assert!(pool.owns(ptr));
        // Addresses interior to a chunk do not qualify.
        assert!(!pool.owns(ptr.map_addr(|a| a + 1).cast_const()));
        assert!(!pool.owns(core::ptr::null()));
    }

    #[test]
    fn test_used_size_accounting() {
        let mut pool = PoolAllocator::new(64, 4, 8).unwrap();
        assert_eq!(pool.used_size(), 0);
        let a = pool.allocate(any_layout()).unwrap();
        let _b = pool.allocate(any_layout()).unwrap();
        assert_eq!(pool.used_size(), 2 * pool.chunk_size());
        unsafe {
            pool.deallocate(a);
        }
        assert_eq!(pool.used_size(), pool.chunk_size());
        assert_eq!(pool.total_size(), 4 * pool.chunk_size());
    }

    #[test]
    fn test_null_deallocate_is_noop() {
        let mut pool = PoolAllocator::new(64, 2, 8).unwrap();
        unsafe {
            pool.deallocate(core::ptr::null_mut());
        }
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_reset_restores_every_chunk() {
        let mut pool = PoolAllocator::new(64, 3, 8).unwrap();
        while pool.allocate(any_layout()).is_some() {}
        assert_eq!(pool.free_count(), 0);

        pool.reset();
        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.used_size(), 0);

        // Post-reset behavior matches post-construction behavior: chunks
        // come out in address order again.
        let first = pool.allocate(any_layout()).unwrap();
        let second = pool.allocate(any_layout()).unwrap();
        assert_eq!(second.addr() - first.addr(), pool.chunk_size());
    }

    #[test]
    fn test_chunks_are_disjoint_and_usable() {
        let mut pool = PoolAllocator::new(16, 4, 8).unwrap();
        let chunk_size = pool.chunk_size();
        let mut chunks = Vec::new();
        while let Some(ptr) = pool.allocate(any_layout()) {
            chunks.push(ptr);
        }
        for (index, ptr) in chunks.iter().enumerate() {
            unsafe {
                ptr.write_bytes(index as u8 + 1, chunk_size);
            }
        }
        for (index, ptr) in chunks.iter().enumerate() {
            for offset in 0..chunk_size {
                unsafe {
                    assert_eq!(ptr.add(offset).read(), index as u8 + 1);
                }
            }
        }
    }

    #[test]
    fn test_fill_pattern() {
        let mut pool = PoolAllocator::new(64, 2, 8).unwrap();
        let ptr = pool.allocate(any_layout()).unwrap();
        unsafe {
            ptr.write_bytes(0xAB, pool.chunk_size());
            for offset in 0..pool.chunk_size() {
                assert_eq!(ptr.add(offset).read(), 0xAB);
            }
        }
    }

    #[test]
    fn test_borrowed_misaligned_buffer() {
        let mut buffer = vec![0_u8; 1024];
        // Deliberately misalign the start of the usable span.
        let base = unsafe { buffer.as_mut_ptr().add(1) };
        let mut pool = unsafe { PoolAllocator::from_raw(base, 1023, 64, 16) }.unwrap();

        assert!(pool.chunk_count() > 0);
        let ptr = pool.allocate(any_layout()).unwrap();
        assert_eq!(ptr.addr() % 16, 0);
        assert!(pool.owns(ptr));
    }

    #[test]
    fn test_borrowed_buffer_too_small() {
        let mut buffer = [0_u8; 8];
        let result = unsafe { PoolAllocator::from_raw(buffer.as_mut_ptr(), 8, 64, 8) };
        assert!(matches!(result, Err(CreateError::RegionTooSmall { .. })));
    }

    #[test]
    fn test_zero_chunks_rejected() {
        assert!(matches!(
            PoolAllocator::new(64, 0, 8),
            Err(CreateError::ZeroSize { .. })
        ));
    }
}
