//! Mutex-serialized wrapper around any region allocator.
//!
//! The engines in this crate are `Send` but not `Sync`: every operation,
//! queries included, mutates or reads state without fences. This module
//! provides the one concurrency-safe abstraction, a wrapper that funnels
//! every call through a single spin mutex. Ordering of operations from
//! distinct threads is arbitrary but serialized; no finer-grained locking
//! is attempted.
//!
//! The wrapper also implements [`GlobalAlloc`], so any engine can back
//! `#[global_allocator]` the same way a kernel heap sits behind a spin
//! mutex.
//!
//! # Usage Example
//!
//! ```
//! use core::alloc::Layout;
//!
//! use region_alloc::{LockedAllocator, PoolAllocator};
//!
//! let pool = LockedAllocator::new(PoolAllocator::new(64, 32, 16).unwrap());
//!
//! // `&LockedAllocator` is shareable across threads.
//! let layout = Layout::from_size_align(64, 16).unwrap();
//! if let Some(ptr) = pool.allocate(layout) {
//!     unsafe {
//!         pool.deallocate(ptr);
//!     }
//! }
//! ```

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use spin::{Mutex, MutexGuard};

use crate::RegionAllocator;

/// Serializes every operation on the wrapped allocator behind a spin
/// mutex.
///
/// The wrapper itself never allocates; it exists solely to turn a
/// non-thread-safe allocator into a thread-safe one with coarse
/// granularity. It is `Sync` whenever the wrapped allocator is `Send`.
#[derive(Debug)]
pub struct LockedAllocator<A> {
    inner: Mutex<A>,
}

impl<A: RegionAllocator> LockedAllocator<A> {
    /// Wraps `inner`, taking ownership of it.
    pub const fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Serialized [`RegionAllocator::allocate`].
    pub fn allocate(&self, layout: Layout) -> Option<*mut u8> {
        self.inner.lock().allocate(layout)
    }

    /// Serialized [`RegionAllocator::deallocate`].
    ///
    /// # Safety
    ///
    /// Same contract as [`RegionAllocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        unsafe { self.inner.lock().deallocate(ptr) }
    }

    /// Serialized [`RegionAllocator::reset`].
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Serialized [`RegionAllocator::owns`].
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.inner.lock().owns(ptr)
    }

    /// Serialized [`RegionAllocator::total_size`].
    pub fn total_size(&self) -> usize {
        self.inner.lock().total_size()
    }

    /// Serialized [`RegionAllocator::used_size`].
    pub fn used_size(&self) -> usize {
        self.inner.lock().used_size()
    }

    /// Locks the wrapped allocator for a multi-call sequence.
    ///
    /// This is the escape hatch for callers with external synchronization
    /// needs, such as taking a marker and rolling back atomically. Using
    /// the guard concurrently with the serialized methods simply queues on
    /// the same lock; bypassing the wrapper entirely is not possible.
    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }

    /// Unwraps the allocator.
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}

/// Lets a locked engine back `#[global_allocator]`.
///
/// `alloc` forwards to the serialized allocator and reports exhaustion as
/// a null pointer, per the `GlobalAlloc` contract. The caller must pick an
/// engine that honors the layouts it will see: the pool allocator, for
/// instance, serves every request from same-sized chunks.
unsafe impl<A: RegionAllocator + Send> GlobalAlloc for LockedAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner.lock().allocate(layout).unwrap_or(ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.inner.lock().deallocate(ptr) }
    }
}
