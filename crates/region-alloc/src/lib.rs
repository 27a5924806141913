//! Region-based memory allocators for hot paths with known allocation
//! shapes.
//!
//! Each allocator in this crate manages a single contiguous byte region,
//! obtained once at construction (or borrowed from the caller) and never
//! grown. Sub-regions of it are handed out according to the discipline the
//! caller picked, replacing the general-purpose heap where the allocation
//! pattern is known in advance.
//!
//! # Available Allocators
//!
//! ## [`LinearAllocator`](linear::LinearAllocator)
//!
//! A bump-pointer region with marker-based partial rollback. Best suited
//! for:
//!
//! - Per-frame or per-request scratch data freed in bulk
//! - Nested scopes that unwind in LIFO order
//!
//! **Performance**: O(1) allocation, O(1) rollback and reset. Individual
//! deallocation is unsupported by design.
//!
//! ## [`PoolAllocator`](pool::PoolAllocator)
//!
//! A fixed-size chunk region with an intrusive free list threaded through
//! the free chunks themselves. Best suited for:
//!
//! - Uniformly sized entities allocated and freed at high frequency
//! - Workloads that cannot tolerate fragmentation
//!
//! **Performance**: O(1) allocation and deallocation, zero per-chunk
//! metadata overhead.
//!
//! ## [`FreeListAllocator`](free_list::FreeListAllocator)
//!
//! A variable-size region with headered blocks, a configurable placement
//! policy (first-fit, best-fit, worst-fit), splitting on allocate and
//! coalescing on deallocate. Best suited for:
//!
//! - Variable-sized allocations over a bounded region
//! - General-purpose subsystem heaps
//!
//! **Performance**: O(n) allocation where n is the number of free blocks,
//! O(n) deallocation dominated by the sorted free-list insert.
//!
//! # Usage Example
//!
//! ```
//! use core::alloc::Layout;
//!
//! use region_alloc::{FitStrategy, FreeListAllocator, RegionAllocator as _};
//!
//! let mut allocator = FreeListAllocator::new(4096, FitStrategy::FirstFit).unwrap();
//!
//! let layout = Layout::from_size_align(64, 8).unwrap();
//! if let Some(ptr) = allocator.allocate(layout) {
//!     // Use the allocated memory...
//!
//!     unsafe {
//!         allocator.deallocate(ptr);
//!     }
//! }
//! ```
//!
//! # Design Considerations
//!
//! ## Memory Safety
//!
//! Deallocation requires `unsafe` code: the caller must pass back a pointer
//! obtained from the same allocator instance, at most once. Double frees
//! and foreign pointers are diagnosed with debug assertions where the
//! allocator can detect them; in release builds they are undefined
//! behavior.
//!
//! ## Thread Safety
//!
//! The allocators are `Send` but not `Sync`. Wrap them in a
//! [`LockedAllocator`](sync::LockedAllocator) for concurrent use; queries
//! such as [`used_size`](RegionAllocator::used_size) are not safe to run
//! concurrently with mutation either, because the fields they observe are
//! updated without fences.
//!
//! ## Failure Model
//!
//! Exhaustion and no-fit conditions are reported by returning `None` and
//! leave the allocator fully usable. Invalid construction parameters are
//! reported through [`CreateError`]. Zero-sized requests return `None` and
//! are not an error.

#![cfg_attr(not(test), no_std)]
#![feature(allocator_api)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

use core::alloc::Layout;

use snafu::{Location, Snafu};

pub mod binding;
pub mod free_list;
pub mod linear;
pub mod pool;
mod region;
pub mod sync;

pub use self::{
    binding::BindingAllocator,
    free_list::{FitStrategy, FreeListAllocator},
    linear::{LinearAllocator, Marker},
    pool::PoolAllocator,
    sync::LockedAllocator,
};

/// Errors reported when constructing an allocator.
///
/// Allocation itself never produces an error value; exhaustion is reported
/// by [`RegionAllocator::allocate`] returning `None`.
#[derive(Debug, Snafu)]
pub enum CreateError {
    /// A region of zero bytes (or zero chunks) was requested.
    #[snafu(display("region size must be non-zero"))]
    ZeroSize {
        #[snafu(implicit)]
        location: Location,
    },
    /// The requested alignment is not a power of two.
    #[snafu(display("alignment {align} is not a power of two"))]
    InvalidAlignment {
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The region cannot hold the allocator's minimum bookkeeping.
    #[snafu(display("region of {size} bytes cannot hold the minimum of {min} bytes"))]
    RegionTooSmall {
        size: usize,
        min: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The backing heap refused the reservation.
    #[snafu(display("backing reservation of {size} bytes (alignment {align}) failed"))]
    ReserveFailed {
        size: usize,
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Common capability implemented by every region allocator.
///
/// The trait is object-safe: callers either hold a concrete allocator
/// (static dispatch, no indirection) or a `&mut dyn RegionAllocator`
/// (dynamic dispatch, one indirection per call). Both forms are supported.
pub trait RegionAllocator {
    /// Allocates `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// Returns `None` when the region cannot satisfy the request or the
    /// request is zero-sized. A `None` leaves the allocator unchanged and
    /// fully usable.
    fn allocate(&mut self, layout: Layout) -> Option<*mut u8>;

    /// Returns an allocation to the allocator.
    ///
    /// A null `ptr` is ignored. Allocators that only support bulk
    /// deallocation treat this as a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from `allocate` on this
    /// allocator instance that has not been deallocated since, and the
    /// allocation must no longer be in use.
    unsafe fn deallocate(&mut self, ptr: *mut u8);

    /// Returns the allocator to its just-constructed state without
    /// releasing the region.
    ///
    /// Every outstanding allocation is invalidated.
    fn reset(&mut self);

    /// Returns `true` if `ptr` lies within the allocator's region.
    fn owns(&self, ptr: *const u8) -> bool;

    /// Total bytes of backing memory managed by this allocator.
    fn total_size(&self) -> usize;

    /// Bytes currently allocated, including any bookkeeping the allocator
    /// accounts against the caller.
    fn used_size(&self) -> usize;
}
