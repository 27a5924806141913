//! Free-list allocator implementation.
//!
//! This module provides a general-purpose allocator for variable-sized
//! requests over a bounded region. Every block, free or allocated, is
//! prefixed by a block header; the free blocks are additionally linked
//! into a singly-linked list kept **sorted by address**, which lets
//! deallocation merge a freed block with its physical neighbors in O(1)
//! once the insertion point is found.
//!
//! # Algorithm
//!
//! - **Allocation**: walks the free list for a block that can hold the
//!   request plus its alignment padding, selected by the
//!   [`FitStrategy`] fixed at construction. The block is split when the
//!   remainder can hold another block, and the padding actually used is
//!   recorded so deallocation can find the header again.
//! - **Deallocation**: recovers the header from the padding count stored
//!   in the byte just before the returned address, reinserts the block at
//!   its address-ordered position, and coalesces with the left and right
//!   physical neighbors.
//!
//! # Memory Layout
//!
//! ```text
//! Block Layout:
//! ┌──────────────────────────────────────┬─────┬────────────────┐
//! │ BlockHeader                          │ pad │ payload        │
//! │ ┌──────────────┬───────────┬───┬───┐ │     │                │
//! │ │ payload_size │ next_free │ f │ p │ │     │                │
//! │ └──────────────┴───────────┴───┴───┘ │     │                │
//! └──────────────────────────────────────┴─────┴────────────────┘
//!                                              ▲
//!                                              └── address returned
//! ```
//!
//! Blocks tile the region exactly: the sum of `header + payload` over all
//! blocks equals the region size at every quiescent moment.
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(n) where n is the number of free blocks (first-fit
//!   is often O(1) amortized)
//! - **Deallocation**: O(n) for the sorted insert, O(1) merging
//! - **Memory Overhead**: one header per block, plus any alignment padding
//!
//! # Usage Example
//!
//! ```
//! use core::alloc::Layout;
//!
//! use region_alloc::{FitStrategy, FreeListAllocator, RegionAllocator as _};
//!
//! let mut allocator = FreeListAllocator::new(4096, FitStrategy::BestFit).unwrap();
//!
//! let layout = Layout::from_size_align(100, 8).unwrap();
//! if let Some(ptr) = allocator.allocate(layout) {
//!     // Use the allocated memory...
//!
//!     unsafe {
//!         allocator.deallocate(ptr);
//!     }
//! }
//! assert_eq!(allocator.used_size(), 0);
//! ```

use core::{alloc::Layout, ptr};

use align::{align_up, padding_for};
use snafu::ensure;

use crate::{CreateError, RegionAllocator, RegionTooSmallSnafu, region::Region};

/// Placement policy for selecting a free block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStrategy {
    /// First eligible block walking from the head of the free list. Fast,
    /// tends to concentrate fragmentation near the region start.
    FirstFit,
    /// Eligible block with the smallest payload, ties broken by address.
    /// Minimizes waste at the cost of a full walk (exact fits
    /// short-circuit).
    BestFit,
    /// Eligible block with the largest payload. Keeps mid-sized blocks
    /// available at the cost of carving up the big ones.
    WorstFit,
}

/// Metadata prefix of every block, free or allocated.
#[repr(C)]
struct BlockHeader {
    /// Bytes after the header available to the caller.
    payload_size: usize,
    /// Next free block in address order; meaningful only while free.
    next_free: *mut BlockHeader,
    /// Whether the block is on the free list.
    is_free: bool,
    /// Alignment padding used by the live allocation, zero while free.
    padding: u8,
}

const HEADER_SIZE: usize = size_of::<BlockHeader>();
const HEADER_ALIGN: usize = align_of::<BlockHeader>();
/// Smallest payload a block may carry, so a freed block always has room
/// for list linkage however it is later reused.
const MIN_PAYLOAD: usize = size_of::<*mut u8>();

const _: () = assert!(HEADER_SIZE % HEADER_ALIGN == 0);
const _: () = assert!(MIN_PAYLOAD % HEADER_ALIGN == 0);

impl BlockHeader {
    /// Address of the block's first payload byte.
    ///
    /// # Safety
    ///
    /// `block` must point to a live header inside the region.
    unsafe fn payload_start(block: *mut Self) -> *mut u8 {
        block.cast::<u8>().map_addr(|addr| addr + HEADER_SIZE)
    }

    /// One past the block's last byte.
    ///
    /// # Safety
    ///
    /// `block` must point to a live header inside the region.
    unsafe fn end(block: *mut Self) -> *mut u8 {
        unsafe { Self::payload_start(block).map_addr(|addr| addr + (*block).payload_size) }
    }
}

/// Padding plus payload bytes needed to serve a request from `block`.
///
/// # Safety
///
/// `block` must point to a live header inside the region.
unsafe fn required_bytes(block: *mut BlockHeader, size: usize, align: usize) -> usize {
    let data_start = unsafe { BlockHeader::payload_start(block) };
    padding_for(data_start.addr(), align) + size
}

/// A variable-size allocator over headered blocks with a configurable
/// placement policy.
///
/// # Thread Safety
///
/// The allocator is `Send` but not `Sync`; wrap it in a
/// [`LockedAllocator`](crate::sync::LockedAllocator) for concurrent use.
#[derive(Debug)]
pub struct FreeListAllocator {
    region: Region,
    used: usize,
    strategy: FitStrategy,
    free_head: *mut BlockHeader,
}

unsafe impl Send for FreeListAllocator {}

impl FreeListAllocator {
    /// Largest alignment `allocate` accepts.
    ///
    /// The padding actually used is recorded in a one-byte header field,
    /// which bounds the alignments the allocator can serve. Requests with
    /// a larger alignment return `None`.
    pub const MAX_ALIGN: usize = 128;

    /// Creates an allocator owning a fresh region of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot hold a block header, or the
    /// backing reservation fails.
    pub fn new(size: usize, strategy: FitStrategy) -> Result<Self, CreateError> {
        ensure!(
            size > HEADER_SIZE,
            RegionTooSmallSnafu {
                size,
                min: HEADER_SIZE + 1,
            }
        );
        let region = Region::reserve(size, HEADER_ALIGN)?;
        Ok(Self::with_region(region, strategy))
    }

    /// Creates an allocator over an externally supplied buffer.
    ///
    /// The base is aligned up inside the buffer for the block headers; the
    /// skipped bytes are never used. The buffer is never released by the
    /// allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the usable part of the buffer cannot hold a
    /// block header.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid for reads and writes for the
    /// lifetime of the allocator and must not be accessed through any
    /// other path while the allocator is live.
    pub unsafe fn from_raw(
        base: *mut u8,
        size: usize,
        strategy: FitStrategy,
    ) -> Result<Self, CreateError> {
        let aligned = align::align_ptr_up(base, HEADER_ALIGN);
        let usable = size.saturating_sub(aligned.addr() - base.addr());
        ensure!(
            usable > HEADER_SIZE,
            RegionTooSmallSnafu {
                size,
                min: HEADER_SIZE + 1,
            }
        );
        let region = unsafe { Region::from_raw(aligned, usable) };
        Ok(Self::with_region(region, strategy))
    }

    fn with_region(region: Region, strategy: FitStrategy) -> Self {
        let mut allocator = Self {
            region,
            used: 0,
            strategy,
            free_head: ptr::null_mut(),
        };
        allocator.init_free_block();
        allocator
    }

    /// Reinitializes the region as a single spanning free block.
    fn init_free_block(&mut self) {
        let head = self.region.base().cast::<BlockHeader>();
        // SAFETY: the region base is header-aligned and the region holds
        // at least one header.
        unsafe {
            head.write(BlockHeader {
                payload_size: self.region.size() - HEADER_SIZE,
                next_free: ptr::null_mut(),
                is_free: true,
                padding: 0,
            });
        }
        self.free_head = head;
        self.used = 0;
    }

    /// The placement policy fixed at construction.
    #[must_use]
    pub fn strategy(&self) -> FitStrategy {
        self.strategy
    }

    /// Number of blocks currently on the free list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.free_head;
        while !current.is_null() {
            count += 1;
            current = unsafe { (*current).next_free };
        }
        count
    }

    /// Payload size of the largest free block.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        let mut largest = 0;
        let mut current = self.free_head;
        while !current.is_null() {
            unsafe {
                largest = largest.max((*current).payload_size);
                current = (*current).next_free;
            }
        }
        largest
    }

    /// Walks the free list for a block serving `size` bytes at `align`.
    ///
    /// Returns the selected block and its list predecessor (null when the
    /// block is the head).
    fn find_block(&self, size: usize, align: usize) -> Option<(*mut BlockHeader, *mut BlockHeader)> {
        match self.strategy {
            FitStrategy::FirstFit => self.find_first_fit(size, align),
            FitStrategy::BestFit => self.find_best_fit(size, align),
            FitStrategy::WorstFit => self.find_worst_fit(size, align),
        }
    }

    fn find_first_fit(
        &self,
        size: usize,
        align: usize,
    ) -> Option<(*mut BlockHeader, *mut BlockHeader)> {
        let mut prev = ptr::null_mut();
        let mut current = self.free_head;
        while !current.is_null() {
            unsafe {
                if (*current).payload_size >= required_bytes(current, size, align) {
                    return Some((prev, current));
                }
                prev = current;
                current = (*current).next_free;
            }
        }
        None
    }

    fn find_best_fit(
        &self,
        size: usize,
        align: usize,
    ) -> Option<(*mut BlockHeader, *mut BlockHeader)> {
        let mut best = None;
        let mut smallest = usize::MAX;
        let mut prev = ptr::null_mut();
        let mut current = self.free_head;
        while !current.is_null() {
            unsafe {
                let required = required_bytes(current, size, align);
                let payload = (*current).payload_size;
                if payload >= required && payload < smallest {
                    best = Some((prev, current));
                    smallest = payload;
                    if payload == required {
                        break; // Exact fit
                    }
                }
                prev = current;
                current = (*current).next_free;
            }
        }
        best
    }

    fn find_worst_fit(
        &self,
        size: usize,
        align: usize,
    ) -> Option<(*mut BlockHeader, *mut BlockHeader)> {
        let mut worst = None;
        let mut largest = 0;
        let mut prev = ptr::null_mut();
        let mut current = self.free_head;
        while !current.is_null() {
            unsafe {
                let required = required_bytes(current, size, align);
                let payload = (*current).payload_size;
                if payload >= required && payload > largest {
                    worst = Some((prev, current));
                    largest = payload;
                }
                prev = current;
                current = (*current).next_free;
            }
        }
        worst
    }

    /// Carves the tail of `block` into a new free block linked right after
    /// it.
    ///
    /// # Safety
    ///
    /// `block` must be a free block with
    /// `payload_size >= required + HEADER_SIZE + MIN_PAYLOAD`, and
    /// `required` must be a multiple of the header alignment.
    unsafe fn split_block(block: *mut BlockHeader, required: usize) {
        unsafe {
            let remainder = (*block).payload_size - required - HEADER_SIZE;
            let new_block = BlockHeader::payload_start(block)
                .map_addr(|addr| addr + required)
                .cast::<BlockHeader>();
            new_block.write(BlockHeader {
                payload_size: remainder,
                next_free: (*block).next_free,
                is_free: true,
                padding: 0,
            });
            (*block).next_free = new_block;
            (*block).payload_size = required;
        }
    }

    /// Removes `block` from the free list given its list predecessor.
    ///
    /// # Safety
    ///
    /// `prev` must be null with `block` at the head, or a free block whose
    /// `next_free` is `block`.
    unsafe fn unlink(&mut self, prev: *mut BlockHeader, block: *mut BlockHeader) {
        unsafe {
            if prev.is_null() {
                debug_assert!(ptr::eq(self.free_head, block));
                self.free_head = (*block).next_free;
            } else {
                debug_assert!(ptr::eq((*prev).next_free, block));
                (*prev).next_free = (*block).next_free;
            }
            (*block).next_free = ptr::null_mut();
        }
    }

    /// Recovers the header of the block that produced `ptr`.
    ///
    /// The allocation path records the padding count in the byte just
    /// before the returned address, so the header sits
    /// `HEADER_SIZE + padding` bytes back, unambiguously.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator and
    /// not deallocated since.
    unsafe fn recover_header(&self, ptr: *mut u8) -> *mut BlockHeader {
        let pad = usize::from(unsafe { ptr.map_addr(|addr| addr - 1).read() });
        let block = ptr
            .map_addr(|addr| addr - HEADER_SIZE - pad)
            .cast::<BlockHeader>();
        debug_assert!(self.region.contains(block.cast()));
        unsafe {
            debug_assert_eq!(usize::from((*block).padding), pad, "corrupted block header");
            debug_assert!(!(*block).is_free, "double free detected");
        }
        block
    }

    /// Inserts `block` at its address-ordered position in the free list
    /// and merges it with physically adjacent neighbors.
    ///
    /// Keeping the list sorted makes physical adjacency visible as list
    /// adjacency, so after any deallocation no two adjacent blocks are
    /// both free.
    ///
    /// # Safety
    ///
    /// `block` must be a free block inside the region that is not already
    /// on the free list.
    unsafe fn insert_free_block(&mut self, block: *mut BlockHeader) {
        unsafe {
            let mut prev: *mut BlockHeader = ptr::null_mut();
            let mut current = self.free_head;
            while !current.is_null() && current < block {
                prev = current;
                current = (*current).next_free;
            }
            debug_assert!(!ptr::eq(current, block), "block already on the free list");

            (*block).next_free = current;
            if prev.is_null() {
                self.free_head = block;
            } else {
                (*prev).next_free = block;
            }

            // Merge with the right neighbor first so a left merge absorbs
            // the combined span.
            Self::merge_with_next(block);
            if !prev.is_null() {
                Self::merge_with_next(prev);
            }
        }
    }

    /// Merges `block` with its list successor when the two are physically
    /// adjacent.
    ///
    /// # Safety
    ///
    /// `block` must be a free block on the free list.
    unsafe fn merge_with_next(block: *mut BlockHeader) {
        unsafe {
            let next = (*block).next_free;
            if next.is_null() {
                return;
            }
            if ptr::eq(BlockHeader::end(block), next.cast()) {
                (*block).payload_size += HEADER_SIZE + (*next).payload_size;
                (*block).next_free = (*next).next_free;
            }
        }
    }
}

impl RegionAllocator for FreeListAllocator {
    fn allocate(&mut self, layout: Layout) -> Option<*mut u8> {
        if layout.size() == 0 || layout.align() > Self::MAX_ALIGN {
            return None;
        }
        // Keep every block header on an aligned address: the normalized
        // size is a multiple of the header alignment, and so is the
        // padding in front of any payload.
        let size = align_up(layout.size().max(MIN_PAYLOAD), HEADER_ALIGN);
        let align = layout.align();

        let (prev, block) = self.find_block(size, align)?;
        unsafe {
            let pad = padding_for(BlockHeader::payload_start(block).addr(), align);
            let required = pad + size;
            if (*block).payload_size >= required + HEADER_SIZE + MIN_PAYLOAD {
                Self::split_block(block, required);
            }
            self.unlink(prev, block);
            (*block).is_free = false;
            // pad < align <= MAX_ALIGN, so it fits the one-byte field.
            (*block).padding = pad as u8;
            self.used += HEADER_SIZE + (*block).payload_size;

            let data = BlockHeader::payload_start(block).map_addr(|addr| addr + pad);
            // Record the padding just before the returned address so
            // deallocation can find the header again.
            data.map_addr(|addr| addr - 1).write(pad as u8);
            Some(data)
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        debug_assert!(self.owns(ptr), "pointer does not belong to this allocator");
        unsafe {
            let block = self.recover_header(ptr);
            self.used -= HEADER_SIZE + (*block).payload_size;
            (*block).is_free = true;
            (*block).padding = 0;
            self.insert_free_block(block);
        }
    }

    fn reset(&mut self) {
        self.init_free_block();
    }

    fn owns(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr)
    }

    fn total_size(&self) -> usize {
        self.region.size()
    }

    fn used_size(&self) -> usize {
        self.used
    }
}
