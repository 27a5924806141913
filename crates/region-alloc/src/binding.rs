//! Container-binding shim for the standard allocation protocol.
//!
//! Rust's collection types take their memory through the
//! [`core::alloc::Allocator`] trait. This module adapts a
//! [`LockedAllocator`] to that protocol so `Vec`, `Box` and friends can
//! draw from a region instead of the global heap.
//!
//! The handle is a plain reference and therefore `Copy`; cloning a
//! container clones the handle, not the region. Exhaustion is reported as
//! [`AllocError`], the out-of-memory signal container machinery expects,
//! rather than the `None` used inside the crate. Element typing and
//! layout arithmetic are supplied by the containers themselves: the
//! allocation protocol is untyped, so one handle serves any element type
//! sharing the region.
//!
//! # Usage Example
//!
//! ```
//! #![feature(allocator_api)]
//!
//! use region_alloc::{BindingAllocator, FitStrategy, FreeListAllocator, LockedAllocator};
//!
//! let region = LockedAllocator::new(FreeListAllocator::new(4096, FitStrategy::FirstFit).unwrap());
//! let binding = BindingAllocator::new(&region);
//!
//! let mut numbers: Vec<u32, _> = Vec::new_in(binding);
//! numbers.extend([1, 2, 3]);
//! assert_eq!(numbers.iter().sum::<u32>(), 6);
//! ```

use core::{
    alloc::{AllocError, Allocator, Layout},
    ptr::{self, NonNull},
};

use crate::{RegionAllocator, sync::LockedAllocator};

/// [`Allocator`] handle backed by a [`LockedAllocator`].
///
/// Two handles compare equal exactly when they share the underlying
/// wrapper, which is the condition under which memory allocated through
/// one may be deallocated through the other.
#[derive(Debug)]
pub struct BindingAllocator<'a, A> {
    inner: &'a LockedAllocator<A>,
}

impl<'a, A> BindingAllocator<'a, A> {
    /// Creates a handle drawing from `inner`.
    #[must_use]
    pub const fn new(inner: &'a LockedAllocator<A>) -> Self {
        Self { inner }
    }
}

impl<A> Clone for BindingAllocator<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for BindingAllocator<'_, A> {}

impl<A> PartialEq for BindingAllocator<'_, A> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.inner, other.inner)
    }
}

impl<A> Eq for BindingAllocator<'_, A> {}

unsafe impl<A: RegionAllocator> Allocator for BindingAllocator<'_, A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            // Zero-sized requests get an aligned dangling slice per the
            // `Allocator` contract; nothing is drawn from the region.
            let dangling =
                NonNull::new(ptr::without_provenance_mut(layout.align())).ok_or(AllocError)?;
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }
        let ptr = self.inner.allocate(layout).ok_or(AllocError)?;
        let ptr = NonNull::new(ptr).ok_or(AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        unsafe { self.inner.deallocate(ptr.as_ptr()) }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FitStrategy, FreeListAllocator};

    fn region(size: usize) -> LockedAllocator<FreeListAllocator> {
        LockedAllocator::new(FreeListAllocator::new(size, FitStrategy::FirstFit).unwrap())
    }

    #[test]
    fn test_vec_round_trip() {
        let region = region(4096);
        let binding = BindingAllocator::new(&region);

        let mut values: Vec<u32, _> = Vec::new_in(binding);
        for value in 0..100 {
            values.push(value);
        }
        assert_eq!(values.len(), 100);
        assert_eq!(values[99], 99);
        assert!(region.used_size() > 0);

        drop(values);
        assert_eq!(region.used_size(), 0);
    }

    #[test]
    fn test_box_round_trip() {
        let region = region(1024);
        let binding = BindingAllocator::new(&region);

        let boxed = Box::new_in([0xAB_u8; 64], binding);
        assert!(region.owns(boxed.as_ptr()));
        assert_eq!(boxed[63], 0xAB);

        drop(boxed);
        assert_eq!(region.used_size(), 0);
    }

    #[test]
    fn test_two_element_types_share_one_region() {
        let region = region(4096);
        let binding = BindingAllocator::new(&region);

        let mut bytes: Vec<u8, _> = Vec::new_in(binding);
        let mut words: Vec<u64, _> = Vec::new_in(binding);
        bytes.extend([1, 2, 3]);
        words.extend([4, 5, 6]);

        assert!(region.owns(bytes.as_ptr()));
        assert!(region.owns(words.as_ptr().cast()));

        drop(bytes);
        drop(words);
        assert_eq!(region.used_size(), 0);
    }

    #[test]
    fn test_equality_is_underlying_identity() {
        let first = region(256);
        let second = region(256);

        let a = BindingAllocator::new(&first);
        let b = BindingAllocator::new(&first);
        let c = BindingAllocator::new(&second);

        assert_eq!(a, b);
        assert_ne!(a, c);

        // Copies stay equal to their original.
        let copied = a;
        assert_eq!(copied, a);
    }

    #[test]
    fn test_zero_sized_allocation() {
        let region = region(256);
        let binding = BindingAllocator::new(&region);

        let layout = Layout::from_size_align(0, 16).unwrap();
        let slice = binding.allocate(layout).unwrap();
        assert_eq!(slice.len(), 0);
        assert_eq!(slice.cast::<u8>().addr().get() % 16, 0);
        assert_eq!(region.used_size(), 0);

        // Zero-sized types never touch the region either.
        let unit = Box::new_in((), binding);
        assert_eq!(region.used_size(), 0);
        drop(unit);
    }

    #[test]
    fn test_exhaustion_raises_alloc_error() {
        let region = region(256);
        let binding = BindingAllocator::new(&region);

        let layout = Layout::from_size_align(4096, 8).unwrap();
        assert!(binding.allocate(layout).is_err());
    }
}
