//! Backing byte span shared by every allocator engine.

use core::alloc::Layout;

use snafu::ensure;

use crate::{CreateError, InvalidAlignmentSnafu, ReserveFailedSnafu, ZeroSizeSnafu};

/// A contiguous byte span `[base, base + size)`.
///
/// The span is either **owned** (reserved from the global allocator at
/// construction and released on drop) or **borrowed** (raw parts supplied
/// by the caller; dropping the region leaves the bytes untouched). The
/// reservation layout is retained so the release call mirrors it exactly.
///
/// `Region` is neither `Copy` nor `Clone`; Rust move semantics make a
/// moved-from binding statically unusable, so no null-out-on-move dance is
/// needed.
#[derive(Debug)]
pub(crate) struct Region {
    base: *mut u8,
    size: usize,
    owned: Option<Layout>,
}

impl Region {
    /// Reserves `size` bytes aligned to `align` from the global allocator.
    pub(crate) fn reserve(size: usize, align: usize) -> Result<Self, CreateError> {
        ensure!(size != 0, ZeroSizeSnafu);
        ensure!(align::is_power_of_two(align), InvalidAlignmentSnafu { align });
        let Ok(layout) = Layout::from_size_align(size, align) else {
            return ReserveFailedSnafu { size, align }.fail();
        };
        // SAFETY: `layout` has non-zero size.
        let base = unsafe { alloc::alloc::alloc(layout) };
        ensure!(!base.is_null(), ReserveFailedSnafu { size, align });
        Ok(Self {
            base,
            size,
            owned: Some(layout),
        })
    }

    /// Binds an externally supplied buffer. The region never releases it.
    ///
    /// # Safety
    ///
    /// `base..base + size` must be valid for reads and writes for the
    /// lifetime of the region and must not be accessed through any other
    /// path while the region is live.
    pub(crate) unsafe fn from_raw(base: *mut u8, size: usize) -> Self {
        Self {
            base,
            size,
            owned: None,
        }
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.base
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if `ptr` lies within `[base, base + size)`.
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr.addr();
        let base = self.base.addr();
        addr >= base && addr < base + self.size
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Some(layout) = self.owned {
            // SAFETY: `base` came from `alloc` with this exact layout.
            unsafe { alloc::alloc::dealloc(self.base, layout) };
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let region = Region::reserve(256, 16).unwrap();
        assert!(!region.base().is_null());
        assert_eq!(region.size(), 256);
        assert!(align::is_aligned_to(region.base(), 16));
    }

    #[test]
    fn test_reserve_rejects_zero_size() {
        assert!(matches!(
            Region::reserve(0, 8),
            Err(CreateError::ZeroSize { .. })
        ));
    }

    #[test]
    fn test_reserve_rejects_bad_alignment() {
        assert!(matches!(
            Region::reserve(64, 12),
            Err(CreateError::InvalidAlignment { align: 12, .. })
        ));
    }

    #[test]
    fn test_contains() {
        let region = Region::reserve(64, 8).unwrap();
        let base = region.base();
        assert!(region.contains(base));
        assert!(region.contains(base.map_addr(|a| a + 63)));
        assert!(!region.contains(base.map_addr(|a| a + 64)));
    }

    #[test]
    fn test_borrowed_region_leaves_buffer_alive() {
        let mut buffer = vec![0_u8; 128];
        {
            let region = unsafe { Region::from_raw(buffer.as_mut_ptr(), buffer.len()) };
            assert_eq!(region.size(), 128);
        }
        // The buffer is still valid after the region is dropped.
        buffer[0] = 0xAB;
        assert_eq!(buffer[0], 0xAB);
    }
}
