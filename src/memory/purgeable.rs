//! Purgeable memory state machine.
//!
//! A purgeable region is a private anonymous mapping that alternates between
//! two states:
//!
//! ```text
//!              set_volatile()
//!   Resident ─────────────────▶ Volatile
//!      ▲                           │
//!      └───────────────────────────┘
//!     set_nonvolatile() -> intact?
//! ```
//!
//! While volatile the pages are handed to the kernel with `MADV_FREE`: under
//! memory pressure they are dropped instead of swapped, and read back as
//! zeroes afterwards. Leaving the volatile state reports whether every page
//! survived (queried with `mincore`) and then writes one byte per page, which
//! cancels any pending lazy free.
//!
//! A page reclaimed in the short window between the residency query and the
//! rewrite is not detected.

use crate::defaults::page_size;
use std::io;
use std::ptr::NonNull;

/// Residency state of a purgeable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Residency {
    /// Contents are guaranteed intact.
    #[default]
    Resident,
    /// The kernel may discard the contents at any time.
    Volatile,
}

/// State machine driving the kernel hints for one purgeable region.
#[derive(Debug, Default)]
pub(crate) struct PurgeableState {
    residency: Residency,
}

impl PurgeableState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn residency(&self) -> Residency {
        self.residency
    }

    /// Mark the region reclaimable. No-op when already volatile.
    ///
    /// # Safety
    ///
    /// `ptr..ptr+len` must be a private anonymous mapping owned by the caller,
    /// starting on a page boundary.
    ///
    /// # Panics
    ///
    /// Panics if the kernel rejects the hint.
    pub(crate) unsafe fn set_volatile(&mut self, ptr: NonNull<u8>, len: usize) {
        if self.residency == Residency::Volatile {
            return;
        }
        // SAFETY: caller guarantees the range is a private mapping it owns.
        if let Err(e) = unsafe {
            rustix::mm::madvise(ptr.as_ptr().cast(), len, rustix::mm::Advice::LinuxFree)
        } {
            panic!("madvise(MADV_FREE) on {len} bytes at {ptr:p} failed: {e}");
        }
        self.residency = Residency::Volatile;
        tracing::debug!(len, "purgeable region marked volatile");
    }

    /// Make the region resident again.
    ///
    /// Returns `true` if the contents survived the volatile period. Already
    /// resident regions return `true` without touching the kernel.
    ///
    /// # Safety
    ///
    /// Same as [`set_volatile`](Self::set_volatile), and the caller must hold
    /// exclusive access to the range: every page is rewritten in place.
    ///
    /// # Panics
    ///
    /// Panics if the residency query fails.
    pub(crate) unsafe fn set_nonvolatile(&mut self, ptr: NonNull<u8>, len: usize) -> bool {
        if self.residency == Residency::Resident {
            return true;
        }
        let intact = match pages_resident(ptr, len) {
            Ok(intact) => intact,
            Err(e) => panic!("mincore on {len} bytes at {ptr:p} failed: {e}"),
        };
        // SAFETY: caller guarantees exclusive access to the mapping.
        unsafe { rewrite_pages(ptr, len) };
        self.residency = Residency::Resident;
        if intact {
            tracing::debug!(len, "purgeable region resident again");
        } else {
            tracing::warn!(len, "purgeable region was reclaimed while volatile");
        }
        intact
    }
}

/// Whether every page of `ptr..ptr+len` is backed by physical memory.
fn pages_resident(ptr: NonNull<u8>, len: usize) -> io::Result<bool> {
    let page = page_size();
    let mut vec = vec![0u8; len.div_ceil(page)];
    // SAFETY: `vec` holds one byte per page of the range.
    let rc = unsafe { libc::mincore(ptr.as_ptr().cast(), len, vec.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(vec.iter().all(|&v| v & 1 == 1))
}

/// Write the first byte of every page back onto itself.
///
/// A write to a lazily freed page cancels the free.
unsafe fn rewrite_pages(ptr: NonNull<u8>, len: usize) {
    let base = ptr.as_ptr();
    for offset in (0..len).step_by(page_size()) {
        // SAFETY: offset < len, caller guarantees exclusive access.
        unsafe {
            let byte = std::ptr::read_volatile(base.add(offset));
            std::ptr::write_volatile(base.add(offset), byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::mm::{MapFlags, ProtFlags};

    struct Region {
        ptr: NonNull<u8>,
        len: usize,
    }

    impl Region {
        fn new(pages: usize) -> Self {
            let len = pages * page_size();
            let ptr = unsafe {
                rustix::mm::mmap_anonymous(
                    std::ptr::null_mut(),
                    len,
                    ProtFlags::READ | ProtFlags::WRITE,
                    MapFlags::PRIVATE | MapFlags::POPULATE,
                )
                .unwrap()
            };
            Self {
                ptr: NonNull::new(ptr.cast()).unwrap(),
                len,
            }
        }

        fn bytes(&mut self) -> &mut [u8] {
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
        }
    }

    impl Drop for Region {
        fn drop(&mut self) {
            unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len).unwrap() };
        }
    }

    #[test]
    fn test_initial_state_is_resident() {
        let state = PurgeableState::new();
        assert_eq!(state.residency(), Residency::Resident);
    }

    #[test]
    fn test_nonvolatile_when_resident_is_noop() {
        let region = Region::new(1);
        let mut state = PurgeableState::new();
        assert!(unsafe { state.set_nonvolatile(region.ptr, region.len) });
        assert_eq!(state.residency(), Residency::Resident);
    }

    #[test]
    fn test_volatile_round_trip_keeps_contents() {
        let mut region = Region::new(4);
        region.bytes().fill(0xab);

        let mut state = PurgeableState::new();
        unsafe { state.set_volatile(region.ptr, region.len) };
        assert_eq!(state.residency(), Residency::Volatile);

        // Idempotent
        unsafe { state.set_volatile(region.ptr, region.len) };
        assert_eq!(state.residency(), Residency::Volatile);

        assert!(unsafe { state.set_nonvolatile(region.ptr, region.len) });
        assert_eq!(state.residency(), Residency::Resident);
        assert!(region.bytes().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_reclaimed_region_reports_loss() {
        let mut region = Region::new(4);
        region.bytes().fill(0xab);

        let mut state = PurgeableState::new();
        unsafe { state.set_volatile(region.ptr, region.len) };
        unsafe {
            rustix::mm::madvise(
                region.ptr.as_ptr().cast(),
                region.len,
                rustix::mm::Advice::LinuxDontNeed,
            )
            .unwrap();
        }

        assert!(!unsafe { state.set_nonvolatile(region.ptr, region.len) });
        assert_eq!(state.residency(), Residency::Resident);
        assert!(pages_resident(region.ptr, region.len).unwrap());
    }

    #[test]
    fn test_pages_resident_after_populate() {
        let region = Region::new(2);
        assert!(pages_resident(region.ptr, region.len).unwrap());
    }
}
