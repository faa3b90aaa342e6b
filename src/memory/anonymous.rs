//! Anonymous private mappings owned by a single bitmap.
//!
//! These are the only mappings a bitmap unmaps itself. The region is
//! zero-initialized by the kernel and tagged with a diagnostic name so that
//! it can be told apart in `/proc/<pid>/maps`.

use super::purgeable::{PurgeableState, Residency};
use super::{IpcHandle, MemorySegment, MemoryType};
use crate::error::{Error, Result};
use rustix::mm::{MapFlags, ProtFlags};
use std::ffi::CString;
use std::ptr::NonNull;

// From <linux/prctl.h>; not every libc release exports them.
const PR_SET_VMA: libc::c_int = 0x5356_4d41;
const PR_SET_VMA_ANON_NAME: libc::c_ulong = 0;

/// A private anonymous mapping, optionally purgeable.
pub struct AnonymousMapping {
    /// Pointer to the mmap'd region.
    ptr: NonNull<u8>,
    /// Size of the region.
    len: usize,
    /// Diagnostic name.
    name: String,
    /// Present only for purgeable mappings.
    purgeable: Option<PurgeableState>,
}

impl AnonymousMapping {
    /// Map `len` bytes of zeroed private memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` is 0 or `mmap` fails.
    pub fn new(len: usize, name: &str) -> Result<Self> {
        Self::map(len, name, false)
    }

    /// Map `len` bytes of zeroed private memory that may later be marked
    /// volatile.
    ///
    /// The pages are populated up front so that residency tracking starts
    /// from a fully resident region.
    pub fn new_purgeable(len: usize, name: &str) -> Result<Self> {
        Self::map(len, name, true)
    }

    fn map(len: usize, name: &str, purgeable: bool) -> Result<Self> {
        if len == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }

        let flags = if purgeable {
            MapFlags::PRIVATE | MapFlags::POPULATE
        } else {
            MapFlags::PRIVATE
        };

        let ptr = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                flags,
            )?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        let mut mapping = Self {
            ptr,
            len,
            name: String::new(),
            purgeable: purgeable.then(PurgeableState::new),
        };
        mapping.set_name(name);

        tracing::debug!(len, name, purgeable, "mapped anonymous region");
        Ok(mapping)
    }

    /// Rename the region.
    ///
    /// The name is always recorded; the kernel tag is best effort since
    /// `PR_SET_VMA_ANON_NAME` needs Linux 5.17 built with
    /// `CONFIG_ANON_VMA_NAME`.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.replace('\0', "");
        let Ok(cname) = CString::new(self.name.as_str()) else {
            return;
        };
        // SAFETY: the range is a mapping we own and `cname` outlives the call.
        let rc = unsafe {
            libc::prctl(
                PR_SET_VMA,
                PR_SET_VMA_ANON_NAME,
                self.ptr.as_ptr() as libc::c_ulong,
                self.len as libc::c_ulong,
                cname.as_ptr() as libc::c_ulong,
            )
        };
        if rc != 0 {
            tracing::trace!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "kernel did not accept anonymous mapping name"
            );
        }
    }

    /// Diagnostic name of the region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the region can be marked volatile.
    pub fn is_purgeable(&self) -> bool {
        self.purgeable.is_some()
    }

    /// Current residency, `None` for non-purgeable regions.
    pub fn residency(&self) -> Option<Residency> {
        self.purgeable.as_ref().map(PurgeableState::residency)
    }

    /// Mark the region reclaimable.
    ///
    /// # Panics
    ///
    /// Panics if the region is not purgeable or the kernel rejects the hint.
    pub fn set_volatile(&mut self) {
        let (ptr, len) = (self.ptr, self.len);
        let state = self
            .purgeable
            .as_mut()
            .unwrap_or_else(|| panic!("set_volatile on non-purgeable mapping {}", self.name));
        // SAFETY: we own the mapping and hold it mutably.
        unsafe { state.set_volatile(ptr, len) }
    }

    /// Make the region resident again, returning whether the contents
    /// survived.
    ///
    /// # Panics
    ///
    /// Panics if the region is not purgeable or the residency query fails.
    #[must_use]
    pub fn set_nonvolatile(&mut self) -> bool {
        let (ptr, len) = (self.ptr, self.len);
        let state = self
            .purgeable
            .as_mut()
            .unwrap_or_else(|| panic!("set_nonvolatile on non-purgeable mapping {}", self.name));
        // SAFETY: we own the mapping and hold it mutably.
        unsafe { state.set_nonvolatile(ptr, len) }
    }
}

impl MemorySegment for AnonymousMapping {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        Some(self.ptr.as_ptr())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        if self.is_purgeable() {
            MemoryType::Purgeable
        } else {
            MemoryType::Anonymous
        }
    }

    fn ipc_handle(&self) -> Option<IpcHandle> {
        // Private mappings are copy-on-write across fork, never shared.
        None
    }
}

impl Drop for AnonymousMapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in `map`.
        if let Err(e) = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len) } {
            panic!("munmap of {} ({} bytes) failed: {e}", self.name, self.len);
        }
        tracing::debug!(len = self.len, name = %self.name, "unmapped anonymous region");
    }
}

// SAFETY: AnonymousMapping is Send + Sync because:
// - The mapping is process-wide and can be accessed from any thread
// - State changes require &mut self
unsafe impl Send for AnonymousMapping {}
unsafe impl Sync for AnonymousMapping {}

impl std::fmt::Debug for AnonymousMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymousMapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("name", &self.name)
            .field("residency", &self.residency())
            .finish()
    }
}
