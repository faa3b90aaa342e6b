//! Shared buffers using Linux memfd.
//!
//! A [`SharedBuffer`] is an anonymous in-memory file mapped `MAP_SHARED`.
//! Its descriptor can be passed to another process with `SCM_RIGHTS`, which
//! maps the same physical pages with [`SharedBuffer::from_fd`]. Within a
//! process the buffer is reference-counted with `Arc`; the kernel keeps the
//! pages alive until every mapping and descriptor is gone.

use super::{IpcHandle, MemorySegment, MemoryType};
use crate::defaults::SHARED_BUFFER_NAME;
use crate::error::{Error, Result};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::mm::{MapFlags, ProtFlags};
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique buffer IDs.
static SHARED_BUFFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_shared_buffer_id() -> u64 {
    SHARED_BUFFER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A memfd-backed region that can be shared across processes.
///
/// # Example
///
/// ```rust,ignore
/// use parallax_bitmap::memory::SharedBuffer;
///
/// let buffer = SharedBuffer::create_with_size(1024 * 1024)?;
/// let handle = buffer.ipc_handle().unwrap();
/// // Send handle.fd over a Unix socket...
/// ```
pub struct SharedBuffer {
    /// The memfd file descriptor.
    fd: OwnedFd,
    /// Pointer to the mmap'd region.
    ptr: NonNull<u8>,
    /// Size of the buffer.
    len: usize,
    /// Process-local identifier.
    id: u64,
}

impl SharedBuffer {
    /// Create a new zero-filled shared buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is 0 or if `memfd_create`, `ftruncate`,
    /// or `mmap` fails.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }

        let fd = rustix::fs::memfd_create(SHARED_BUFFER_NAME, rustix::fs::MemfdFlags::CLOEXEC)?;
        rustix::fs::ftruncate(&fd, size as u64)?;

        // SAFETY: the memfd was just created with exactly `size` bytes.
        let buffer = unsafe { Self::map(fd, size)? };
        tracing::debug!(id = buffer.id, len = size, "created shared buffer");
        Ok(buffer)
    }

    /// Create a new reference-counted shared buffer.
    pub fn create_with_size(size: usize) -> Result<Arc<Self>> {
        Self::new(size).map(Arc::new)
    }

    /// Map a shared buffer received from another process.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `fd` refers to a memfd (or another
    /// shareable file) nobody truncates while it is mapped.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is 0, the file is smaller than `size`,
    /// or mapping fails.
    pub unsafe fn from_fd(fd: OwnedFd, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::AllocationFailed(
                "size must be greater than 0".into(),
            ));
        }

        let actual = rustix::fs::fstat(&fd)?.st_size;
        if actual < size as i64 {
            return Err(Error::InvalidSegment(format!(
                "shared buffer holds {actual} bytes, expected {size}"
            )));
        }

        // SAFETY: size checked against the file, caller vouches for the fd.
        unsafe { Self::map(fd, size) }
    }

    /// Map a shared buffer from a raw descriptor without taking ownership.
    ///
    /// The descriptor is duplicated; the original stays open.
    ///
    /// # Safety
    ///
    /// Same as [`from_fd`](Self::from_fd), and `fd` must be open.
    pub unsafe fn from_raw_fd(fd: RawFd, size: usize) -> Result<Self> {
        let dup_fd = rustix::io::fcntl_dupfd_cloexec(unsafe { BorrowedFd::borrow_raw(fd) }, 0)?;
        unsafe { Self::from_fd(dup_fd, size) }
    }

    unsafe fn map(fd: OwnedFd, size: usize) -> Result<Self> {
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        Ok(Self {
            fd,
            ptr,
            len: size,
            id: next_shared_buffer_id(),
        })
    }

    /// Process-local identifier of this mapping.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Base address of the buffer.
    pub fn data(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.len
    }

    /// Get the raw file descriptor.
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Duplicate the descriptor, e.g. to hand it to another process.
    pub fn try_clone_fd(&self) -> Result<OwnedFd> {
        Ok(rustix::io::fcntl_dupfd_cloexec(&self.fd, 0)?)
    }
}

impl MemorySegment for SharedBuffer {
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
        MemoryType::SharedMemory
    }

    fn ipc_handle(&self) -> Option<IpcHandle> {
        Some(IpcHandle::Fd {
            fd: self.fd.as_raw_fd(),
            size: self.len,
        })
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr and len describe the mapping created in `map`.
        if let Err(e) = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len) } {
            tracing::warn!(id = self.id, error = %e, "munmap failed");
        }
        tracing::debug!(id = self.id, len = self.len, "released shared buffer");
        // fd is automatically closed when OwnedFd is dropped
    }
}

// SAFETY: SharedBuffer is Send + Sync because:
// - The memory is shared and can be accessed from any thread
// - The fd is reference-counted by the kernel
// - Concurrent writers must coordinate externally, as with any shared memory
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl AsFd for SharedBuffer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.id)
            .field("fd", &self.fd.as_raw_fd())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_buffer_creation() {
        let buffer = SharedBuffer::new(4096).unwrap();
        assert_eq!(buffer.size(), 4096);
        assert_eq!(buffer.len(), 4096);
        assert_eq!(buffer.memory_type(), MemoryType::SharedMemory);
        assert!(buffer.ipc_handle().is_some());
    }

    #[test]
    fn test_shared_buffer_zero_size_fails() {
        assert!(SharedBuffer::new(0).is_err());
    }

    #[test]
    fn test_shared_buffer_ids_are_unique() {
        let a = SharedBuffer::new(4096).unwrap();
        let b = SharedBuffer::new(4096).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_shared_buffer_is_zeroed() {
        let buffer = SharedBuffer::new(8192).unwrap();
        unsafe {
            assert!(buffer.as_slice().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_shared_buffer_modifications_visible() {
        let first = SharedBuffer::new(4096).unwrap();
        let second = unsafe { SharedBuffer::from_fd(first.try_clone_fd().unwrap(), 4096).unwrap() };
        assert_ne!(first.data(), second.data());

        unsafe {
            *first.data() = 77;
            *second.data().add(100) = 88;
            assert_eq!(*second.data(), 77);
            assert_eq!(*first.data().add(100), 88);
        }
    }

    #[test]
    fn test_from_raw_fd_keeps_original_open() {
        let first = SharedBuffer::new(4096).unwrap();
        let second = unsafe { SharedBuffer::from_raw_fd(first.as_raw_fd(), 4096).unwrap() };
        assert_ne!(second.as_raw_fd(), first.as_raw_fd());
        drop(second);
        assert!(first.try_clone_fd().is_ok());
    }

    #[test]
    fn test_drop_unmaps_only_its_own_view() {
        let first = SharedBuffer::new(4096).unwrap();
        let second = unsafe { SharedBuffer::from_fd(first.try_clone_fd().unwrap(), 4096).unwrap() };
        unsafe { *first.data() = 5 };
        drop(first);
        assert_eq!(unsafe { *second.data() }, 5);
    }

    #[test]
    fn test_from_fd_rejects_short_file() {
        let buffer = SharedBuffer::new(4096).unwrap();
        let result = unsafe { SharedBuffer::from_fd(buffer.try_clone_fd().unwrap(), 8192) };
        assert!(result.is_err());
    }
}
