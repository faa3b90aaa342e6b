//! Memory segment trait and types.

/// Type of memory backing a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Private anonymous mapping owned by this process.
    Anonymous,
    /// Private anonymous mapping the kernel may reclaim while volatile.
    Purgeable,
    /// Read-only mapping of a file on disk.
    MappedFile,
    /// memfd-backed shared memory, shareable by fd passing.
    SharedMemory,
}

impl MemoryType {
    /// Can this memory type be shared across processes on the same machine?
    #[inline]
    pub fn supports_ipc(&self) -> bool {
        match self {
            MemoryType::Anonymous => false,
            MemoryType::Purgeable => false,
            MemoryType::MappedFile => true,
            MemoryType::SharedMemory => true,
        }
    }

    /// Can the kernel discard the contents without the owner releasing them?
    #[inline]
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, MemoryType::Purgeable)
    }
}

/// Handle for sharing memory across processes.
///
/// This can be serialized and sent to another process, which can then
/// open the same memory region.
#[derive(Debug, Clone)]
pub enum IpcHandle {
    /// File descriptor of a memfd.
    /// The fd should be sent via SCM_RIGHTS over a Unix socket.
    Fd {
        /// The raw file descriptor.
        fd: std::os::unix::io::RawFd,
        /// Size of the memory region.
        size: usize,
    },
    /// A file any process can map by path.
    Named {
        /// Path of the backing file.
        name: String,
        /// Size of the memory region.
        size: usize,
    },
}

/// Trait for memory segment backends.
///
/// A memory segment represents a contiguous, page-aligned region of memory
/// holding bitmap pixels.
///
/// # Safety
///
/// Implementations must ensure that:
/// - Pointers remain valid for the lifetime of the segment
/// - Thread-safety requirements are met (Send + Sync)
pub trait MemorySegment: Send + Sync {
    /// Get a raw pointer to the start of this segment.
    fn as_ptr(&self) -> *const u8;

    /// Get a mutable pointer to the start of this segment.
    ///
    /// Returns `None` if the segment is read-only.
    fn as_mut_ptr(&self) -> Option<*mut u8>;

    /// Total size of the segment in bytes.
    fn len(&self) -> usize;

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of memory backing this segment.
    fn memory_type(&self) -> MemoryType;

    /// Get an IPC handle for sharing this segment with other processes.
    ///
    /// Returns `None` if this segment type doesn't support cross-process sharing.
    fn ipc_handle(&self) -> Option<IpcHandle>;

    /// Get the segment as a byte slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure no mutable references exist to this memory.
    unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: Caller guarantees no mutable references exist.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }
}

impl dyn MemorySegment {
    /// Check if this segment can be shared with other processes.
    pub fn is_shareable(&self) -> bool {
        self.ipc_handle().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_ipc() {
        assert!(!MemoryType::Anonymous.supports_ipc());
        assert!(!MemoryType::Purgeable.supports_ipc());
        assert!(MemoryType::MappedFile.supports_ipc());
        assert!(MemoryType::SharedMemory.supports_ipc());
    }

    #[test]
    fn test_memory_type_reclaimable() {
        assert!(MemoryType::Purgeable.is_reclaimable());
        assert!(!MemoryType::Anonymous.is_reclaimable());
        assert!(!MemoryType::SharedMemory.is_reclaimable());
    }
}
