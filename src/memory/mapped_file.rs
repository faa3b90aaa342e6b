//! Read-only memory-mapped files.
//!
//! A file mapping releases itself when dropped; a bitmap built on top of it
//! only borrows the pixels for as long as it holds the `MappedFile`.
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_bitmap::memory::{MappedFile, MemorySegment};
//!
//! let file = MappedFile::open("/usr/share/wallpapers/raw.rgba")?;
//! println!("{} bytes", file.len());
//! ```

use super::{IpcHandle, MemorySegment, MemoryType};
use crate::error::{Error, Result};
use rustix::mm::{MapFlags, ProtFlags};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A file on disk mapped read-only into memory.
pub struct MappedFile {
    /// Pointer to the mmap'd region.
    ptr: NonNull<u8>,
    /// Size of the file at open time.
    len: usize,
    /// Path to the file.
    path: PathBuf,
}

impl MappedFile {
    /// Open an existing file and map it read-only.
    ///
    /// The descriptor is closed once the mapping exists; the mapping keeps
    /// the file contents reachable on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, is empty, or mapping fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        use rustix::fs::{Mode, OFlags};
        let fd = rustix::fs::open(path, OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())?;

        let stat = rustix::fs::fstat(&fd)?;
        let size = usize::try_from(stat.st_size)
            .map_err(|_| Error::InvalidSegment(format!("{}: bad file size", path.display())))?;

        if size == 0 {
            return Err(Error::AllocationFailed("file is empty".into()));
        }

        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };

        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        tracing::debug!(path = %path.display(), len = size, "mapped file");

        Ok(Self {
            ptr,
            len: size,
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemorySegment for MappedFile {
    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn as_mut_ptr(&self) -> Option<*mut u8> {
        None
    }

    fn len(&self) -> usize {
        self.len
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::MappedFile
    }

    fn ipc_handle(&self) -> Option<IpcHandle> {
        Some(IpcHandle::Named {
            name: self.path.to_string_lossy().into_owned(),
            size: self.len,
        })
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Err(e) = unsafe { rustix::mm::munmap(self.ptr.as_ptr().cast(), self.len) } {
            tracing::warn!(path = %self.path.display(), error = %e, "munmap failed");
        }
    }
}

// SAFETY: MappedFile is Send + Sync because:
// - The mapping is read-only
// - File mappings can be safely accessed from any thread
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}
