//! Backing memory for bitmaps.
//!
//! Every bitmap's pixels live in one of these regions:
//!
//! - [`AnonymousMapping`]: private memory owned and unmapped by the bitmap,
//!   optionally purgeable (see [`Residency`])
//! - [`MappedFile`]: a read-only file mapping that releases itself
//! - [`SharedBuffer`]: memfd-backed memory shareable with other processes
//!
//! Wrapped bitmaps point at caller-owned memory and have no segment at all.
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_bitmap::memory::{MemorySegment, SharedBuffer};
//!
//! let buffer = SharedBuffer::create_with_size(64 * 1024)?;
//! assert!(buffer.ipc_handle().is_some());
//! ```

mod anonymous;
mod mapped_file;
mod purgeable;
mod segment;
mod shared;

pub use anonymous::AnonymousMapping;
pub use mapped_file::MappedFile;
pub use purgeable::Residency;
pub use segment::{IpcHandle, MemorySegment, MemoryType};
pub use shared::SharedBuffer;
