//! # Parallax Bitmap
//!
//! Reference-counted pixel bitmaps over Linux memory primitives.
//!
//! A [`Bitmap`] is a `width x height` grid of pixels whose storage comes from
//! one of several backings, fixed at construction:
//!
//! - **Anonymous**: private `mmap`, unmapped when the bitmap drops
//! - **Purgeable**: like anonymous, but can be handed to the kernel with
//!   `MADV_FREE` while unused and reclaimed later
//! - **Wrapped**: caller-owned memory the bitmap never frees
//! - **Mapped file**: read-only view of raw pixels on disk
//! - **Shared buffer**: memfd memory that other processes can map
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parallax_bitmap::prelude::*;
//! use std::sync::Arc;
//!
//! let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgba32, Size::new(256, 256));
//! bitmap.fill(Color::from_rgb(0x33, 0x66, 0x99));
//!
//! // Idle: let the kernel take the pages if it needs them
//! bitmap.set_volatile();
//!
//! // Back in use
//! if !bitmap.set_nonvolatile() {
//!     bitmap.fill(Color::from_rgb(0x33, 0x66, 0x99));
//! }
//!
//! // Hand the pixels to another process
//! let shareable = Arc::new(bitmap).to_shareable_bitmap()?;
//! let handle = shareable.ipc_handle();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bitmap;
pub mod defaults;
pub mod error;
pub mod format;
pub mod loader;
pub mod memory;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bitmap::{BackingKind, Bitmap};
    pub use crate::error::{Error, Result};
    pub use crate::format::{BitmapFormat, Color, Rgba32, Size};
    pub use crate::loader::ImageLoader;
    pub use crate::memory::{MemorySegment, Residency, SharedBuffer};
}

pub use bitmap::{BackingKind, Bitmap};
pub use error::{Error, Result};
pub use format::{BitmapFormat, Color, Rgba32, Size};
