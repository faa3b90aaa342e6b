//! Error types for parallax-bitmap.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures.
///
/// Contract violations (empty sizes, palette/format mismatches, volatile
/// transitions on non-purgeable memory) are not represented here; they panic.
#[derive(Error, Debug)]
pub enum Error {
    /// Memory allocation failed.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Invalid memory segment operation.
    #[error("invalid memory segment: {0}")]
    InvalidSegment(String),

    /// A mapped file does not hold enough bytes for the requested bitmap.
    #[error("{path}: file holds {actual} bytes, bitmap needs {required}")]
    FileTooSmall {
        /// Path of the mapped file.
        path: PathBuf,
        /// Bytes needed for `pitch * height`.
        required: usize,
        /// Size of the file on disk.
        actual: usize,
    },

    /// Image decoding failed.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// The image uses a layout the loader cannot turn into a bitmap.
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
