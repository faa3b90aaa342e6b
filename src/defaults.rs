//! Layout constants and configuration defaults.
//!
//! Every bitmap in this crate stores pixels as 32-bit words, even `Indexed8`
//! bitmaps reserve four bytes per pixel in their row stride so that a single
//! pitch rule covers all owned, file-backed and shared-buffer layouts.

/// Bytes reserved per pixel when computing a pitch.
pub const BYTES_PER_PIXEL: usize = 4;

/// Rows start on multiples of this many bytes.
pub const PITCH_ALIGNMENT: usize = 16;

/// Number of entries in an `Indexed8` palette.
pub const PALETTE_SIZE: usize = 256;

/// Prefix of the diagnostic name given to anonymous bitmap mappings.
///
/// Shows up in `/proc/<pid>/maps` as `[anon:bitmap:WxH]`.
pub const MAPPING_NAME_PREFIX: &str = "bitmap";

/// Debug name given to memfd shared buffers (visible in `/proc/self/fd/`).
pub const SHARED_BUFFER_NAME: &str = "parallax-bitmap";

/// Largest width or height the image loader will accept by default.
///
/// 16384 x 16384 RGBA is 1 GiB of pixel memory.
pub const LOADER_MAX_DIMENSION: u32 = 16384;

/// Page size used when the kernel cannot be asked.
pub const FALLBACK_PAGE_SIZE: usize = 4096;

/// Row stride for a bitmap `width` pixels wide.
///
/// `width * BYTES_PER_PIXEL` rounded up to the next multiple of
/// [`PITCH_ALIGNMENT`].
///
/// # Example
///
/// ```rust
/// use parallax_bitmap::defaults::pitch_for_width;
///
/// assert_eq!(pitch_for_width(1), 16);
/// assert_eq!(pitch_for_width(4), 16);
/// assert_eq!(pitch_for_width(5), 32);
/// ```
pub const fn pitch_for_width(width: u32) -> usize {
    let raw = width as usize * BYTES_PER_PIXEL;
    (raw + PITCH_ALIGNMENT - 1) & !(PITCH_ALIGNMENT - 1)
}

/// Size of one virtual memory page.
pub fn page_size() -> usize {
    match rustix::param::page_size() {
        0 => FALLBACK_PAGE_SIZE,
        size => size,
    }
}
