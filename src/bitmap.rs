//! The bitmap: pixel memory plus the rule for releasing it.
//!
//! A [`Bitmap`] owns or references a block of `pitch * height` bytes. Where
//! the bytes come from is decided once, by the factory that built it:
//!
//! | Factory | Backing | Unmapped by the bitmap |
//! |---------|---------|------------------------|
//! | [`Bitmap::create`] | anonymous mapping | yes |
//! | [`Bitmap::create_purgeable`] | purgeable anonymous mapping | yes |
//! | [`Bitmap::create_wrapper`] | caller memory | no |
//! | [`Bitmap::load_from_mapped_file`] | read-only file mapping | no, the mapping releases itself |
//! | [`Bitmap::create_with_shared_buffer`] | memfd shared buffer | no, the last buffer reference does |
//!
//! Bitmaps are shared with `Arc<Bitmap>`. Pixel writes and purge transitions
//! need `&mut Bitmap`.
//!
//! # Example
//!
//! ```rust
//! use parallax_bitmap::{Bitmap, BitmapFormat, Color, Size};
//! use std::sync::Arc;
//!
//! let mut bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(64, 32));
//! bitmap.fill(Color::from_rgb(0x20, 0x40, 0x80));
//!
//! let bitmap = Arc::new(bitmap);
//! let shareable = bitmap.to_shareable_bitmap().unwrap();
//! assert_eq!(shareable.as_bytes(), bitmap.as_bytes());
//! ```

use crate::defaults::{BYTES_PER_PIXEL, MAPPING_NAME_PREFIX, PALETTE_SIZE, pitch_for_width};
use crate::error::{Error, Result};
use crate::format::{BitmapFormat, Color, Rgba32, Size};
use crate::memory::{
    AnonymousMapping, IpcHandle, MappedFile, MemorySegment, Residency, SharedBuffer,
};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

/// Which kind of memory backs a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackingKind {
    /// Private anonymous mapping owned by the bitmap.
    Anonymous,
    /// Private anonymous mapping that may be marked volatile.
    Purgeable,
    /// Memory owned by the caller.
    Wrapped,
    /// Read-only file mapping.
    MappedFile,
    /// memfd shared buffer.
    SharedBuffer,
}

impl BackingKind {
    /// Whether dropping the bitmap unmaps the pixel memory.
    pub fn owns_mapping(self) -> bool {
        matches!(self, BackingKind::Anonymous | BackingKind::Purgeable)
    }
}

enum Backing {
    Owned(AnonymousMapping),
    Wrapped,
    MappedFile(MappedFile),
    SharedBuffer(Arc<SharedBuffer>),
}

/// A rectangle of pixels in one of several memory backings.
pub struct Bitmap {
    size: Size,
    pitch: usize,
    format: BitmapFormat,
    data: NonNull<u8>,
    len: usize,
    backing: Backing,
    palette: Option<Box<[Rgba32; PALETTE_SIZE]>>,
}

impl Bitmap {
    /// Allocate a zeroed bitmap in private anonymous memory.
    ///
    /// # Panics
    ///
    /// Panics if `size` is empty or the allocation fails.
    pub fn create(format: BitmapFormat, size: Size) -> Self {
        Self::try_create(format, size)
            .unwrap_or_else(|e| panic!("Bitmap::create({format}, {size}) failed: {e}"))
    }

    /// Like [`create`](Self::create), returning allocation failures.
    ///
    /// # Panics
    ///
    /// Panics if `size` is empty.
    pub fn try_create(format: BitmapFormat, size: Size) -> Result<Self> {
        Self::allocate(format, size, false)
    }

    /// Allocate a zeroed bitmap whose memory can be marked volatile.
    ///
    /// # Panics
    ///
    /// Panics if `size` is empty or the allocation fails.
    pub fn create_purgeable(format: BitmapFormat, size: Size) -> Self {
        Self::try_create_purgeable(format, size)
            .unwrap_or_else(|e| panic!("Bitmap::create_purgeable({format}, {size}) failed: {e}"))
    }

    /// Like [`create_purgeable`](Self::create_purgeable), returning
    /// allocation failures.
    pub fn try_create_purgeable(format: BitmapFormat, size: Size) -> Result<Self> {
        Self::allocate(format, size, true)
    }

    fn allocate(format: BitmapFormat, size: Size, purgeable: bool) -> Result<Self> {
        assert!(!size.is_empty(), "bitmap size must not be empty, got {size}");
        let pitch = pitch_for_width(size.width);
        let len = pitch.checked_mul(size.height as usize).ok_or_else(|| {
            Error::AllocationFailed(format!("{size} bitmap does not fit in the address space"))
        })?;

        let name = format!("{MAPPING_NAME_PREFIX}:{size}");
        let mapping = if purgeable {
            AnonymousMapping::new_purgeable(len, &name)?
        } else {
            AnonymousMapping::new(len, &name)?
        };
        // Anonymous mappings are page aligned and never read-only.
        let data = NonNull::new(mapping.as_ptr().cast_mut())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        Ok(Self::from_parts(format, size, pitch, len, data, Backing::Owned(mapping)))
    }

    /// Wrap pixel memory owned by someone else.
    ///
    /// The bitmap never frees or unmaps `data`. An `Indexed8` wrapper still
    /// gets its own palette.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `pitch * size.height`
    /// bytes for the whole life of the bitmap, and nothing else may access
    /// that memory while the bitmap is being written through.
    ///
    /// # Panics
    ///
    /// Panics if `size` is empty, `pitch` is too small for one row, or a
    /// 32-bit bitmap's `data` or `pitch` is not 4-byte aligned.
    pub unsafe fn create_wrapper(
        format: BitmapFormat,
        size: Size,
        pitch: usize,
        data: NonNull<u8>,
    ) -> Self {
        assert!(!size.is_empty(), "bitmap size must not be empty, got {size}");
        let min_pitch = match format {
            BitmapFormat::Indexed8 => size.width as usize,
            BitmapFormat::Rgb32 | BitmapFormat::Rgba32 => size.row_len(),
        };
        assert!(
            pitch >= min_pitch,
            "pitch {pitch} is smaller than one {format} row of {size} ({min_pitch} bytes)"
        );
        assert!(
            !format.is_32bit() || pitch % BYTES_PER_PIXEL == 0,
            "pitch {pitch} of a {format} bitmap must be a multiple of {BYTES_PER_PIXEL}"
        );
        assert!(
            !format.is_32bit() || data.as_ptr() as usize % std::mem::align_of::<Rgba32>() == 0,
            "wrapped {format} pixel data at {data:p} is not 4-byte aligned"
        );
        let len = storage_len(pitch, size);
        Self::from_parts(format, size, pitch, len, data, Backing::Wrapped)
    }

    /// Map a file of raw pixels read-only.
    ///
    /// The file must hold at least `pitch * size.height` bytes laid out with
    /// the default pitch for `size.width`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or is too
    /// small for the requested size.
    ///
    /// # Panics
    ///
    /// Panics if `format` is `Indexed8` or `size` is empty.
    pub fn load_from_mapped_file<P: AsRef<Path>>(
        format: BitmapFormat,
        path: P,
        size: Size,
    ) -> Result<Self> {
        assert!(
            format != BitmapFormat::Indexed8,
            "file-backed bitmaps cannot be Indexed8"
        );
        assert!(!size.is_empty(), "bitmap size must not be empty, got {size}");

        let path = path.as_ref();
        let mapped = MappedFile::open(path).inspect_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "cannot map bitmap file");
        })?;

        let pitch = pitch_for_width(size.width);
        // Saturates past any real file, so an overflowing size is reported
        // as too small.
        let required = pitch.saturating_mul(size.height as usize);
        if mapped.len() < required {
            return Err(Error::FileTooSmall {
                path: path.to_path_buf(),
                required,
                actual: mapped.len(),
            });
        }

        let data = NonNull::new(mapped.as_ptr().cast_mut())
            .ok_or_else(|| Error::InvalidSegment("file mapping is null".into()))?;
        Ok(Self::from_parts(
            format,
            size,
            pitch,
            required,
            data,
            Backing::MappedFile(mapped),
        ))
    }

    /// Put a bitmap on top of a shared buffer.
    ///
    /// # Safety
    ///
    /// The bitmap hands out `&mut` views of the buffer through `&mut self`.
    /// While it is being written through, no other bitmap or mapping of the
    /// same buffer in this process may read or write those bytes. Writers in
    /// other processes have to be coordinated by the caller.
    ///
    /// # Panics
    ///
    /// Panics if `format` is `Indexed8`, `size` is empty, or the buffer is
    /// smaller than `pitch * size.height`.
    pub unsafe fn create_with_shared_buffer(
        format: BitmapFormat,
        buffer: Arc<SharedBuffer>,
        size: Size,
    ) -> Self {
        assert!(
            format != BitmapFormat::Indexed8,
            "shared-buffer bitmaps cannot be Indexed8"
        );
        assert!(!size.is_empty(), "bitmap size must not be empty, got {size}");
        let pitch = pitch_for_width(size.width);
        let required = storage_len(pitch, size);
        assert!(
            buffer.size() >= required,
            "shared buffer {} holds {} bytes, {size} bitmap needs {required}",
            buffer.id(),
            buffer.size()
        );

        // SAFETY: mmap never hands out a null mapping.
        let data = unsafe { NonNull::new_unchecked(buffer.data()) };
        Self::from_parts(format, size, pitch, required, data, Backing::SharedBuffer(buffer))
    }

    /// Decode an image file into a new bitmap.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        #[cfg(feature = "image-png")]
        {
            use crate::loader::{ImageLoader, PngLoader};
            PngLoader::new().load(path.as_ref())
        }
        #[cfg(not(feature = "image-png"))]
        {
            Err(Error::UnsupportedImage(format!(
                "{}: no image decoder compiled in",
                path.as_ref().display()
            )))
        }
    }

    fn from_parts(
        format: BitmapFormat,
        size: Size,
        pitch: usize,
        len: usize,
        data: NonNull<u8>,
        backing: Backing,
    ) -> Self {
        let palette = format.has_palette().then(|| Box::new([0; PALETTE_SIZE]));
        Self {
            size,
            pitch,
            format,
            data,
            len,
            backing,
            palette,
        }
    }

    /// Return a bitmap backed by a shared buffer.
    ///
    /// A bitmap that already is one is returned as is. Otherwise the pixels
    /// are copied into a fresh shared buffer; the palette is not carried
    /// over.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared buffer cannot be created.
    ///
    /// # Panics
    ///
    /// Panics for `Indexed8` bitmaps and for volatile ones.
    pub fn to_shareable_bitmap(self: &Arc<Self>) -> Result<Arc<Bitmap>> {
        if matches!(self.backing, Backing::SharedBuffer(_)) {
            return Ok(Arc::clone(self));
        }
        assert!(
            self.format != BitmapFormat::Indexed8,
            "Indexed8 bitmaps cannot be converted to shared buffers"
        );

        let len = pitch_for_width(self.size.width)
            .checked_mul(self.size.height as usize)
            .ok_or_else(|| {
                Error::AllocationFailed(format!("{} bitmap does not fit in a buffer", self.size))
            })?;
        let buffer = SharedBuffer::create_with_size(len)?;
        // SAFETY: the buffer was just created and this bitmap holds its only
        // reference.
        let mut bitmap =
            unsafe { Bitmap::create_with_shared_buffer(self.format, buffer, self.size) };
        if bitmap.pitch == self.pitch {
            bitmap.as_bytes_mut().copy_from_slice(self.as_bytes());
        } else {
            let row_len = self.size.row_len();
            for y in 0..self.height() {
                bitmap.row_bytes_mut(y)[..row_len].copy_from_slice(&self.row_bytes(y)[..row_len]);
            }
        }
        tracing::debug!(
            size = %self.size,
            from = ?self.backing_kind(),
            "copied bitmap into shared buffer"
        );
        Ok(Arc::new(bitmap))
    }

    /// Width and height in pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Bytes between the starts of consecutive rows.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Pixel format.
    pub fn format(&self) -> BitmapFormat {
        self.format
    }

    /// Total bytes of pixel storage, `pitch * height`.
    pub fn size_in_bytes(&self) -> usize {
        self.len
    }

    /// Which kind of memory backs this bitmap.
    pub fn backing_kind(&self) -> BackingKind {
        match &self.backing {
            Backing::Owned(mapping) if mapping.is_purgeable() => BackingKind::Purgeable,
            Backing::Owned(_) => BackingKind::Anonymous,
            Backing::Wrapped => BackingKind::Wrapped,
            Backing::MappedFile(_) => BackingKind::MappedFile,
            Backing::SharedBuffer(_) => BackingKind::SharedBuffer,
        }
    }

    /// Whether dropping this bitmap unmaps its pixel memory.
    pub fn owns_mapping(&self) -> bool {
        matches!(self.backing, Backing::Owned(_))
    }

    /// Whether the pixel memory can be marked volatile.
    pub fn is_purgeable(&self) -> bool {
        matches!(&self.backing, Backing::Owned(mapping) if mapping.is_purgeable())
    }

    /// Whether the pixel memory is currently marked volatile.
    pub fn is_volatile(&self) -> bool {
        self.residency() == Some(Residency::Volatile)
    }

    /// Residency of purgeable memory, `None` for everything else.
    pub fn residency(&self) -> Option<Residency> {
        match &self.backing {
            Backing::Owned(mapping) => mapping.residency(),
            _ => None,
        }
    }

    /// The shared buffer behind this bitmap, if any.
    pub fn shared_buffer(&self) -> Option<&Arc<SharedBuffer>> {
        match &self.backing {
            Backing::SharedBuffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Handle another process can use to reach the same pixels.
    pub fn ipc_handle(&self) -> Option<IpcHandle> {
        self.segment().and_then(|segment| segment.ipc_handle())
    }

    fn segment(&self) -> Option<&dyn MemorySegment> {
        match &self.backing {
            Backing::Owned(mapping) => Some(mapping),
            Backing::Wrapped => None,
            Backing::MappedFile(file) => Some(file),
            Backing::SharedBuffer(buffer) => Some(&**buffer),
        }
    }

    /// Whether pixels may be written.
    pub fn is_writable(&self) -> bool {
        !matches!(self.backing, Backing::MappedFile(_))
    }

    fn assert_writable(&self) {
        if let Backing::MappedFile(file) = &self.backing {
            panic!(
                "bitmap backed by read-only mapping of {} cannot be written",
                file.path().display()
            );
        }
    }

    fn assert_row(&self, y: u32) {
        assert!(
            y < self.size.height,
            "row {y} out of range for {} bitmap",
            self.size
        );
    }

    /// Purgeable pages must not be touched while volatile: a read maps the
    /// zero page over a reclaimed one and hides the loss from
    /// `set_nonvolatile`.
    fn assert_resident(&self) {
        assert!(
            !self.is_volatile(),
            "pixels of volatile {} bitmap accessed before set_nonvolatile",
            self.size
        );
    }

    fn row_ptr(&self, y: u32) -> *mut u8 {
        self.assert_resident();
        self.assert_row(y);
        // SAFETY: y < height, so the offset stays inside pitch * height.
        unsafe { self.data.as_ptr().add(y as usize * self.pitch) }
    }

    /// All pixel storage, including row padding.
    ///
    /// Every pixel accessor panics while the bitmap is volatile.
    pub fn as_bytes(&self) -> &[u8] {
        self.assert_resident();
        // SAFETY: every backing covers pitch * height bytes.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.size_in_bytes()) }
    }

    /// All pixel storage, including row padding.
    ///
    /// # Panics
    ///
    /// Panics for file-backed bitmaps.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.assert_writable();
        self.assert_resident();
        // SAFETY: every writable backing covers pitch * height bytes.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.size_in_bytes()) }
    }

    /// The full `pitch` bytes of row `y`.
    pub fn row_bytes(&self, y: u32) -> &[u8] {
        let ptr = self.row_ptr(y);
        // SAFETY: row_ptr checked the row; one row spans pitch bytes.
        unsafe { std::slice::from_raw_parts(ptr, self.pitch) }
    }

    /// The full `pitch` bytes of row `y`.
    pub fn row_bytes_mut(&mut self, y: u32) -> &mut [u8] {
        self.assert_writable();
        let ptr = self.row_ptr(y);
        // SAFETY: row_ptr checked the row; one row spans pitch bytes.
        unsafe { std::slice::from_raw_parts_mut(ptr, self.pitch) }
    }

    /// The `width` pixels of row `y` of a 32-bit bitmap.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of range or the bitmap is `Indexed8`.
    pub fn scanline(&self, y: u32) -> &[Rgba32] {
        self.assert_32bit("scanline");
        let ptr = self.row_ptr(y);
        // SAFETY: rows of 32-bit bitmaps hold width pixels and start 4-byte
        // aligned (page-aligned mappings, checked wrapper pointers, pitch a
        // multiple of 16 or of the caller's choosing).
        unsafe { std::slice::from_raw_parts(ptr.cast::<Rgba32>(), self.size.width as usize) }
    }

    /// The `width` pixels of row `y` of a 32-bit bitmap.
    pub fn scanline_mut(&mut self, y: u32) -> &mut [Rgba32] {
        self.assert_32bit("scanline_mut");
        self.assert_writable();
        let ptr = self.row_ptr(y);
        // SAFETY: see `scanline`; &mut self gives exclusive access.
        unsafe { std::slice::from_raw_parts_mut(ptr.cast::<Rgba32>(), self.size.width as usize) }
    }

    /// The `width` palette indices of row `y` of an `Indexed8` bitmap.
    pub fn scanline_u8(&self, y: u32) -> &[u8] {
        self.assert_indexed("scanline_u8");
        &self.row_bytes(y)[..self.size.width as usize]
    }

    /// The `width` palette indices of row `y` of an `Indexed8` bitmap.
    pub fn scanline_u8_mut(&mut self, y: u32) -> &mut [u8] {
        self.assert_indexed("scanline_u8_mut");
        let width = self.size.width as usize;
        &mut self.row_bytes_mut(y)[..width]
    }

    fn assert_32bit(&self, op: &str) {
        assert!(
            self.format.is_32bit(),
            "{op} needs an RGB32 or RGBA32 bitmap, got {}",
            self.format
        );
    }

    fn assert_indexed(&self, op: &str) {
        assert!(
            self.format == BitmapFormat::Indexed8,
            "{op} needs an Indexed8 bitmap, got {}",
            self.format
        );
    }

    /// Color at `(x, y)`.
    ///
    /// `Indexed8` pixels resolve through the palette; `RGB32` pixels are
    /// reported opaque.
    pub fn get_pixel(&self, x: u32, y: u32) -> Color {
        assert!(x < self.size.width, "column {x} out of range for {} bitmap", self.size);
        match self.format {
            BitmapFormat::Indexed8 => {
                let index = self.scanline_u8(y)[x as usize];
                self.palette_color(index)
            }
            BitmapFormat::Rgb32 => Color::from_argb(0xff00_0000 | self.scanline(y)[x as usize]),
            BitmapFormat::Rgba32 => Color::from_argb(self.scanline(y)[x as usize]),
        }
    }

    /// Store `color` at `(x, y)` of a 32-bit bitmap.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        assert!(x < self.size.width, "column {x} out of range for {} bitmap", self.size);
        self.scanline_mut(y)[x as usize] = color.value();
    }

    /// Overwrite every visible pixel with `color`.
    ///
    /// Row padding is left alone.
    ///
    /// # Panics
    ///
    /// Panics for `Indexed8` and file-backed bitmaps.
    pub fn fill(&mut self, color: Color) {
        assert!(
            self.format.is_32bit(),
            "fill needs an RGB32 or RGBA32 bitmap, got {}",
            self.format
        );
        let value = color.value();
        for y in 0..self.size.height {
            self.scanline_mut(y).fill(value);
        }
    }

    /// The palette of an `Indexed8` bitmap.
    pub fn palette(&self) -> Option<&[Rgba32; PALETTE_SIZE]> {
        self.palette.as_deref()
    }

    /// Palette entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap has no palette.
    pub fn palette_color(&self, index: u8) -> Color {
        match &self.palette {
            Some(palette) => Color::from_argb(palette[index as usize]),
            None => panic!("{} bitmap has no palette", self.format),
        }
    }

    /// Set palette entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap has no palette.
    pub fn set_palette_color(&mut self, index: u8, color: Color) {
        match &mut self.palette {
            Some(palette) => palette[index as usize] = color.value(),
            None => panic!("{} bitmap has no palette", self.format),
        }
    }

    /// Let the kernel reclaim the pixel memory under pressure.
    ///
    /// No-op when already volatile.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap is not purgeable or the kernel rejects the hint.
    pub fn set_volatile(&mut self) {
        match &mut self.backing {
            Backing::Owned(mapping) if mapping.is_purgeable() => mapping.set_volatile(),
            _ => panic!("set_volatile on a non-purgeable {} bitmap", self.size),
        }
    }

    /// Take the pixel memory back from the kernel.
    ///
    /// Returns `false` if pages were reclaimed while volatile; the contents
    /// are then undefined and must be redrawn. Returns `true` without doing
    /// anything when the bitmap is not volatile.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap is not purgeable.
    #[must_use = "pixel contents are undefined when this returns false"]
    pub fn set_nonvolatile(&mut self) -> bool {
        match &mut self.backing {
            Backing::Owned(mapping) if mapping.is_purgeable() => mapping.set_nonvolatile(),
            _ => panic!("set_nonvolatile on a non-purgeable {} bitmap", self.size),
        }
    }

    /// Rename the anonymous mapping shown in `/proc/<pid>/maps`.
    ///
    /// # Panics
    ///
    /// Panics if the bitmap does not own its mapping.
    pub fn set_mmap_name(&mut self, name: &str) {
        match &mut self.backing {
            Backing::Owned(mapping) => mapping.set_name(name),
            _ => panic!("set_mmap_name on a bitmap that does not own its mapping"),
        }
    }

    /// Diagnostic name of an owned mapping.
    pub fn mmap_name(&self) -> Option<&str> {
        match &self.backing {
            Backing::Owned(mapping) => Some(mapping.name()),
            _ => None,
        }
    }
}

/// `pitch * height`, panicking when it does not fit in `usize`.
fn storage_len(pitch: usize, size: Size) -> usize {
    pitch.checked_mul(size.height as usize).unwrap_or_else(|| {
        panic!("{size} bitmap with pitch {pitch} needs more than usize::MAX bytes")
    })
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("pitch", &self.pitch)
            .field("backing", &self.backing_kind())
            .field("data", &self.data)
            .finish()
    }
}

// SAFETY: Bitmap is Send + Sync because:
// - Every backing is Send + Sync, wrapped and shared memory by the contracts
//   of create_wrapper and create_with_shared_buffer
// - Pixel writes and purge transitions require &mut self
unsafe impl Send for Bitmap {}
unsafe impl Sync for Bitmap {}

const _: () = assert!(BYTES_PER_PIXEL == std::mem::size_of::<Rgba32>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_layout() {
        let bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(10, 7));
        assert_eq!(bitmap.width(), 10);
        assert_eq!(bitmap.height(), 7);
        assert_eq!(bitmap.pitch(), 48);
        assert_eq!(bitmap.size_in_bytes(), 48 * 7);
        assert_eq!(bitmap.backing_kind(), BackingKind::Anonymous);
        assert!(bitmap.owns_mapping());
        assert!(!bitmap.is_purgeable());
        assert!(!bitmap.is_volatile());
        assert_eq!(bitmap.residency(), None);
        assert!(bitmap.palette().is_none());
        assert!(bitmap.ipc_handle().is_none());
        assert_eq!(bitmap.mmap_name(), Some("bitmap:10x7"));
    }

    #[test]
    fn test_create_is_zeroed() {
        let bitmap = Bitmap::create(BitmapFormat::Rgb32, Size::new(33, 9));
        assert!(bitmap.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_indexed8_has_palette() {
        let mut bitmap = Bitmap::create(BitmapFormat::Indexed8, Size::new(4, 4));
        let palette = bitmap.palette().unwrap();
        assert_eq!(palette.len(), PALETTE_SIZE);
        assert!(palette.iter().all(|&c| c == 0));

        bitmap.set_palette_color(7, Color::from_rgb(1, 2, 3));
        bitmap.scanline_u8_mut(2)[3] = 7;
        assert_eq!(bitmap.get_pixel(3, 2), Color::from_rgb(1, 2, 3));
        assert_eq!(bitmap.get_pixel(0, 0), Color::TRANSPARENT);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_size_panics() {
        let _ = Bitmap::create(BitmapFormat::Rgba32, Size::new(0, 5));
    }

    #[test]
    #[should_panic(expected = "no palette")]
    fn test_palette_on_rgb_panics() {
        let mut bitmap = Bitmap::create(BitmapFormat::Rgb32, Size::new(2, 2));
        bitmap.set_palette_color(0, Color::WHITE);
    }

    #[test]
    fn test_fill_leaves_padding() {
        let mut bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(3, 4));
        assert_eq!(bitmap.pitch(), 16);
        bitmap.fill(Color::from_argb(0x1122_3344));
        for y in 0..4 {
            assert!(bitmap.scanline(y).iter().all(|&p| p == 0x1122_3344));
            assert!(bitmap.row_bytes(y)[12..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    #[should_panic(expected = "fill needs")]
    fn test_fill_indexed_panics() {
        let mut bitmap = Bitmap::create(BitmapFormat::Indexed8, Size::new(2, 2));
        bitmap.fill(Color::WHITE);
    }

    #[test]
    fn test_get_set_pixel() {
        let mut bitmap = Bitmap::create(BitmapFormat::Rgb32, Size::new(5, 5));
        bitmap.set_pixel(4, 1, Color::from_argb(0x0012_3456));
        assert_eq!(bitmap.scanline(1)[4], 0x0012_3456);
        assert_eq!(bitmap.get_pixel(4, 1), Color::from_rgb(0x12, 0x34, 0x56));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_row_out_of_range_panics() {
        let bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(2, 2));
        let _ = bitmap.scanline(2);
    }

    #[test]
    fn test_purgeable_state() {
        let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgba32, Size::new(100, 100));
        assert!(bitmap.is_purgeable());
        assert_eq!(bitmap.backing_kind(), BackingKind::Purgeable);
        assert_eq!(bitmap.residency(), Some(Residency::Resident));

        bitmap.fill(Color::from_rgb(9, 8, 7));
        bitmap.set_volatile();
        assert!(bitmap.is_volatile());
        assert!(bitmap.set_nonvolatile());
        assert!(!bitmap.is_volatile());
        assert!(bitmap.set_nonvolatile());
    }

    #[test]
    fn test_reclaimed_pages_are_reported() {
        let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgba32, Size::new(64, 64));
        bitmap.fill(Color::WHITE);
        bitmap.set_volatile();

        // Drop the pages the way reclaim would.
        unsafe {
            rustix::mm::madvise(
                bitmap.data.as_ptr().cast(),
                bitmap.size_in_bytes(),
                rustix::mm::Advice::LinuxDontNeed,
            )
            .unwrap();
        }

        assert!(!bitmap.set_nonvolatile());
        assert_eq!(bitmap.residency(), Some(Residency::Resident));
        assert!(bitmap.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "before set_nonvolatile")]
    fn test_read_while_volatile_panics() {
        let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgba32, Size::new(16, 16));
        bitmap.set_volatile();
        let _ = bitmap.get_pixel(0, 0);
    }

    #[test]
    #[should_panic(expected = "before set_nonvolatile")]
    fn test_bytes_while_volatile_panics() {
        let mut bitmap = Bitmap::create_purgeable(BitmapFormat::Rgb32, Size::new(16, 16));
        bitmap.set_volatile();
        let _ = bitmap.as_bytes();
    }

    #[test]
    #[should_panic(expected = "non-purgeable")]
    fn test_volatile_on_plain_bitmap_panics() {
        let mut bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(8, 8));
        bitmap.set_volatile();
    }

    #[test]
    fn test_wrapper_pitch_is_kept() {
        let mut pixels = vec![0u32; 10 * 3];
        let data = NonNull::new(pixels.as_mut_ptr().cast::<u8>()).unwrap();
        let mut bitmap =
            unsafe { Bitmap::create_wrapper(BitmapFormat::Rgba32, Size::new(7, 3), 40, data) };
        assert_eq!(bitmap.pitch(), 40);
        assert_eq!(bitmap.backing_kind(), BackingKind::Wrapped);
        assert!(!bitmap.owns_mapping());
        assert_eq!(bitmap.mmap_name(), None);

        bitmap.fill(Color::WHITE);
        drop(bitmap);
        for row in pixels.chunks(10) {
            assert!(row[..7].iter().all(|&p| p == 0xffff_ffff));
            assert!(row[7..].iter().all(|&p| p == 0));
        }
    }

    #[test]
    #[should_panic(expected = "smaller than one")]
    fn test_wrapper_small_pitch_panics() {
        let mut pixels = vec![0u32; 16];
        let data = NonNull::new(pixels.as_mut_ptr().cast::<u8>()).unwrap();
        let _ = unsafe { Bitmap::create_wrapper(BitmapFormat::Rgb32, Size::new(4, 4), 8, data) };
    }

    #[test]
    fn test_shared_buffer_bitmap() {
        let buffer = SharedBuffer::create_with_size(64 * 4).unwrap();
        let bitmap = unsafe {
            Bitmap::create_with_shared_buffer(
                BitmapFormat::Rgb32,
                Arc::clone(&buffer),
                Size::new(16, 4),
            )
        };
        assert_eq!(bitmap.backing_kind(), BackingKind::SharedBuffer);
        assert!(!bitmap.owns_mapping());
        assert_eq!(bitmap.shared_buffer().unwrap().id(), buffer.id());
        assert!(matches!(bitmap.ipc_handle(), Some(IpcHandle::Fd { size: 256, .. })));
        assert_eq!(Arc::strong_count(&buffer), 2);
        drop(bitmap);
        assert_eq!(Arc::strong_count(&buffer), 1);
    }

    #[test]
    #[should_panic(expected = "cannot be Indexed8")]
    fn test_shared_buffer_indexed_panics() {
        let buffer = SharedBuffer::create_with_size(4096).unwrap();
        let _ = unsafe {
            Bitmap::create_with_shared_buffer(BitmapFormat::Indexed8, buffer, Size::new(4, 4))
        };
    }

    #[test]
    #[should_panic(expected = "needs")]
    fn test_shared_buffer_too_small_panics() {
        let buffer = SharedBuffer::create_with_size(16).unwrap();
        let _ = unsafe {
            Bitmap::create_with_shared_buffer(BitmapFormat::Rgba32, buffer, Size::new(4, 4))
        };
    }

    #[test]
    #[should_panic(expected = "needs more than usize::MAX")]
    fn test_shared_buffer_size_overflow_panics() {
        let buffer = SharedBuffer::create_with_size(4096).unwrap();
        let _ = unsafe {
            Bitmap::create_with_shared_buffer(
                BitmapFormat::Rgba32,
                buffer,
                Size::new(u32::MAX, 1 << 30),
            )
        };
    }

    #[test]
    fn test_to_shareable_owns_its_buffer() {
        let bitmap = Arc::new(Bitmap::create(BitmapFormat::Rgba32, Size::new(8, 8)));
        let shareable = bitmap.to_shareable_bitmap().unwrap();
        assert_eq!(Arc::strong_count(shareable.shared_buffer().unwrap()), 1);
    }

    #[test]
    #[should_panic(expected = "cannot be converted")]
    fn test_to_shareable_indexed_panics() {
        let bitmap = Arc::new(Bitmap::create(BitmapFormat::Indexed8, Size::new(4, 4)));
        let _ = bitmap.to_shareable_bitmap();
    }

    #[test]
    #[should_panic(expected = "does not own")]
    fn test_set_mmap_name_on_wrapper_panics() {
        let mut pixels = vec![0u32; 4];
        let data = NonNull::new(pixels.as_mut_ptr().cast::<u8>()).unwrap();
        let mut bitmap =
            unsafe { Bitmap::create_wrapper(BitmapFormat::Rgba32, Size::new(2, 2), 8, data) };
        bitmap.set_mmap_name("nope");
    }

    #[test]
    fn test_set_mmap_name() {
        let mut bitmap = Bitmap::create(BitmapFormat::Rgba32, Size::new(4, 4));
        bitmap.set_mmap_name("cursor");
        assert_eq!(bitmap.mmap_name(), Some("cursor"));
    }

    #[test]
    fn test_debug_output() {
        let bitmap = Bitmap::create(BitmapFormat::Rgb32, Size::new(2, 3));
        let debug = format!("{bitmap:?}");
        assert!(debug.contains("Rgb32"));
        assert!(debug.contains("Anonymous"));
    }
}
