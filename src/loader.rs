//! Image decoders that produce bitmaps.
//!
//! # Supported Formats
//!
//! | Format | Feature Flag | Loader |
//! |--------|--------------|--------|
//! | PNG | `image-png` | [`PngLoader`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use parallax_bitmap::loader::{ImageLoader, PngLoader};
//!
//! let bitmap = PngLoader::new().load("icon.png".as_ref())?;
//! ```

use crate::bitmap::Bitmap;
use crate::defaults::LOADER_MAX_DIMENSION;
use crate::error::Result;
use std::path::Path;

/// Something that turns an image file into a bitmap.
pub trait ImageLoader {
    /// Decode the image at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid image.
    fn load(&self, path: &Path) -> Result<Bitmap>;
}

/// Limits and placement for decoded images.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Largest accepted width in pixels.
    pub max_width: u32,
    /// Largest accepted height in pixels.
    pub max_height: u32,
    /// Decode into purgeable memory.
    pub purgeable: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_width: LOADER_MAX_DIMENSION,
            max_height: LOADER_MAX_DIMENSION,
            purgeable: true,
        }
    }
}

// ============================================================================
// PNG Loader (using png crate)
// ============================================================================

#[cfg(feature = "image-png")]
mod png_loader {
    use super::*;
    use crate::error::Error;
    use crate::format::{BitmapFormat, Color, Size};
    use std::fs::File;
    use std::io::BufReader;

    /// PNG loader using the png crate (pure Rust).
    ///
    /// Images with an alpha channel (or a transparency chunk) decode to
    /// `RGBA32`, everything else to `RGB32`. Palettes, low bit depths and
    /// 16-bit channels are expanded to 8-bit color.
    #[derive(Debug, Clone, Default)]
    pub struct PngLoader {
        config: LoaderConfig,
    }

    impl PngLoader {
        /// Create a loader with default limits.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a loader with custom limits.
        pub fn with_config(config: LoaderConfig) -> Self {
            Self { config }
        }

        /// The active configuration.
        pub fn config(&self) -> &LoaderConfig {
            &self.config
        }
    }

    impl ImageLoader for PngLoader {
        fn load(&self, path: &Path) -> Result<Bitmap> {
            let file = File::open(path)?;

            let mut decoder = png::Decoder::new(BufReader::new(file));
            decoder
                .set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
            let mut reader = decoder
                .read_info()
                .map_err(|e| Error::Decode(format!("{}: {e}", path.display())))?;

            let (width, height) = {
                let info = reader.info();
                (info.width, info.height)
            };
            if width > self.config.max_width || height > self.config.max_height {
                return Err(Error::UnsupportedImage(format!(
                    "{}: {width}x{height} exceeds {}x{}",
                    path.display(),
                    self.config.max_width,
                    self.config.max_height
                )));
            }

            let mut pixels = vec![0u8; reader.output_buffer_size()];
            let frame = reader
                .next_frame(&mut pixels)
                .map_err(|e| Error::Decode(format!("{}: {e}", path.display())))?;

            if frame.bit_depth != png::BitDepth::Eight {
                return Err(Error::UnsupportedImage(format!(
                    "{}: {:?} bit depth after expansion",
                    path.display(),
                    frame.bit_depth
                )));
            }
            let (format, channels) = match frame.color_type {
                png::ColorType::Grayscale => (BitmapFormat::Rgb32, 1),
                png::ColorType::GrayscaleAlpha => (BitmapFormat::Rgba32, 2),
                png::ColorType::Rgb => (BitmapFormat::Rgb32, 3),
                png::ColorType::Rgba => (BitmapFormat::Rgba32, 4),
                png::ColorType::Indexed => {
                    return Err(Error::UnsupportedImage(format!(
                        "{}: palette was not expanded",
                        path.display()
                    )));
                }
            };

            let size = Size::new(frame.width, frame.height);
            let mut bitmap = if self.config.purgeable {
                Bitmap::try_create_purgeable(format, size)?
            } else {
                Bitmap::try_create(format, size)?
            };

            let row_len = frame.width as usize * channels;
            let rows = pixels.chunks(frame.line_size).take(frame.height as usize);
            for (y, src) in (0..frame.height).zip(rows) {
                let dst = bitmap.scanline_mut(y);
                for (pixel, chunk) in dst.iter_mut().zip(src[..row_len].chunks_exact(channels)) {
                    let color = match chunk {
                        &[l] => Color::from_rgb(l, l, l),
                        &[l, a] => Color::from_rgba(l, l, l, a),
                        &[r, g, b] => Color::from_rgb(r, g, b),
                        &[r, g, b, a] => Color::from_rgba(r, g, b, a),
                        _ => unreachable!("chunks_exact yields {channels} bytes"),
                    };
                    *pixel = color.value();
                }
            }

            tracing::debug!(path = %path.display(), %size, %format, "decoded PNG");
            Ok(bitmap)
        }
    }
}

#[cfg(feature = "image-png")]
pub use png_loader::PngLoader;
