//! Pixel format, geometry and color primitives.

use crate::defaults::BYTES_PER_PIXEL;
use std::fmt;

/// A 32-bit pixel value laid out as `0xAARRGGBB`.
pub type Rgba32 = u32;

/// Pixel format of a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitmapFormat {
    /// One byte per pixel, indexing a 256-entry palette.
    Indexed8,
    /// 32-bit `0x00RRGGBB`; the alpha byte is ignored.
    Rgb32,
    /// 32-bit `0xAARRGGBB`.
    Rgba32,
}

impl BitmapFormat {
    /// Whether bitmaps of this format carry a palette.
    #[inline]
    pub fn has_palette(self) -> bool {
        self == BitmapFormat::Indexed8
    }

    /// Whether pixels are stored as 32-bit color words.
    #[inline]
    pub fn is_32bit(self) -> bool {
        matches!(self, BitmapFormat::Rgb32 | BitmapFormat::Rgba32)
    }

    /// Bits of meaningful data per pixel.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            BitmapFormat::Indexed8 => 8,
            BitmapFormat::Rgb32 | BitmapFormat::Rgba32 => 32,
        }
    }
}

impl fmt::Display for BitmapFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BitmapFormat::Indexed8 => "Indexed8",
            BitmapFormat::Rgb32 => "RGB32",
            BitmapFormat::Rgba32 => "RGBA32",
        };
        f.write_str(name)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes of visible pixel data in one row, excluding padding.
    pub const fn row_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(Rgba32);

impl Color {
    /// Opaque black.
    pub const BLACK: Color = Color::from_rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Color = Color::from_rgb(255, 255, 255);
    /// Fully transparent black.
    pub const TRANSPARENT: Color = Color::from_argb(0);

    /// Opaque color from 8-bit channels.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_rgba(r, g, b, 0xff)
    }

    /// Color from 8-bit channels including alpha.
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    /// Color from a packed `0xAARRGGBB` word.
    pub const fn from_argb(value: Rgba32) -> Self {
        Self(value)
    }

    /// Packed `0xAARRGGBB` value.
    #[inline]
    pub const fn value(self) -> Rgba32 {
        self.0
    }

    /// Red channel.
    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Green channel.
    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Blue channel.
    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Alpha channel.
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

impl From<Rgba32> for Color {
    fn from(value: Rgba32) -> Self {
        Self(value)
    }
}
