//! Protocol-level pixel format descriptions.
//!
//! [`PixelFormat`] describes how one pixel is laid out in memory in the terms
//! the RFB protocol engine understands: storage width, color depth, byte order,
//! and the bit position and range of every channel.
//!
//! # Channel Layout
//!
//! - **bits_per_pixel**: Storage size in bits (16 or 32 for the host formats we accept)
//! - **depth**: Number of significant bits (sum of all channel widths)
//! - **big_endian**: Byte order for multi-byte pixels
//! - **red/green/blue/alpha_max**: Maximum value of each channel (e.g., 255 for 8-bit)
//! - **red/green/blue/alpha_shift**: Bit position of the least significant bit of each channel
//!
//! A channel with `max == 0` is absent. Only true color formats are described;
//! color maps never reach this layer.
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::PixelFormat;
//!
//! let pf = PixelFormat::bgra8888();
//! assert_eq!(pf.bytes_per_pixel(), 4);
//! assert!(pf.has_alpha());
//! assert_eq!(pf.red_shift, 16);
//! ```

use std::fmt;

/// Describes an RFB pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Short human readable name, used in logs.
    pub name: &'static str,

    /// Bits used per pixel (bpp), e.g., 32 for BGRA8888.
    pub bits_per_pixel: u8,

    /// Significant bits per pixel, e.g., 32 for BGRA8888 or 16 for RGB565.
    pub depth: u8,

    /// Byte order for multi-byte pixels (`true` = big endian, `false` = little endian).
    pub big_endian: bool,

    /// Maximum red component value in this format.
    pub red_max: u16,

    /// Maximum green component value in this format.
    pub green_max: u16,

    /// Maximum blue component value in this format.
    pub blue_max: u16,

    /// Maximum alpha component value, zero if the format carries no alpha.
    pub alpha_max: u16,

    /// Bit shift for the least significant bit of the red component.
    pub red_shift: u8,

    /// Bit shift for the least significant bit of the green component.
    pub green_shift: u8,

    /// Bit shift for the least significant bit of the blue component.
    pub blue_shift: u8,

    /// Bit shift for the least significant bit of the alpha component.
    pub alpha_shift: u8,
}

impl PixelFormat {
    /// Returns bytes-per-pixel (storage width), rounded up to the nearest byte.
    ///
    /// ```
    /// use rfb_pixelbuffer::PixelFormat;
    ///
    /// assert_eq!(PixelFormat::rgb565().bytes_per_pixel(), 2);
    /// assert_eq!(PixelFormat::rgba8888().bytes_per_pixel(), 4);
    /// ```
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// True if the format has an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.alpha_max != 0
    }

    /// 16bpp little-endian RGB565: red at bit 11, green at bit 5, blue at bit 0.
    pub const fn rgb565() -> Self {
        Self {
            name: "RGB565",
            bits_per_pixel: 16,
            depth: 16,
            big_endian: false,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            alpha_max: 0,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
            alpha_shift: 0,
        }
    }

    /// 32bpp little-endian RGBA8888.
    ///
    /// In memory a pixel with R=0xAA, G=0xBB, B=0xCC, A=0xDD is stored as
    /// `[0xAA, 0xBB, 0xCC, 0xDD]`.
    pub const fn rgba8888() -> Self {
        Self {
            name: "RGBA8888",
            bits_per_pixel: 32,
            depth: 32,
            big_endian: false,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            alpha_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
            alpha_shift: 24,
        }
    }

    /// 32bpp little-endian BGRA8888.
    ///
    /// In memory a pixel with R=0xAA, G=0xBB, B=0xCC, A=0xDD is stored as
    /// `[0xCC, 0xBB, 0xAA, 0xDD]`.
    pub const fn bgra8888() -> Self {
        Self {
            name: "BGRA8888",
            bits_per_pixel: 32,
            depth: 32,
            big_endian: false,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            alpha_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
            alpha_shift: 24,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}bpp, depth {})", self.name, self.bits_per_pixel, self.depth)
    }
}
