//! Host windowing toolkit vocabulary.
//!
//! The display bridge never owns display memory. The host toolkit locks its
//! writable bitmap and hands over a [`LockedBuffer`]; the bridge wraps it for
//! exactly one render pass and gives it back through [`LockedBuffer::unlock`].
//! [`HostSurface`] is the toolkit side of that exchange: it produces locks and
//! accepts redraw requests.

use crate::PixelBufferError;
use rfb_common::Rect;
use std::fmt;

/// Native pixel format tag reported by the host toolkit.
///
/// Only [`Rgb565`](Self::Rgb565), [`Rgba8888`](Self::Rgba8888) and
/// [`Bgra8888`](Self::Bgra8888) can be handed to the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPixelFormat {
    /// 16-bit 5-6-5 RGB.
    Rgb565,
    /// 32-bit RGBA, red in the lowest byte.
    Rgba8888,
    /// 32-bit BGRA, blue in the lowest byte.
    Bgra8888,
    /// 24-bit packed RGB.
    Rgb888,
    /// 8-bit grayscale.
    Gray8,
    /// Any tag this crate does not know about.
    Other(u32),
}

impl HostPixelFormat {
    /// Numeric tag as used by the toolkit.
    pub fn tag(self) -> u32 {
        match self {
            Self::Rgb565 => 0,
            Self::Rgba8888 => 1,
            Self::Bgra8888 => 2,
            Self::Rgb888 => 3,
            Self::Gray8 => 4,
            Self::Other(tag) => tag,
        }
    }

    /// Interpret a numeric toolkit tag.
    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => Self::Rgb565,
            1 => Self::Rgba8888,
            2 => Self::Bgra8888,
            3 => Self::Rgb888,
            4 => Self::Gray8,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for HostPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(tag) => write!(f, "Other({tag})"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// Host pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostSize {
    pub width: u32,
    pub height: u32,
}

impl HostSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Horizontal and vertical dots per inch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dpi {
    pub x: f64,
    pub y: f64,
}

impl Dpi {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Dpi {
    fn default() -> Self {
        Self::new(96.0, 96.0)
    }
}

/// A host pixel buffer that is currently locked for exclusive access.
///
/// Implementations release the toolkit lock in [`unlock`](Self::unlock); the
/// bridge guarantees that is called exactly once.
pub trait LockedBuffer: Send {
    /// Address of the first pixel. Valid only while the lock is held.
    fn address(&self) -> *mut u8;

    /// Pixel dimensions of the locked bitmap.
    fn size(&self) -> HostSize;

    /// Length of one row in bytes, including any padding.
    fn row_bytes(&self) -> usize;

    /// Native pixel format of the bitmap.
    fn format(&self) -> HostPixelFormat;

    /// Resolution of the bitmap.
    fn dpi(&self) -> Dpi;

    /// The locked memory, `row_bytes * height` bytes long.
    fn pixels_mut(&mut self) -> &mut [u8];

    /// Release the toolkit lock.
    fn unlock(self: Box<Self>);
}

/// Toolkit side of a drawable surface.
pub trait HostSurface: Send + Sync {
    /// Lock the surface's writable bitmap.
    fn lock(&self) -> Result<Box<dyn LockedBuffer>, PixelBufferError>;

    /// Schedule a redraw of `region`.
    fn invalidate(&self, region: Rect);
}
