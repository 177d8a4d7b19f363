//! Translation between host-native and protocol-level descriptors.
//!
//! Sizes translate losslessly in both directions. Pixel formats translate
//! only for the three layouts the protocol engine can render into
//! ([`HostPixelFormat::Rgb565`], [`HostPixelFormat::Rgba8888`],
//! [`HostPixelFormat::Bgra8888`]); this is a compatibility shim, not a color
//! space converter.

use crate::host::{HostPixelFormat, HostSize};
use crate::{PixelBufferError, PixelFormat};
use rfb_common::Size;

/// Convert a host size into the protocol representation.
pub fn size_to_protocol(size: HostSize) -> Size {
    Size::new(size.width, size.height)
}

/// Convert a protocol size into the host representation.
pub fn size_from_protocol(size: Size) -> HostSize {
    HostSize::new(size.width, size.height)
}

/// Map a host pixel format onto the protocol pixel format describing the same layout.
///
/// # Errors
///
/// Returns [`PixelBufferError::UnsupportedPixelFormat`] carrying the offending
/// tag for anything but RGB565, RGBA8888 and BGRA8888.
///
/// ```
/// use rfb_pixelbuffer::{convert, HostPixelFormat, PixelFormat};
///
/// assert_eq!(
///     convert::format_to_protocol(HostPixelFormat::Bgra8888).unwrap(),
///     PixelFormat::bgra8888()
/// );
/// assert!(convert::format_to_protocol(HostPixelFormat::Gray8).is_err());
/// ```
pub fn format_to_protocol(format: HostPixelFormat) -> Result<PixelFormat, PixelBufferError> {
    match format {
        HostPixelFormat::Rgb565 => Ok(PixelFormat::rgb565()),
        HostPixelFormat::Rgba8888 => Ok(PixelFormat::rgba8888()),
        HostPixelFormat::Bgra8888 => Ok(PixelFormat::bgra8888()),
        unsupported => Err(PixelBufferError::UnsupportedPixelFormat(unsupported)),
    }
}

impl From<HostSize> for Size {
    fn from(size: HostSize) -> Self {
        size_to_protocol(size)
    }
}

impl From<Size> for HostSize {
    fn from(size: Size) -> Self {
        size_from_protocol(size)
    }
}

impl TryFrom<HostPixelFormat> for PixelFormat {
    type Error = PixelBufferError;

    fn try_from(format: HostPixelFormat) -> Result<Self, Self::Error> {
        format_to_protocol(format)
    }
}
