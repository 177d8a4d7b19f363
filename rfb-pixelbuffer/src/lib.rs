//! Host framebuffer bridge for the RFB/VNC client.
//!
//! This crate sits between the host windowing toolkit's locked pixel buffer
//! and the protocol engine's renderer:
//!
//! - [`PixelFormat`]: protocol-level pixel layout descriptions
//! - [`convert`]: translation of host sizes and pixel formats to protocol terms
//! - [`FramebufferReference`]: a lifetime-guarded view over one locked buffer
//! - [`FramebufferSource`]: hands out one reference per render pass
//! - [`MemorySurface`]: a windowless host surface
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rfb_pixelbuffer::{FramebufferSource, HostPixelFormat, MemorySurface, PixelBufferError};
//!
//! let surface = Arc::new(MemorySurface::new(640, 480, HostPixelFormat::Bgra8888));
//! let source = FramebufferSource::new(Arc::clone(&surface));
//!
//! source.render_pass(|fb| {
//!     let stride = fb.row_bytes()?;
//!     fb.with_pixels(|pixels| pixels[..stride].fill(0xFF))
//! })?;
//!
//! assert_eq!(surface.unlock_count(), 1);
//! # Ok::<(), PixelBufferError>(())
//! ```

pub mod convert;
pub mod error;
pub mod format;
pub mod host;
pub mod memory;
pub mod reference;
pub mod source;

pub use error::PixelBufferError;
pub use format::PixelFormat;
pub use host::{Dpi, HostPixelFormat, HostSize, HostSurface, LockedBuffer};
pub use memory::MemorySurface;
pub use reference::FramebufferReference;
pub use source::FramebufferSource;
