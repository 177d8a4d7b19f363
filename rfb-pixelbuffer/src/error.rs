//! Error types for the framebuffer bridge.

use crate::host::HostPixelFormat;
use thiserror::Error;

/// Errors raised while translating or accessing a host framebuffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PixelBufferError {
    /// An accessor was called on a framebuffer reference that has already been released.
    #[error("{name} has already been released")]
    ObjectDisposed {
        /// Name of the released reference.
        name: String,
    },

    /// The host handed over a pixel format outside the supported set.
    #[error("unsupported host pixel format: {0}")]
    UnsupportedPixelFormat(HostPixelFormat),

    /// The host refused to lock its buffer.
    #[error("failed to lock host framebuffer: {0}")]
    Lock(String),
}
