//! Error types for the RFB client.

use rfb_pixelbuffer::PixelBufferError;
use std::io;
use thiserror::Error;

/// Errors that can occur while connecting to or rendering a VNC session.
#[derive(Debug, Error)]
pub enum RfbClientError {
    /// `connect` was called while an earlier attempt on the same manager is unresolved.
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    /// The attempt was cancelled by the caller before it resolved.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Transport-level error (TCP, socket operations).
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Connection failed (TCP connection establishment failed).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout.
    #[error("Connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// RFB handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Security negotiation failed.
    #[error("Security negotiation failed: {0}")]
    Security(String),

    /// Authentication failed (wrong password, refused by server, etc.).
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Protocol error (malformed message, unexpected data).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A render pass could not access the host framebuffer.
    #[error("Render error: {0}")]
    Render(#[from] PixelBufferError),

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Broad classes of failure, for display and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Socket, DNS, timeout.
    Transport,
    /// Version negotiation or malformed handshake data.
    Handshake,
    /// Security negotiation or credentials.
    Authentication,
    /// Invalid parameters supplied by the caller.
    Configuration,
    /// Unexpected data after the handshake, or a closed session.
    Protocol,
    /// Host framebuffer access.
    Rendering,
}

impl RfbClientError {
    /// Failure class, or `None` for outcomes that are not failures
    /// ([`Cancelled`](Self::Cancelled) and [`AlreadyConnecting`](Self::AlreadyConnecting)).
    #[must_use]
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::AlreadyConnecting | Self::Cancelled => None,
            Self::Transport(_) | Self::ConnectionFailed(_) | Self::Timeout(_) => {
                Some(FailureCategory::Transport)
            }
            Self::Handshake(_) => Some(FailureCategory::Handshake),
            Self::Security(_) | Self::AuthFailed(_) => Some(FailureCategory::Authentication),
            Self::Config(_) => Some(FailureCategory::Configuration),
            Self::Protocol(_) | Self::ConnectionClosed => Some(FailureCategory::Protocol),
            Self::Render(_) => Some(FailureCategory::Rendering),
        }
    }

    /// True if the caller cancelled the attempt.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Retryable errors are transient network issues that may succeed when the
    /// caller tries again. Nothing in this crate retries automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Handshake(_) | Self::ConnectionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfb_pixelbuffer::HostPixelFormat;

    #[test]
    fn test_error_categorization() {
        assert_eq!(
            RfbClientError::Transport(io::Error::from(io::ErrorKind::ConnectionRefused)).category(),
            Some(FailureCategory::Transport)
        );
        assert_eq!(
            RfbClientError::Timeout(std::time::Duration::from_secs(10)).category(),
            Some(FailureCategory::Transport)
        );
        assert_eq!(
            RfbClientError::AuthFailed("wrong password".to_string()).category(),
            Some(FailureCategory::Authentication)
        );
        assert_eq!(
            RfbClientError::Render(PixelBufferError::UnsupportedPixelFormat(
                HostPixelFormat::Gray8
            ))
            .category(),
            Some(FailureCategory::Rendering)
        );
    }

    #[test]
    fn test_cancellation_is_not_a_failure() {
        assert!(RfbClientError::Cancelled.is_cancelled());
        assert_eq!(RfbClientError::Cancelled.category(), None);
        assert_eq!(RfbClientError::AlreadyConnecting.category(), None);
        assert!(!RfbClientError::Cancelled.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(RfbClientError::ConnectionFailed("refused".into()).is_retryable());
        assert!(RfbClientError::Handshake("garbage".into()).is_retryable());
        assert!(!RfbClientError::AuthFailed("no".into()).is_retryable());
        assert!(!RfbClientError::Config("no host".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RfbClientError::AuthFailed("wrong password".to_string());
        assert_eq!(err.to_string(), "Authentication failed: wrong password");

        let err = RfbClientError::Timeout(std::time::Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
