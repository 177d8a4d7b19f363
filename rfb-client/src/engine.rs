//! Seams between the connection core and the protocol engine.
//!
//! The connection manager never speaks RFB itself. It drives a
//! [`ProtocolEngine`], which opens a [`Session`]; the session later paints
//! into a [`FramebufferReference`] once per render pass. Server-originated
//! events leave the engine through an [`OutputHandler`], and interactive
//! credential requests go through a [`CredentialPrompt`].
//!
//! [`RfbEngine`](crate::RfbEngine) is the TCP implementation shipped with this
//! crate; tests substitute scripted engines.

use crate::config::ConnectionParameters;
use crate::errors::RfbClientError;
use futures::future::{self, BoxFuture, FutureExt};
use rfb_common::Size;
use rfb_pixelbuffer::FramebufferReference;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Anything identified on the wire by an RFB encoding number.
pub trait HasId {
    /// The encoding number.
    fn id(&self) -> i32;
}

/// Rectangle encodings the client can advertise.
///
/// Used for dispatch and for the SetEncodings list only; decoding is done by
/// the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Uncompressed pixel data.
    Raw,
    /// Copy from another screen region.
    CopyRect,
    /// Rise-and-Run-length encoding.
    Rre,
    /// 16x16 tiles with sub-rectangles.
    Hextile,
    /// JPEG or zlib compressed.
    Tight,
    /// Zlib run-length encoding in 64x64 tiles.
    Zrle,
}

impl Encoding {
    /// Default advertisement order, most preferred first.
    pub const PREFERENCE_ORDER: [Encoding; 6] = [
        Encoding::CopyRect,
        Encoding::Tight,
        Encoding::Zrle,
        Encoding::Hextile,
        Encoding::Rre,
        Encoding::Raw,
    ];

    /// Look up an encoding by wire number.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Raw),
            1 => Some(Self::CopyRect),
            2 => Some(Self::Rre),
            5 => Some(Self::Hextile),
            7 => Some(Self::Tight),
            16 => Some(Self::Zrle),
            _ => None,
        }
    }

    /// Conventional name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "Raw",
            Self::CopyRect => "CopyRect",
            Self::Rre => "RRE",
            Self::Hextile => "Hextile",
            Self::Tight => "Tight",
            Self::Zrle => "ZRLE",
        }
    }
}

impl HasId for Encoding {
    fn id(&self) -> i32 {
        match self {
            Self::Raw => 0,
            Self::CopyRect => 1,
            Self::Rre => 2,
            Self::Hextile => 5,
            Self::Tight => 7,
            Self::Zrle => 16,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// Asks the user for credentials while a connection is being established.
///
/// The returned future may stay pending for as long as the user takes to
/// answer. Resolving to `None` means the user declined, which ends the attempt
/// as cancelled.
pub trait CredentialPrompt: Send + Sync {
    /// Ask for the password of `host`.
    fn request_password<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// A prompt for non-interactive use; always declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn request_password<'a>(&'a self, _host: &'a str) -> BoxFuture<'a, Option<String>> {
        future::ready(None).boxed()
    }
}

/// Receives server-originated events.
pub trait OutputHandler: Send + Sync {
    /// The server rang the bell.
    fn bell(&self);

    /// The server's clipboard changed.
    fn clipboard_text(&self, text: &str);
}

/// An established session, opaque to the connection core beyond its
/// existence, its framebuffer and its teardown.
pub trait Session: Send + 'static {
    /// Desktop name reported by the server.
    fn name(&self) -> &str;

    /// Current remote framebuffer size.
    fn framebuffer_size(&self) -> Size;

    /// False once the remote end has closed the session.
    fn is_open(&self) -> bool;

    /// Paint the current remote framebuffer into `fb` for one render pass.
    fn paint(&mut self, fb: &FramebufferReference) -> Result<(), RfbClientError>;

    /// Tear the session down and release its transport.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Everything an engine receives for one connection attempt.
pub struct ConnectContext<'a> {
    /// Where and how to connect.
    pub parameters: &'a ConnectionParameters,
    /// Interactive credential source.
    pub prompt: &'a dyn CredentialPrompt,
    /// Sink for bell and clipboard events once the session runs.
    pub output: Arc<dyn OutputHandler>,
    /// Fires when the caller cancels the attempt.
    ///
    /// The manager drops the engine future as soon as this fires, so engines
    /// only need to consult it for work they spawn outside that future.
    pub cancel: CancellationToken,
}

impl ConnectContext<'_> {
    /// The configured password, or one obtained from the prompt.
    ///
    /// A declined prompt yields [`RfbClientError::Cancelled`].
    pub async fn password(&self) -> Result<String, RfbClientError> {
        if let Some(password) = &self.parameters.password {
            return Ok(password.clone());
        }
        tracing::debug!("requesting password for {}", self.parameters.host);
        self.prompt
            .request_password(&self.parameters.host)
            .await
            .ok_or(RfbClientError::Cancelled)
    }
}

/// The connect primitive of a protocol engine.
pub trait ProtocolEngine: Send + Sync + 'static {
    /// Session type produced on success.
    type Session: Session;

    /// Open one session.
    ///
    /// The returned future may be dropped at any await point; dropping it
    /// must release whatever transport it had opened so far.
    fn connect<'a>(
        &'a self,
        ctx: ConnectContext<'a>,
    ) -> BoxFuture<'a, Result<Self::Session, RfbClientError>>;
}
