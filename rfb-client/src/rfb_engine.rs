//! TCP protocol engine.
//!
//! [`RfbEngine`] opens a TCP connection, runs the RFB handshake and configures
//! the session (pixel format and encodings). The resulting [`RfbSession`]
//! keeps a shadow framebuffer in the negotiated pixel format; decoders write
//! into it through [`RfbSession::framebuffer_mut`] and every render pass
//! copies it into the host buffer.

use crate::config::ConnectionParameters;
use crate::engine::{ConnectContext, OutputHandler, ProtocolEngine, Session};
use crate::errors::RfbClientError;
use crate::handshake::{self, NegotiatedVersion, ServerInit};
use crate::transport;
use futures::future::{BoxFuture, FutureExt};
use rfb_common::Size;
use rfb_pixelbuffer::{FramebufferReference, PixelFormat};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MSG_BELL: u8 = 2;
const MSG_SERVER_CUT_TEXT: u8 = 3;

/// Upper bound on server clipboard text.
const MAX_CUT_TEXT_LEN: usize = 16 << 20;

/// Engine that speaks RFB over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct RfbEngine;

impl RfbEngine {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    async fn establish(ctx: ConnectContext<'_>) -> Result<RfbSession, RfbClientError> {
        let params: &ConnectionParameters = ctx.parameters;
        params.validate_session()?;

        // 1) Transport
        let mut stream = transport::connect_tcp(&params.host, params.port, params.timeout).await?;

        // 2) Version and security
        let version = handshake::negotiate_version(&mut stream).await?;
        handshake::negotiate_security(&mut stream, version).await?;

        // 3) ClientInit / ServerInit
        handshake::send_client_init(&mut stream, params.shared).await?;
        let server_init = handshake::recv_server_init(&mut stream).await?;
        tracing::info!(
            "server '{}' {}x{} ({:?})",
            server_init.name,
            server_init.framebuffer_width,
            server_init.framebuffer_height,
            version
        );

        // 4) Session configuration
        handshake::send_set_pixel_format(&mut stream, &params.pixel_format).await?;
        handshake::send_set_encodings(&mut stream, &params.encodings).await?;

        Ok(RfbSession::new(
            stream,
            version,
            server_init,
            params.pixel_format,
            ctx.output,
        ))
    }
}

impl ProtocolEngine for RfbEngine {
    type Session = RfbSession;

    fn connect<'a>(
        &'a self,
        ctx: ConnectContext<'a>,
    ) -> BoxFuture<'a, Result<Self::Session, RfbClientError>> {
        Self::establish(ctx).boxed()
    }
}

/// An established RFB session.
pub struct RfbSession {
    stream: Option<TcpStream>,
    version: NegotiatedVersion,
    name: String,
    size: Size,
    format: PixelFormat,
    framebuffer: Vec<u8>,
    output: Arc<dyn OutputHandler>,
}

impl RfbSession {
    fn new(
        stream: TcpStream,
        version: NegotiatedVersion,
        init: ServerInit,
        format: PixelFormat,
        output: Arc<dyn OutputHandler>,
    ) -> Self {
        let size = Size::new(
            u32::from(init.framebuffer_width),
            u32::from(init.framebuffer_height),
        );
        let len = size.area() as usize * usize::from(format.bytes_per_pixel());
        Self {
            stream: Some(stream),
            version,
            name: init.name,
            size,
            format,
            framebuffer: vec![0; len],
            output,
        }
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> NegotiatedVersion {
        self.version
    }

    /// Pixel format of the shadow framebuffer.
    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Tightly packed shadow framebuffer in [`pixel_format`](Self::pixel_format).
    pub fn framebuffer_mut(&mut self) -> &mut [u8] {
        &mut self.framebuffer
    }

    /// Read one server message and forward it to the output handler.
    ///
    /// Handles Bell and ServerCutText. Framebuffer updates need a decoder and
    /// are reported as a protocol error.
    pub async fn process_server_message(&mut self) -> Result<(), RfbClientError> {
        let stream = self.stream.as_mut().ok_or(RfbClientError::ConnectionClosed)?;
        let message_type = match stream.read_u8().await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stream = None;
                return Err(RfbClientError::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        };

        match message_type {
            MSG_BELL => {
                self.output.bell();
                Ok(())
            }
            MSG_SERVER_CUT_TEXT => {
                let mut padding = [0u8; 3];
                stream.read_exact(&mut padding).await?;
                let len = stream.read_u32().await? as usize;
                if len > MAX_CUT_TEXT_LEN {
                    return Err(RfbClientError::Protocol(format!(
                        "clipboard text of {} bytes exceeds limit",
                        len
                    )));
                }
                let mut text = vec![0u8; len];
                stream.read_exact(&mut text).await?;
                // ServerCutText is Latin-1.
                let text: String = text.iter().map(|&b| char::from(b)).collect();
                self.output.clipboard_text(&text);
                Ok(())
            }
            other => Err(RfbClientError::Protocol(format!(
                "unhandled server message type {}",
                other
            ))),
        }
    }

    fn remote_closed(stream: &TcpStream) -> bool {
        let mut byte = [0u8; 1];
        match stream.peek(&mut byte).now_or_never() {
            Some(Ok(0)) | Some(Err(_)) => true,
            Some(Ok(_)) | None => false,
        }
    }
}

impl Session for RfbSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn framebuffer_size(&self) -> Size {
        self.size
    }

    /// Peeks one byte without blocking. Unread server data ahead of the FIN
    /// keeps this `true` until [`process_server_message`] consumes it.
    ///
    /// [`process_server_message`]: RfbSession::process_server_message
    fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !Self::remote_closed(s))
    }

    fn paint(&mut self, fb: &FramebufferReference) -> Result<(), RfbClientError> {
        let target = fb.format()?;
        if target != self.format {
            return Err(RfbClientError::Protocol(format!(
                "host surface is {} but the session negotiated {}",
                target, self.format
            )));
        }

        let dest_size = fb.size()?;
        let row_bytes = fb.row_bytes()?;
        let bpp = usize::from(self.format.bytes_per_pixel());
        let src_stride = self.size.width as usize * bpp;
        let copy_len = self.size.width.min(dest_size.width) as usize * bpp;
        let rows = self.size.height.min(dest_size.height) as usize;
        let src = &self.framebuffer;

        fb.with_pixels(|dst| {
            for y in 0..rows {
                let from = &src[y * src_stride..y * src_stride + copy_len];
                match dst.get_mut(y * row_bytes..y * row_bytes + copy_len) {
                    Some(to) => to.copy_from_slice(from),
                    None => break,
                }
            }
        })?;
        Ok(())
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            if let Some(mut stream) = self.stream.take() {
                if let Err(e) = stream.shutdown().await {
                    tracing::debug!("shutdown of '{}' failed: {}", self.name, e);
                }
                tracing::info!("session '{}' closed", self.name);
            }
        }
        .boxed()
    }
}
