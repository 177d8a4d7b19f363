//! RFB protocol handshake.
//!
//! Implements the three handshake phases of RFB 3.8:
//!
//! 1. **Protocol Version Negotiation** - Client and server agree on RFB version (3.3 or 3.8)
//! 2. **Security Handshake** - Negotiate the security type
//! 3. **Initialization** - Exchange ClientInit/ServerInit messages
//!
//! followed by the SetPixelFormat and SetEncodings messages that configure
//! the session before the first update request.
//!
//! The client always advertises RFB 3.8 but negotiates down to 3.3 if the
//! server only supports 3.3-3.6. Only `SecurityType::None` (value 1) is
//! supported, which suits SSH tunnels and trusted networks.
//!
//! All multi-byte integers are big-endian (network byte order). Every function
//! here awaits on the stream and may be dropped at any of those points.

use crate::errors::RfbClientError;
use rfb_pixelbuffer::PixelFormat;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// RFB protocol version string sent by client.
const CLIENT_VERSION_BYTES: &[u8; 12] = b"RFB 003.008\n";

/// Security type constant for no authentication.
pub const SECURITY_TYPE_NONE: u8 = 1;

/// Security type constant for classic VNC (DES challenge) authentication.
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

/// Upper bound on reason and desktop name strings sent by the server.
const MAX_STRING_LEN: usize = 1 << 20;

const MSG_SET_PIXEL_FORMAT: u8 = 0;
const MSG_SET_ENCODINGS: u8 = 2;

/// Negotiated RFB protocol version after handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedVersion {
    /// RFB 3.3: the server picks the security type.
    V3_3,
    /// RFB 3.8: the client picks from a list and receives a security result.
    V3_8,
}

/// Initial server parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    /// Framebuffer width in pixels.
    pub framebuffer_width: u16,
    /// Framebuffer height in pixels.
    pub framebuffer_height: u16,
    /// The server's native pixel format.
    pub pixel_format: PixelFormat,
    /// Desktop name.
    pub name: String,
}

/// Negotiate RFB protocol version with the server.
pub async fn negotiate_version<S>(stream: &mut S) -> Result<NegotiatedVersion, RfbClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut version_buf = [0u8; 12];
    stream.read_exact(&mut version_buf).await?;

    // Validate format: "RFB xxx.yyy\n"
    if &version_buf[0..4] != b"RFB " || version_buf[11] != b'\n' || version_buf[7] != b'.' {
        return Err(RfbClientError::Handshake(format!(
            "invalid RFB version string: expected 'RFB xxx.yyy\\n', got {:?}",
            String::from_utf8_lossy(&version_buf)
        )));
    }

    let major = parse_version_digits(&version_buf[4..7])?;
    let minor = parse_version_digits(&version_buf[8..11])?;

    if major < 3 || (major == 3 && minor < 3) {
        return Err(RfbClientError::Handshake(format!(
            "unsupported RFB version {}.{} (< 003.003)",
            major, minor
        )));
    }

    let negotiated = if major == 3 && minor < 7 {
        NegotiatedVersion::V3_3
    } else {
        NegotiatedVersion::V3_8
    };

    stream.write_all(CLIENT_VERSION_BYTES).await?;
    stream.flush().await?;

    tracing::debug!("server version {}.{}, negotiated {:?}", major, minor, negotiated);
    Ok(negotiated)
}

fn parse_version_digits(digits: &[u8]) -> Result<u32, RfbClientError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RfbClientError::Handshake(format!(
                "invalid version digits: {:?}",
                String::from_utf8_lossy(digits)
            ))
        })
}

/// Negotiate security type with the server.
pub async fn negotiate_security<S>(
    stream: &mut S,
    negotiated: NegotiatedVersion,
) -> Result<(), RfbClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match negotiated {
        NegotiatedVersion::V3_8 => negotiate_security_3_8(stream).await,
        NegotiatedVersion::V3_3 => negotiate_security_3_3(stream).await,
    }
}

async fn negotiate_security_3_8<S>(stream: &mut S) -> Result<(), RfbClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let count = stream.read_u8().await?;
    if count == 0 {
        let reason = read_string(stream).await?;
        return Err(RfbClientError::AuthFailed(format!(
            "server offered no security types: {}",
            reason
        )));
    }

    let mut types = vec![0u8; count as usize];
    stream.read_exact(&mut types).await?;

    if !types.contains(&SECURITY_TYPE_NONE) {
        return Err(RfbClientError::Security(format!(
            "no supported security types offered by server (got {:?}, only None=1 supported)",
            types
        )));
    }

    stream.write_u8(SECURITY_TYPE_NONE).await?;
    stream.flush().await?;

    match stream.read_u32().await? {
        0 => Ok(()),
        1 => {
            let reason = read_string(stream).await?;
            Err(RfbClientError::AuthFailed(format!(
                "security handshake failed: {}",
                reason
            )))
        }
        other => Err(RfbClientError::Handshake(format!(
            "invalid security result value: {} (expected 0 or 1)",
            other
        ))),
    }
}

async fn negotiate_security_3_3<S>(stream: &mut S) -> Result<(), RfbClientError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_u32().await? {
        0 => {
            let reason = read_string(stream).await?;
            Err(RfbClientError::AuthFailed(format!(
                "server rejected connection: {}",
                reason
            )))
        }
        1 => Ok(()),
        other => Err(RfbClientError::Security(format!(
            "unsupported security type for RFB 3.3: {} (only None=1 supported)",
            other
        ))),
    }
}

/// Send ClientInit message to the server.
pub async fn send_client_init<S>(stream: &mut S, shared: bool) -> Result<(), RfbClientError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_u8(u8::from(shared)).await?;
    stream.flush().await?;
    Ok(())
}

/// Receive ServerInit message from the server.
pub async fn recv_server_init<S>(stream: &mut S) -> Result<ServerInit, RfbClientError>
where
    S: AsyncRead + Unpin,
{
    let framebuffer_width = stream.read_u16().await?;
    let framebuffer_height = stream.read_u16().await?;
    let pixel_format = read_pixel_format(stream).await?;
    let name = read_string(stream).await?;

    Ok(ServerInit {
        framebuffer_width,
        framebuffer_height,
        pixel_format,
        name,
    })
}

/// Ask the server to send pixels in `format`.
pub async fn send_set_pixel_format<S>(
    stream: &mut S,
    format: &PixelFormat,
) -> Result<(), RfbClientError>
where
    S: AsyncWrite + Unpin,
{
    let mut msg = Vec::with_capacity(20);
    msg.push(MSG_SET_PIXEL_FORMAT);
    msg.extend_from_slice(&[0, 0, 0]);
    write_pixel_format(&mut msg, format);
    stream.write_all(&msg).await?;
    stream.flush().await?;
    Ok(())
}

/// Advertise the encodings the client accepts, most preferred first.
pub async fn send_set_encodings<S>(stream: &mut S, encodings: &[i32]) -> Result<(), RfbClientError>
where
    S: AsyncWrite + Unpin,
{
    let count = u16::try_from(encodings.len())
        .map_err(|_| RfbClientError::Config(format!("too many encodings: {}", encodings.len())))?;

    let mut msg = Vec::with_capacity(4 + encodings.len() * 4);
    msg.push(MSG_SET_ENCODINGS);
    msg.push(0);
    msg.extend_from_slice(&count.to_be_bytes());
    for encoding in encodings {
        msg.extend_from_slice(&encoding.to_be_bytes());
    }
    stream.write_all(&msg).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_string<S>(stream: &mut S) -> Result<String, RfbClientError>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u32().await? as usize;
    if len > MAX_STRING_LEN {
        return Err(RfbClientError::Protocol(format!(
            "string length {} exceeds limit {}",
            len, MAX_STRING_LEN
        )));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_pixel_format<S>(stream: &mut S) -> Result<PixelFormat, RfbClientError>
where
    S: AsyncRead + Unpin,
{
    let mut raw = [0u8; 16];
    stream.read_exact(&mut raw).await?;

    let big_endian = raw[2];
    let true_color = raw[3];
    if big_endian > 1 {
        return Err(RfbClientError::Protocol(format!(
            "big_endian must be 0 or 1, got {}",
            big_endian
        )));
    }
    if true_color != 1 {
        return Err(RfbClientError::Protocol(
            "color map pixel formats are not supported".to_string(),
        ));
    }

    Ok(PixelFormat {
        name: "server",
        bits_per_pixel: raw[0],
        depth: raw[1],
        big_endian: big_endian == 1,
        red_max: u16::from_be_bytes([raw[4], raw[5]]),
        green_max: u16::from_be_bytes([raw[6], raw[7]]),
        blue_max: u16::from_be_bytes([raw[8], raw[9]]),
        alpha_max: 0,
        red_shift: raw[10],
        green_shift: raw[11],
        blue_shift: raw[12],
        alpha_shift: 0,
    })
}

/// Wire layout is 16 bytes; alpha is not transmitted.
fn write_pixel_format(buf: &mut Vec<u8>, pf: &PixelFormat) {
    buf.push(pf.bits_per_pixel);
    buf.push(pf.depth);
    buf.push(u8::from(pf.big_endian));
    buf.push(1); // true color
    buf.extend_from_slice(&pf.red_max.to_be_bytes());
    buf.extend_from_slice(&pf.green_max.to_be_bytes());
    buf.extend_from_slice(&pf.blue_max.to_be_bytes());
    buf.push(pf.red_shift);
    buf.push(pf.green_shift);
    buf.push(pf.blue_shift);
    buf.extend_from_slice(&[0, 0, 0]);
}
