//! End-to-end tests of the TCP engine against a loopback server.

use rfb_client::{
    CancellationToken, Config, ConnectionManager, ConnectionParameters, ConnectionState,
    FailureCategory, RfbClientError, RfbEngine, Session,
};
use rfb_pixelbuffer::{FramebufferSource, HostPixelFormat, MemorySurface};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Server half of a handshake with security type None.
async fn serve_handshake(stream: &mut TcpStream, width: u16, height: u16, name: &str) -> Vec<u8> {
    stream.write_all(b"RFB 003.008\n").await.unwrap();
    let mut version = [0u8; 12];
    stream.read_exact(&mut version).await.unwrap();
    assert_eq!(&version, b"RFB 003.008\n");

    stream.write_all(&[1, 1]).await.unwrap();
    assert_eq!(stream.read_u8().await.unwrap(), 1);
    stream.write_u32(0).await.unwrap();

    let shared = stream.read_u8().await.unwrap();

    let mut init = Vec::new();
    init.extend_from_slice(&width.to_be_bytes());
    init.extend_from_slice(&height.to_be_bytes());
    init.extend_from_slice(&[32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 16, 8, 0, 0, 0, 0]);
    init.extend_from_slice(&(name.len() as u32).to_be_bytes());
    init.extend_from_slice(name.as_bytes());
    stream.write_all(&init).await.unwrap();

    // SetPixelFormat (20 bytes) then SetEncodings header and body
    let mut set_pixel_format = [0u8; 20];
    stream.read_exact(&mut set_pixel_format).await.unwrap();
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let count = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut encodings = vec![0u8; count * 4];
    stream.read_exact(&mut encodings).await.unwrap();

    vec![shared, set_pixel_format[0], header[0]]
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_full_handshake_and_render() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let seen = serve_handshake(&mut stream, 16, 8, "loopback").await;
        // Hold the socket until the client hangs up.
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
        seen
    });

    let config = Config::builder()
        .host("127.0.0.1")
        .port(port)
        .shared(false)
        .build()
        .unwrap();
    let manager = ConnectionManager::new(RfbEngine::new());
    let mut connection = manager
        .connect(&config.parameters(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.session().name(), "loopback");
    assert_eq!(connection.session().framebuffer_size().area(), 128);

    connection.session_mut().framebuffer_mut().fill(0x7F);
    let surface = MemorySurface::new(16, 8, HostPixelFormat::Bgra8888);
    let source = FramebufferSource::new(Arc::new(surface.clone()));
    connection.render(&source).unwrap();
    assert!(surface.snapshot().unwrap().iter().all(|&b| b == 0x7F));

    connection.close().await;
    let seen = server.await.unwrap();
    assert_eq!(seen, vec![0, 0, 2]);
}

#[tokio::test]
async fn test_refused_port_is_transport_failure() {
    let port = unused_port().await;
    let manager = ConnectionManager::new(RfbEngine::new());
    let err = manager
        .connect(&ConnectionParameters::new("127.0.0.1", port), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.is_cancelled());
    assert_eq!(err.category(), Some(FailureCategory::Transport));
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_invalid_address_is_transport_failure() {
    let manager = ConnectionManager::new(RfbEngine::new());
    for (host, port) in [("", 5900), ("127.0.0.1", 0)] {
        let err = manager
            .connect(&ConnectionParameters::new(host, port), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        assert_eq!(err.category(), Some(FailureCategory::Transport), "{err}");
        assert_eq!(manager.state(), ConnectionState::Failed);
    }
}

#[tokio::test]
async fn test_invalid_settings_fail_without_connecting() {
    let manager = ConnectionManager::new(RfbEngine::new());
    let mut params = ConnectionParameters::new("127.0.0.1", 5900);
    params.encodings.clear();
    let err = manager
        .connect(&params, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RfbClientError::Config(_)));
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_security_refusal_is_authentication_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"RFB 003.008\n").await.unwrap();
        let mut version = [0u8; 12];
        stream.read_exact(&mut version).await.unwrap();
        let reason = b"too many clients";
        stream.write_u8(0).await.unwrap();
        stream.write_u32(reason.len() as u32).await.unwrap();
        stream.write_all(reason).await.unwrap();
    });

    let manager = ConnectionManager::new(RfbEngine::new());
    let err = manager
        .connect(&ConnectionParameters::new("127.0.0.1", port), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RfbClientError::AuthFailed(ref m) if m.contains("too many clients")));
    assert_eq!(err.category(), Some(FailureCategory::Authentication));
}

#[tokio::test]
async fn test_cancel_while_server_stalls_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Never send a version; wait for the client to go away.
        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).await.unwrap_or(0);
        let _ = closed_tx.send(n);
    });

    let manager = ConnectionManager::new(RfbEngine::new());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = manager
        .connect(&ConnectionParameters::new("127.0.0.1", port), token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(manager.state(), ConnectionState::Cancelled);
    // The socket was released: the server sees end of stream.
    assert_eq!(closed_rx.await.unwrap(), 0);
}
