//! Headless VNC client example - connect, render once and disconnect.
//!
//! Usage:
//!   cargo run --example headless_connect -- localhost:0
//!   cargo run --example headless_connect -- --config viewer.toml
//!
//! This example demonstrates:
//! - Building connection parameters from an address or a TOML config
//! - Cancelling the connect attempt with Ctrl-C
//! - Following state changes through the notifier
//! - Painting into an in-memory host surface
//! - Graceful shutdown

use rfb_client::{
    CancellationToken, ChannelLogSink, Config, ConnectionEvent, ConnectionManager,
    ConnectionParameters, RfbEngine, Session,
};
use rfb_pixelbuffer::{FramebufferSource, HostPixelFormat, MemorySurface, PixelFormat};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let parameters = match args.get(1..).unwrap_or_default() {
        [flag, path] if flag == "--config" => Config::load(path)?.parameters(),
        [server] => ConnectionParameters::parse_server(server)?,
        _ => {
            eprintln!("Usage: {} <host>[:display|:port] | --config <file>", args[0]);
            eprintln!("Example: {} localhost:0", args[0]);
            std::process::exit(1);
        }
    };

    let (log_sink, log_rx) = ChannelLogSink::bounded(64);
    let manager = ConnectionManager::builder(RfbEngine::new())
        .log_sink(Arc::new(log_sink))
        .build();

    let events = manager.notifier().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                ConnectionEvent::StateChanged {
                    connection_id,
                    state,
                } => info!("connection #{} is {}", connection_id, state),
                ConnectionEvent::Bell => info!("bell"),
                ConnectionEvent::ClipboardText(text) => info!("clipboard: {} bytes", text.len()),
            }
        }
    });
    tokio::spawn(async move {
        while let Ok(record) = log_rx.recv_async().await {
            println!("{record}");
        }
    });

    // Ctrl-C cancels the attempt
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    info!("Connecting to {}", parameters.server_label());
    let mut connection = match manager.connect(&parameters, cancel).await {
        Ok(c) => c,
        Err(e) if e.is_cancelled() => {
            warn!("Connection cancelled");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to connect ({:?}): {}", e.category(), e);
            return Err(e.into());
        }
    };

    let size = connection.session().framebuffer_size();
    info!("Desktop '{}' is {}", connection.session().name(), size);

    // Match the host surface to the negotiated layout
    let negotiated = connection.session().pixel_format();
    let host_format = if negotiated == PixelFormat::rgb565() {
        HostPixelFormat::Rgb565
    } else if negotiated == PixelFormat::rgba8888() {
        HostPixelFormat::Rgba8888
    } else {
        HostPixelFormat::Bgra8888
    };
    let surface = MemorySurface::new(size.width, size.height, host_format);
    let source = FramebufferSource::new(Arc::new(surface.clone()));
    connection.render(&source)?;
    info!("Rendered one frame; surface invalidated {:?}", surface.invalidated());

    connection.close().await;
    info!("Disconnected");
    Ok(())
}
