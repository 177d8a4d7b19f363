//! Async connection core for a VNC viewer.
//!
//! This crate sits between the UI and the protocol engine. It establishes
//! sessions through a [`ConnectionManager`], which is cancellable and allows
//! one attempt at a time, and it runs render passes that lend the host
//! toolkit's locked framebuffer to the session (see `rfb-pixelbuffer`).
//!
//! # Features
//!
//! - **Async I/O**: Built on tokio; every connect stage is a cancellation point
//! - **Single-flight connects**: A concurrent `connect` fails with `AlreadyConnecting`
//! - **Distinct cancellation**: `Cancelled` is never reported as a failure
//! - **Pluggable engine**: [`ProtocolEngine`] seam with a TCP [`RfbEngine`] included
//! - **Configuration management**: TOML files and a builder
//! - **Explicit notifications**: State changes and server output on a [`Notifier`]
//!
//! # Quick Start
//!
//! ```no_run
//! use rfb_client::{Config, ConnectionManager, RfbEngine, Session};
//! use rfb_pixelbuffer::{FramebufferSource, HostPixelFormat, MemorySurface};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::builder().host("localhost").port(5900).build()?;
//!     let manager = ConnectionManager::new(RfbEngine::new());
//!
//!     let mut connection = manager
//!         .connect(&config.parameters(), CancellationToken::new())
//!         .await?;
//!
//!     let size = connection.session().framebuffer_size();
//!     let surface = MemorySurface::new(size.width, size.height, HostPixelFormat::Bgra8888);
//!     connection.render(&FramebufferSource::new(Arc::new(surface)))?;
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Every error is returned to the immediate caller. Use
//! [`RfbClientError::category`] to decide what to show; cancellations and
//! single-flight rejections have no failure category. Nothing retries
//! automatically.
//!
//! # Safety
//!
//! This crate is `#![forbid(unsafe_code)]` and uses only safe Rust.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Public modules
pub mod config;
pub mod engine;
pub mod errors;
pub mod handshake;
pub mod log_sink;
pub mod notify;
pub mod transport;

mod manager;
mod rfb_engine;

pub use config::{ColorFormat, Config, ConnectionParameters};
pub use engine::{
    ConnectContext, CredentialPrompt, Encoding, HasId, NoPrompt, OutputHandler, ProtocolEngine,
    Session,
};
pub use errors::{FailureCategory, RfbClientError};
pub use log_sink::{ChannelLogSink, LogRecord, LogSink, NullLogSink, SessionLog, TracingLogSink};
pub use manager::{Connection, ConnectionManager, ConnectionManagerBuilder, ConnectionState};
pub use notify::{ConnectionEvent, Notifier, NotifierOutputHandler, NullOutputHandler};
pub use rfb_engine::{RfbEngine, RfbSession};
pub use tokio_util::sync::CancellationToken;
