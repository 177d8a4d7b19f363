//! Connection lifecycle.
//!
//! A [`ConnectionManager`] turns [`ConnectionParameters`] into a live
//! [`Connection`] by driving a [`ProtocolEngine`]:
//!
//! ```text
//! Disconnected --connect--> Connecting --success--> Connected
//!                               |--cancel--> Cancelled
//!                               `--error---> Failed
//! Connected --remote close | local teardown--> Disconnected
//! ```
//!
//! `Cancelled` and `Failed` end one attempt, not the manager; calling
//! [`connect`](ConnectionManager::connect) again starts a new attempt. Nothing
//! here reconnects on its own.
//!
//! Only one attempt per manager may be in flight. A second call made before
//! the first resolves fails with [`RfbClientError::AlreadyConnecting`] and
//! leaves the first attempt untouched.

use crate::config::ConnectionParameters;
use crate::engine::{
    ConnectContext, CredentialPrompt, NoPrompt, OutputHandler, ProtocolEngine, Session,
};
use crate::errors::RfbClientError;
use crate::log_sink::{LogSink, SessionLog, TracingLogSink};
use crate::notify::{ConnectionEvent, Notifier, NotifierOutputHandler};
use parking_lot::Mutex;
use rfb_pixelbuffer::{FramebufferSource, HostSurface};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a connection attempt or connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session.
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// A session is established.
    Connected,
    /// The attempt ended with an error.
    Failed,
    /// The caller cancelled the attempt.
    Cancelled,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Clears the in-flight flag when an attempt ends, however it ends.
struct AttemptGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AttemptGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Establishes connections, one attempt at a time.
pub struct ConnectionManager<E> {
    engine: Arc<E>,
    in_flight: AtomicBool,
    state: Mutex<ConnectionState>,
    prompt: Arc<dyn CredentialPrompt>,
    output: Arc<dyn OutputHandler>,
    notifier: Notifier<ConnectionEvent>,
    log: Arc<dyn LogSink>,
}

impl<E: ProtocolEngine> ConnectionManager<E> {
    /// Manager with a non-interactive prompt, `tracing` logging and a
    /// private notifier.
    pub fn new(engine: E) -> Self {
        Self::builder(engine).build()
    }

    /// Start configuring a manager around `engine`.
    pub fn builder(engine: E) -> ConnectionManagerBuilder<E> {
        ConnectionManagerBuilder {
            engine: Arc::new(engine),
            prompt: None,
            output: None,
            notifier: None,
            log: None,
        }
    }

    /// The engine connections are opened with.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Hub every state change and engine output is published on.
    pub fn notifier(&self) -> &Notifier<ConnectionEvent> {
        &self.notifier
    }

    /// Outcome of the most recent attempt, or `Connecting` while one runs.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// True while an attempt is unresolved.
    pub fn is_connecting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Open one connection.
    ///
    /// The single-flight check happens when `connect` is called, before the
    /// returned future is first polled. Cancelling `cancel` at any point
    /// before the attempt resolves yields [`RfbClientError::Cancelled`];
    /// afterwards it has no effect. Dropping the returned future abandons the
    /// attempt the same way, without publishing a final state.
    ///
    /// On cancellation or failure whatever the engine had opened is released
    /// before this returns.
    pub fn connect<'a>(
        &'a self,
        parameters: &'a ConnectionParameters,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Connection<E::Session>, RfbClientError>> + Send + 'a {
        let guard = AttemptGuard::acquire(&self.in_flight);
        async move {
            let Some(_guard) = guard else {
                tracing::warn!(
                    "connect to {} rejected: attempt in progress",
                    parameters.server_label()
                );
                return Err(RfbClientError::AlreadyConnecting);
            };
            self.attempt(parameters, cancel).await
        }
    }

    async fn attempt(
        &self,
        parameters: &ConnectionParameters,
        cancel: CancellationToken,
    ) -> Result<Connection<E::Session>, RfbClientError> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let log = SessionLog::open(Arc::clone(&self.log), id, &parameters.server_label());
        self.transition(id, ConnectionState::Connecting);

        if cancel.is_cancelled() {
            return Err(self.cancelled(id, &log));
        }

        let ctx = ConnectContext {
            parameters,
            prompt: &*self.prompt,
            output: Arc::clone(&self.output),
            cancel: cancel.clone(),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.engine.connect(ctx) => Some(result),
        };

        match outcome {
            // The engine future has been dropped, releasing its transport.
            None => Err(self.cancelled(id, &log)),
            Some(Ok(mut session)) if cancel.is_cancelled() => {
                session.close().await;
                Err(self.cancelled(id, &log))
            }
            Some(Ok(session)) => {
                log.info(format!("connected to '{}'", session.name()));
                self.transition(id, ConnectionState::Connected);
                Ok(Connection {
                    id,
                    session,
                    disconnected: AtomicBool::new(false),
                    notifier: self.notifier.clone(),
                    log,
                })
            }
            Some(Err(err)) if err.is_cancelled() || cancel.is_cancelled() => {
                Err(self.cancelled(id, &log))
            }
            Some(Err(err)) => {
                log.error(format!("connection failed: {err}"));
                self.transition(id, ConnectionState::Failed);
                Err(err)
            }
        }
    }

    fn cancelled(&self, id: u64, log: &SessionLog) -> RfbClientError {
        log.info("connection attempt cancelled");
        self.transition(id, ConnectionState::Cancelled);
        RfbClientError::Cancelled
    }

    fn transition(&self, connection_id: u64, state: ConnectionState) {
        *self.state.lock() = state;
        tracing::debug!(connection_id, "state -> {}", state);
        self.notifier.publish(ConnectionEvent::StateChanged {
            connection_id,
            state,
        });
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder<E> {
    engine: Arc<E>,
    prompt: Option<Arc<dyn CredentialPrompt>>,
    output: Option<Arc<dyn OutputHandler>>,
    notifier: Option<Notifier<ConnectionEvent>>,
    log: Option<Arc<dyn LogSink>>,
}

impl<E: ProtocolEngine> ConnectionManagerBuilder<E> {
    /// Interactive credential source. Defaults to [`NoPrompt`].
    #[must_use]
    pub fn prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Receiver of bell and clipboard events. Defaults to publishing them on
    /// the notifier.
    #[must_use]
    pub fn output(mut self, output: Arc<dyn OutputHandler>) -> Self {
        self.output = Some(output);
        self
    }

    /// Share an existing notifier.
    #[must_use]
    pub fn notifier(mut self, notifier: Notifier<ConnectionEvent>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Diagnostic log sink. Defaults to [`TracingLogSink`].
    #[must_use]
    pub fn log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Build the manager.
    pub fn build(self) -> ConnectionManager<E> {
        let notifier = self.notifier.unwrap_or_default();
        let output = self
            .output
            .unwrap_or_else(|| Arc::new(NotifierOutputHandler::new(notifier.clone())));
        ConnectionManager {
            engine: self.engine,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ConnectionState::Disconnected),
            prompt: self.prompt.unwrap_or_else(|| Arc::new(NoPrompt)),
            output,
            notifier,
            log: self.log.unwrap_or_else(|| Arc::new(TracingLogSink)),
        }
    }
}

/// A live connection, owned by the caller.
///
/// Dropping it tears the session down without a graceful close; prefer
/// [`close`](Self::close).
pub struct Connection<S: Session> {
    id: u64,
    session: S,
    disconnected: AtomicBool,
    notifier: Notifier<ConnectionEvent>,
    log: SessionLog,
}

impl<S: Session> Connection<S> {
    /// Identifier shared with the attempt that produced this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `Connected` until the remote end closes or the connection is torn
    /// down, then `Disconnected`.
    pub fn state(&self) -> ConnectionState {
        if self.disconnected.load(Ordering::Acquire) {
            return ConnectionState::Disconnected;
        }
        if !self.session.is_open() {
            self.mark_disconnected("remote end closed the session");
            return ConnectionState::Disconnected;
        }
        ConnectionState::Connected
    }

    /// The engine session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// The engine session, mutably.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Run one paint cycle into the host surface behind `source`.
    ///
    /// The framebuffer reference is released before this returns, whether
    /// painting succeeded or not.
    pub fn render<H>(&mut self, source: &FramebufferSource<H>) -> Result<(), RfbClientError>
    where
        H: HostSurface + ?Sized + 'static,
    {
        if self.state() != ConnectionState::Connected {
            return Err(RfbClientError::ConnectionClosed);
        }
        let session = &mut self.session;
        source.render_pass(|fb| session.paint(fb))
    }

    /// Tear the connection down.
    pub async fn close(mut self) {
        self.session.close().await;
        self.mark_disconnected("connection closed locally");
    }

    fn mark_disconnected(&self, reason: &str) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.log.info(reason);
        self.notifier.publish(ConnectionEvent::StateChanged {
            connection_id: self.id,
            state: ConnectionState::Disconnected,
        });
    }
}

impl<S: Session> Drop for Connection<S> {
    fn drop(&mut self) {
        self.mark_disconnected("connection dropped");
    }
}

impl<S: Session> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session", &self.session.name())
            .field("disconnected", &self.disconnected.load(Ordering::Acquire))
            .finish()
    }
}
