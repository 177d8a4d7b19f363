//! Explicitly scoped diagnostic log sinks.
//!
//! Components that report to a user-visible log receive an `Arc<dyn LogSink>`
//! at construction. A [`SessionLog`] binds a sink to one connection and lives
//! exactly as long as that connection. Records are diagnostics only; every
//! failure is also returned to the caller.

use std::fmt;
use std::sync::Arc;
use tracing::Level;

/// One diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity.
    pub level: Level,
    /// Connection the record belongs to, if any.
    pub connection_id: Option<u64>,
    /// Human readable text.
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.connection_id {
            Some(id) => write!(f, "[{}] #{} {}", self.level, id, self.message),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

/// Destination for [`LogRecord`]s.
pub trait LogSink: Send + Sync {
    /// Accept one record. Must not block.
    fn record(&self, record: &LogRecord);
}

/// Forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, record: &LogRecord) {
        let id = record.connection_id.unwrap_or_default();
        match record.level {
            Level::ERROR => tracing::error!(connection_id = id, "{}", record.message),
            Level::WARN => tracing::warn!(connection_id = id, "{}", record.message),
            Level::INFO => tracing::info!(connection_id = id, "{}", record.message),
            Level::DEBUG => tracing::debug!(connection_id = id, "{}", record.message),
            _ => tracing::trace!(connection_id = id, "{}", record.message),
        }
    }
}

/// Feeds a bounded `flume` channel, e.g. for a log view in the UI.
///
/// Records are dropped when the channel is full or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: flume::Sender<LogRecord>,
}

impl ChannelLogSink {
    /// Create a sink holding at most `capacity` undelivered records.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<LogRecord>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelLogSink {
    fn record(&self, record: &LogRecord) {
        let _ = self.tx.try_send(record.clone());
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn record(&self, _record: &LogRecord) {}
}

/// A sink bound to one connection.
///
/// Emits an opening record when created and a closing record when dropped.
pub struct SessionLog {
    connection_id: u64,
    sink: Arc<dyn LogSink>,
}

impl SessionLog {
    /// Start logging for `connection_id` to `server`.
    pub fn open(sink: Arc<dyn LogSink>, connection_id: u64, server: &str) -> Self {
        let log = Self {
            connection_id,
            sink,
        };
        log.emit(Level::INFO, format!("session log opened for {server}"));
        log
    }

    /// Connection this log belongs to.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Record at info level.
    pub fn info(&self, message: impl Into<String>) {
        self.emit(Level::INFO, message.into());
    }

    /// Record at warn level.
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Level::WARN, message.into());
    }

    /// Record at error level.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(Level::ERROR, message.into());
    }

    fn emit(&self, level: Level, message: String) {
        self.sink.record(&LogRecord {
            level,
            connection_id: Some(self.connection_id),
            message,
        });
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        self.emit(Level::INFO, "session log closed".to_string());
    }
}

impl fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLog")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}
