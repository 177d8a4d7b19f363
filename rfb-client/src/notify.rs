//! Publish/subscribe notifications for UI consumers.
//!
//! The core publishes [`ConnectionEvent`]s through a [`Notifier`]; view
//! layers subscribe and drain their receiver on whatever thread they like.
//! Nothing here depends on a UI framework.

use crate::engine::OutputHandler;
use crate::manager::ConnectionState;
use parking_lot::Mutex;
use std::sync::Arc;

/// Something the UI may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt or connection moved to a new state.
    StateChanged {
        /// Attempt / connection identifier.
        connection_id: u64,
        /// The new state.
        state: ConnectionState,
    },
    /// The server rang the bell.
    Bell,
    /// The server's clipboard changed.
    ClipboardText(String),
}

/// Fan-out hub over unbounded `flume` channels.
///
/// Cloning a notifier yields another handle to the same subscriber list.
pub struct Notifier<T> {
    subscribers: Arc<Mutex<Vec<flume::Sender<T>>>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Notifier<T> {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn publish(&self, event: T) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of subscribers that have not been dropped yet.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_disconnected());
        subscribers.len()
    }
}

/// Forwards engine output onto a [`Notifier`].
#[derive(Clone)]
pub struct NotifierOutputHandler {
    notifier: Notifier<ConnectionEvent>,
}

impl NotifierOutputHandler {
    /// Publish engine output through `notifier`.
    pub fn new(notifier: Notifier<ConnectionEvent>) -> Self {
        Self { notifier }
    }
}

impl OutputHandler for NotifierOutputHandler {
    fn bell(&self) {
        self.notifier.publish(ConnectionEvent::Bell);
    }

    fn clipboard_text(&self, text: &str) {
        self.notifier
            .publish(ConnectionEvent::ClipboardText(text.to_string()));
    }
}

/// Discards engine output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutputHandler;

impl OutputHandler for NullOutputHandler {
    fn bell(&self) {}

    fn clipboard_text(&self, _text: &str) {}
}
