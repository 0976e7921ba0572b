//! Transport seam between the channel state machine and a concrete socket.
//!
//! A `Connector` creates one `Transport` per connection attempt and reports
//! everything that happens on it through a `NotificationSink`. The sink stamps
//! each notification with the attempt id so the channel can drop notifications
//! from transports it has already detached.

use super::Notification;
use crate::error::TransportError;
use tokio::sync::mpsc;

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Application close code used to force a reconnect.
pub const RECONNECT_REQUESTED: u16 = 4000;

/// Inbound frame contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Close details as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    /// True when the closing handshake completed.
    pub clean: bool,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>, clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            clean,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

/// Everything a transport can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(Frame),
    Error(String),
    Closed(CloseInfo),
}

/// One live (or pending) transport.
pub trait Transport: Send {
    /// True once the handshake finished and until a close starts.
    fn is_open(&self) -> bool;
    /// Queue one outbound text frame.
    fn send_text(&self, text: String) -> Result<(), TransportError>;
    /// Start the closing handshake. Must not block.
    fn close(&mut self, code: u16, reason: &str);
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    /// Begin connecting to `url`.
    ///
    /// Returns synchronously; the outcome of the handshake arrives through
    /// `sink` (`opened`, or `error` followed by `closed`). An `Err` means no
    /// transport was created and nothing will be reported.
    fn connect(&self, url: &str, sink: NotificationSink)
        -> Result<Box<dyn Transport>, TransportError>;
}

/// Per-attempt notification handle given to a transport.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    connection: u64,
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    pub(crate) fn new(connection: u64, tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { connection, tx }
    }

    /// Attempt id stamped on every notification from this sink.
    pub fn connection(&self) -> u64 {
        self.connection
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, frame: Frame) {
        self.emit(TransportEvent::Message(frame));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into()));
    }

    pub fn closed(&self, info: CloseInfo) {
        self.emit(TransportEvent::Closed(info));
    }

    fn emit(&self, event: TransportEvent) {
        // The channel may already be gone; nothing left to notify then.
        let _ = self.tx.send(Notification::Transport {
            connection: self.connection,
            event,
        });
    }
}
