//! Event log model.
//!
//! The log is append-only for the lifetime of one subscription target. A new
//! target starts a new log with a fresh `epoch`; old entries are discarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Lifecycle text produced by the channel.
    Info,
    /// Failure text produced by the channel.
    Error,
    /// Decoded JSON pushed by the server.
    Event,
    /// Server frame that could not be represented as text.
    Raw,
}

/// Failure taxonomy attached to `Error` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    NoCredential,
    TransportConstruction,
    MessageDecode,
    Transport,
    RetryBudgetExhausted,
}

impl Failure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::TransportConstruction => "transport_construction",
            Self::MessageDecode => "message_decode",
            Self::Transport => "transport",
            Self::RetryBudgetExhausted => "retry_budget_exhausted",
        }
    }

    /// Failures after which the channel gives up without outside help.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::NoCredential | Self::RetryBudgetExhausted)
    }
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub seq: u64,
    pub ts_unix_ms: u64,
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl ChannelEvent {
    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

/// Ordered, append-only event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    epoch: u64,
    entries: Vec<ChannelEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
        }
    }

    /// Identifier distinguishing this log from every log that came before it.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn entries(&self) -> &[ChannelEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with `seq >= cursor`.
    pub fn since(&self, cursor: u64) -> &[ChannelEvent] {
        let start = self.entries.partition_point(|entry| entry.seq < cursor);
        &self.entries[start..]
    }

    pub(crate) fn info(&mut self, message: impl Into<String>) {
        self.push(EventKind::Info, Some(message.into()), None, None);
    }

    pub(crate) fn error(&mut self, failure: Failure, message: impl Into<String>) {
        self.push(EventKind::Error, Some(message.into()), None, Some(failure));
    }

    pub(crate) fn event(&mut self, payload: Value) {
        self.push(EventKind::Event, None, Some(payload), None);
    }

    pub(crate) fn raw(&mut self, message: impl Into<String>) {
        self.push(EventKind::Raw, Some(message.into()), None, None);
    }

    fn push(
        &mut self,
        kind: EventKind,
        message: Option<String>,
        payload: Option<Value>,
        failure: Option<Failure>,
    ) {
        let seq = self.entries.len() as u64;
        self.entries.push(ChannelEvent {
            seq,
            ts_unix_ms: now_unix_millis(),
            kind,
            message,
            payload,
            failure,
        });
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
