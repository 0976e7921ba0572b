//! Channel lifecycle states.
//!
//! `ChannelState` is the single source of truth for what the channel is doing
//! and owns whatever resources that phase needs (a live transport or a retry
//! timer). Dropping a state value releases those resources.

use super::transport::Transport;
use super::Notification;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Consumer-visible summary of [`ChannelState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Idle,
    Connecting,
    Open,
    Error,
    Closed,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport attempt, tagged with the id its notifications carry.
pub(crate) struct Connection {
    pub(crate) id: u64,
    pub(crate) transport: Box<dyn Transport>,
}

impl Connection {
    /// Close the transport and consume the attachment.
    pub(crate) fn shut(mut self, code: u16, reason: &str) {
        self.transport.close(code, reason);
    }
}

/// Owned, cancellable reconnect timer. Dropping it cancels the timer.
pub(crate) struct RetryTimer {
    pub(crate) id: u64,
    pub(crate) attempt: u32,
    pub(crate) delay: Duration,
    handle: JoinHandle<()>,
}

impl RetryTimer {
    pub(crate) fn start(
        id: u64,
        attempt: u32,
        delay: Duration,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Result<Self, TryCurrentError> {
        let runtime = Handle::try_current()?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = notifications.send(Notification::RetryDue { timer: id });
        });
        Ok(Self {
            id,
            attempt,
            delay,
            handle,
        })
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// What an `Error` state is waiting on.
pub(crate) enum Recovery {
    /// The transport reported an error and is still attached; its close
    /// notification decides what happens next.
    Draining(Connection),
    /// Waiting for the reconnect timer.
    Backoff(RetryTimer),
    /// Nothing scheduled; only an explicit `open` resumes.
    Halted,
}

pub(crate) enum ChannelState {
    Idle,
    Connecting(Connection),
    Open(Connection),
    Error(Recovery),
    Closed,
}

impl ChannelState {
    pub(crate) fn status(&self) -> ChannelStatus {
        match self {
            Self::Idle => ChannelStatus::Idle,
            Self::Connecting(_) => ChannelStatus::Connecting,
            Self::Open(_) => ChannelStatus::Open,
            Self::Error(_) => ChannelStatus::Error,
            Self::Closed => ChannelStatus::Closed,
        }
    }

    /// The attached transport, if any phase currently holds one.
    pub(crate) fn connection(&self) -> Option<&Connection> {
        match self {
            Self::Connecting(conn) | Self::Open(conn) => Some(conn),
            Self::Error(Recovery::Draining(conn)) => Some(conn),
            _ => None,
        }
    }

    pub(crate) fn timer(&self) -> Option<&RetryTimer> {
        match self {
            Self::Error(Recovery::Backoff(timer)) => Some(timer),
            _ => None,
        }
    }

    /// True while a transport attempt or a scheduled retry is outstanding.
    pub(crate) fn is_live(&self) -> bool {
        self.connection().is_some() || self.timer().is_some()
    }
}
