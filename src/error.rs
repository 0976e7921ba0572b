//! Unified error types for configuration, channel control and transports.

use crate::channel::ChannelStatus;
use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ChannelError
// ---------------------------------------------------------------------------

/// Synchronous failures reported to the caller of a channel operation.
///
/// Environmental failures (missing token, dropped connections, malformed
/// frames) never surface here; they land in the event log instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The operation needs an open transport and the channel is elsewhere.
    InvalidState {
        status: ChannelStatus,
        action: &'static str,
    },
    /// The live transport refused the outbound frame.
    Transport(TransportError),
    /// The channel driver task has exited.
    Stopped,
}

impl ChannelError {
    pub fn invalid_state(status: ChannelStatus, action: &'static str) -> Self {
        Self::InvalidState { status, action }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { status, action } => {
                write!(f, "cannot {action} while channel is {status}")
            }
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Stopped => write!(f, "channel driver has stopped"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<TransportError> for ChannelError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors raised by transport implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be constructed (bad address, handshake setup).
    Construction(String),
    /// An outbound frame could not be queued.
    Send(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction(msg) => write!(f, "failed to create transport: {msg}"),
            Self::Send(msg) => write!(f, "failed to send: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}
