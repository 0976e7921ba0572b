//! Task event channel: one subscription to a backend task's event stream.
//!
//! `TaskEventChannel` is a synchronous state machine. Transports and retry
//! timers never touch it directly; they post [`Notification`]s that the owner
//! feeds back through [`TaskEventChannel::dispatch`], one at a time. The async
//! owner used by applications lives in `driver`.

mod backoff;
mod driver;
mod endpoint;
mod event;
mod state;
mod terminal;
mod transport;
mod ws;

pub use backoff::{ReconnectPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
pub use driver::{spawn_channel, ChannelHandle, ChannelSnapshot};
pub use endpoint::StreamEndpoint;
pub use event::{ChannelEvent, EventKind, EventLog, Failure};
pub use state::ChannelStatus;
pub use terminal::TerminalRule;
pub use transport::{
    CloseInfo, Connector, Frame, NotificationSink, Transport, TransportEvent, ABNORMAL_CLOSURE,
    NORMAL_CLOSURE, RECONNECT_REQUESTED,
};
pub use ws::WsConnector;

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::ChannelError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::Value;
use state::{ChannelState, Connection, Recovery, RetryTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const CLIENT_CLOSE_REASON: &str = "closed by client";

/// Input to the channel's dispatcher.
#[derive(Debug)]
pub enum Notification {
    /// Something happened on the transport created for attempt `connection`.
    Transport {
        connection: u64,
        event: TransportEvent,
    },
    /// The reconnect timer `timer` elapsed.
    RetryDue { timer: u64 },
}

/// Static settings shared by every connection attempt of a channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub endpoint: StreamEndpoint,
    pub reconnect: ReconnectPolicy,
    pub terminal: TerminalRule,
}

impl ChannelSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: StreamEndpoint::from_backend(&config.backend),
            reconnect: config.reconnect.policy(),
            terminal: TerminalRule::from_config(&config.terminal),
        }
    }
}

/// A scheduled reconnect, as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    pub attempt: u32,
    pub delay: Duration,
}

pub struct TaskEventChannel {
    settings: ChannelSettings,
    connector: Arc<dyn Connector>,
    tokens: Option<Arc<dyn TokenProvider>>,
    notifications: mpsc::UnboundedSender<Notification>,
    task_id: Option<String>,
    state: ChannelState,
    retries: u32,
    next_id: u64,
    log: EventLog,
}

impl TaskEventChannel {
    /// Build an idle channel and the receiver its notifications arrive on.
    pub fn new(
        settings: ChannelSettings,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            settings,
            connector,
            tokens: None,
            notifications: tx,
            task_id: None,
            state: ChannelState::Idle,
            retries: 0,
            next_id: 1,
            log: EventLog::new(),
        };
        (channel, rx)
    }

    pub fn status(&self) -> ChannelStatus {
        self.state.status()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn events(&self) -> &[ChannelEvent] {
        self.log.entries()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retries
    }

    pub fn pending_retry(&self) -> Option<PendingRetry> {
        self.state.timer().map(|timer| PendingRetry {
            attempt: timer.attempt,
            delay: timer.delay,
        })
    }

    /// True while a transport is attached (connecting, open or draining).
    pub fn has_transport(&self) -> bool {
        self.state.connection().is_some()
    }

    /// True in an `Error` state that nothing will recover from on its own.
    pub fn is_halted(&self) -> bool {
        matches!(self.state, ChannelState::Error(Recovery::Halted))
    }

    /// Bind the channel to `task_id`.
    ///
    /// An absent or blank id tears everything down and leaves the channel
    /// idle. A different id discards the current log and connection before
    /// connecting. The same id reconnects only when nothing is in flight.
    pub fn open(&mut self, task_id: Option<&str>, tokens: Arc<dyn TokenProvider>) {
        self.tokens = Some(tokens);
        let Some(next) = task_id.map(str::trim).filter(|id| !id.is_empty()) else {
            self.teardown("subscription cleared");
            if self.task_id.take().is_some() {
                self.log = EventLog::new();
            }
            self.retries = 0;
            self.state = ChannelState::Idle;
            return;
        };

        if self.task_id.as_deref() == Some(next) {
            if self.state.is_live() {
                debug!(task_id = next, status = %self.status(), "task stream already active");
                return;
            }
        } else {
            self.teardown("switching task");
            self.task_id = Some(next.to_string());
            self.log = EventLog::new();
        }
        self.retries = 0;
        self.connect();
    }

    /// Stop the subscription.
    ///
    /// `intentional = true` cancels any pending retry, closes the transport
    /// with a normal-closure code and settles `Closed`; repeated calls are
    /// no-ops. `intentional = false` drops the live transport with an
    /// application code so the reconnect policy takes over; with no live
    /// transport it behaves like an intentional close.
    pub fn close(&mut self, intentional: bool) {
        if !intentional {
            if let ChannelState::Connecting(conn) | ChannelState::Open(conn) = &mut self.state {
                conn.transport.close(RECONNECT_REQUESTED, "reconnect requested");
                self.log.info("reconnect requested by client");
                return;
            }
        }
        match self.state {
            ChannelState::Closed => return,
            ChannelState::Idle => {
                self.state = ChannelState::Closed;
                return;
            }
            _ => {}
        }
        self.teardown(CLIENT_CLOSE_REASON);
        self.retries = 0;
        self.state = ChannelState::Closed;
        info!(task_id = self.task_label(), "task stream closed by client");
        self.log.info(format!(
            "connection closed (code {NORMAL_CLOSURE}, reason: {CLIENT_CLOSE_REASON}, clean: true)"
        ));
    }

    /// Send `payload` as one JSON text frame on the open transport.
    pub fn send(&self, payload: &Value) -> Result<(), ChannelError> {
        match &self.state {
            ChannelState::Open(conn) if conn.transport.is_open() => {
                conn.transport.send_text(payload.to_string())?;
                Ok(())
            }
            state => Err(ChannelError::invalid_state(state.status(), "send")),
        }
    }

    /// Apply one notification. Notifications from detached transports and
    /// superseded timers are ignored.
    pub fn dispatch(&mut self, notification: Notification) {
        match notification {
            Notification::Transport { connection, event } => {
                if self.state.connection().map(|conn| conn.id) != Some(connection) {
                    debug!(connection, "ignoring notification from detached transport");
                    return;
                }
                match event {
                    TransportEvent::Opened => self.on_opened(),
                    TransportEvent::Message(frame) => self.on_message(frame),
                    TransportEvent::Error(message) => self.on_transport_error(message),
                    TransportEvent::Closed(info) => self.on_closed(info),
                }
            }
            Notification::RetryDue { timer } => {
                if self.state.timer().map(|t| t.id) != Some(timer) {
                    debug!(timer, "ignoring superseded retry timer");
                    return;
                }
                // Dropping the fired timer; `connect` installs the next state.
                self.state = ChannelState::Idle;
                self.connect();
            }
        }
    }

    fn connect(&mut self) {
        let Some(task_id) = self.task_id.clone() else {
            self.state = ChannelState::Idle;
            return;
        };
        let token = self
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.access_token())
            .filter(|token| !token.trim().is_empty());
        let Some(token) = token else {
            warn!(%task_id, "no access token available");
            self.log
                .error(Failure::NoCredential, "no access token available");
            self.state = ChannelState::Error(Recovery::Halted);
            return;
        };

        // The URL embeds the token; keep it out of logs.
        let url = self.settings.endpoint.stream_url(&task_id, &token);
        let id = self.allocate_id();
        debug!(%task_id, connection = id, attempt = self.retries, "connecting task stream");
        let sink = NotificationSink::new(id, self.notifications.clone());
        match self.connector.connect(&url, sink) {
            Ok(transport) => {
                self.state = ChannelState::Connecting(Connection { id, transport });
            }
            Err(err) => {
                warn!(%task_id, error = %err, "transport construction failed");
                self.log.error(Failure::TransportConstruction, err.to_string());
                self.schedule_retry();
            }
        }
    }

    fn on_opened(&mut self) {
        self.state = match self.take_state() {
            ChannelState::Connecting(conn) => {
                self.retries = 0;
                info!(task_id = self.task_label(), "task stream open");
                self.log
                    .info(format!("connected to task {}", self.task_label()));
                ChannelState::Open(conn)
            }
            other => other,
        };
    }

    fn on_message(&mut self, frame: Frame) {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => {
                    self.log.raw(B64.encode(err.as_bytes()));
                    return;
                }
            },
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => {
                let terminal = self
                    .settings
                    .terminal
                    .terminal_status(&payload)
                    .map(str::to_string);
                self.log.event(payload);
                if let Some(status) = terminal {
                    self.finish(&status);
                }
            }
            Err(err) => {
                warn!(task_id = self.task_label(), error = %err, raw = %text, "undecodable task event");
                self.log
                    .error(Failure::MessageDecode, format!("failed to parse message: {err}"));
            }
        }
    }

    fn on_transport_error(&mut self, message: String) {
        warn!(task_id = self.task_label(), error = %message, "transport error");
        self.log
            .error(Failure::Transport, format!("transport error: {message}"));
        self.state = match self.take_state() {
            ChannelState::Connecting(conn) | ChannelState::Open(conn) => {
                ChannelState::Error(Recovery::Draining(conn))
            }
            other => other,
        };
    }

    fn on_closed(&mut self, close: CloseInfo) {
        // The transport is finished; dropping it releases its resources.
        drop(self.take_state());
        let reason = if close.reason.is_empty() {
            "none"
        } else {
            close.reason.as_str()
        };
        self.log.info(format!(
            "connection closed (code {}, reason: {reason}, clean: {})",
            close.code, close.clean
        ));
        if close.is_normal() {
            info!(task_id = self.task_label(), "task stream completed");
            self.retries = 0;
            self.state = ChannelState::Closed;
            return;
        }
        debug!(task_id = self.task_label(), code = close.code, "abnormal close");
        self.schedule_retry();
    }

    /// Terminal payload seen: stop without reconnecting.
    fn finish(&mut self, status: &str) {
        info!(task_id = self.task_label(), status, "task reached terminal status");
        self.log.info(format!(
            "task {} reached terminal status `{status}`",
            self.task_label()
        ));
        self.teardown("task finished");
        self.retries = 0;
        self.state = ChannelState::Closed;
    }

    fn schedule_retry(&mut self) {
        let policy = self.settings.reconnect;
        let attempt = self.retries.saturating_add(1);
        if !policy.allows(attempt) {
            warn!(
                task_id = self.task_label(),
                max_attempts = policy.max_attempts,
                "reconnect budget exhausted"
            );
            self.log.error(
                Failure::RetryBudgetExhausted,
                format!(
                    "max reconnect attempts reached ({})",
                    policy.max_attempts
                ),
            );
            self.state = ChannelState::Closed;
            return;
        }
        self.retries = attempt;
        let delay = policy.delay_for_attempt(attempt);
        self.log.info(format!(
            "reconnecting in {}ms (attempt {attempt}/{})",
            delay.as_millis(),
            policy.max_attempts
        ));
        let id = self.allocate_id();
        match RetryTimer::start(id, attempt, delay, self.notifications.clone()) {
            Ok(timer) => self.state = ChannelState::Error(Recovery::Backoff(timer)),
            Err(err) => {
                warn!(task_id = self.task_label(), error = %err, "cannot schedule reconnect");
                self.log.error(
                    Failure::TransportConstruction,
                    format!("cannot schedule reconnect: {err}"),
                );
                self.state = ChannelState::Error(Recovery::Halted);
            }
        }
    }

    /// Release whatever the current state holds and leave the channel idle.
    ///
    /// Every exit path (close, task switch, clearing, drop) goes through here
    /// so no transport or timer outlives its subscription.
    fn teardown(&mut self, reason: &str) {
        match self.take_state() {
            ChannelState::Connecting(conn)
            | ChannelState::Open(conn)
            | ChannelState::Error(Recovery::Draining(conn)) => {
                debug!(connection = conn.id, reason, "closing transport");
                conn.shut(NORMAL_CLOSURE, reason);
            }
            ChannelState::Error(Recovery::Backoff(timer)) => {
                debug!(timer = timer.id, reason, "cancelling reconnect timer");
            }
            ChannelState::Idle | ChannelState::Closed | ChannelState::Error(Recovery::Halted) => {}
        }
    }

    fn take_state(&mut self) -> ChannelState {
        std::mem::replace(&mut self.state, ChannelState::Idle)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn task_label(&self) -> &str {
        self.task_id.as_deref().unwrap_or("-")
    }

    #[cfg(test)]
    fn fire_pending_retry(&mut self) {
        let timer = self.state.timer().map(|t| t.id).expect("retry pending");
        self.dispatch(Notification::RetryDue { timer });
    }
}

impl Drop for TaskEventChannel {
    fn drop(&mut self) {
        self.teardown("channel released");
    }
}
