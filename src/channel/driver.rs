//! Async owner for a [`TaskEventChannel`].
//!
//! The channel lives inside one tokio task that serializes consumer commands,
//! transport notifications and timer expirations. Consumers hold a cloneable
//! [`ChannelHandle`] and observe progress through a `watch` snapshot.

use super::{
    ChannelEvent, ChannelSettings, ChannelStatus, Connector, Notification, PendingRetry,
    TaskEventChannel,
};
use crate::auth::TokenProvider;
use crate::error::ChannelError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

enum Command {
    Open(Option<String>),
    Close { intentional: bool },
    Send {
        payload: Value,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Shutdown,
}

/// Point-in-time view of a channel published after every transition.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub task_id: Option<String>,
    /// Changes whenever the log is replaced; invalidates event cursors.
    pub epoch: u64,
    pub status: ChannelStatus,
    pub events: Arc<Vec<ChannelEvent>>,
    pub pending_retry: Option<PendingRetry>,
    /// Error state with nothing scheduled (for example, no credential).
    pub halted: bool,
}

impl ChannelSnapshot {
    fn capture(channel: &TaskEventChannel) -> Self {
        Self {
            task_id: channel.task_id().map(str::to_string),
            epoch: channel.log().epoch(),
            status: channel.status(),
            events: Arc::new(channel.events().to_vec()),
            pending_retry: channel.pending_retry(),
            halted: channel.is_halted(),
        }
    }

    fn same_revision(&self, channel: &TaskEventChannel) -> bool {
        self.epoch == channel.log().epoch()
            && self.events.len() == channel.events().len()
            && self.status == channel.status()
            && self.pending_retry == channel.pending_retry()
            && self.halted == channel.is_halted()
            && self.task_id.as_deref() == channel.task_id()
    }

    /// True once the channel will not make progress without a new command.
    pub fn is_settled(&self) -> bool {
        self.status == ChannelStatus::Closed || self.halted
    }

    /// The most recent error entry, if any.
    pub fn last_error(&self) -> Option<&ChannelEvent> {
        self.events.iter().rev().find(|event| event.is_error())
    }
}

/// Cloneable control surface for a spawned channel.
///
/// The channel task exits (closing any transport and cancelling any pending
/// retry) once every handle is dropped or `shutdown` is called.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ChannelSnapshot>,
}

/// Spawn a channel task on the current tokio runtime.
pub fn spawn_channel(
    settings: ChannelSettings,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenProvider>,
) -> ChannelHandle {
    let (channel, notifications) = TaskEventChannel::new(settings, connector);
    let (publisher, snapshots) = watch::channel(ChannelSnapshot::capture(&channel));
    let (commands, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(channel, notifications, command_rx, tokens, publisher));
    ChannelHandle {
        commands,
        snapshots,
    }
}

impl ChannelHandle {
    /// Subscribe to `task_id`, or clear the subscription with `None`.
    pub fn open(&self, task_id: Option<&str>) -> Result<(), ChannelError> {
        self.submit(Command::Open(task_id.map(str::to_string)))
    }

    /// Intentional close: no reconnect follows.
    pub fn close_channel(&self) -> Result<(), ChannelError> {
        self.submit(Command::Close { intentional: true })
    }

    /// Drop the live transport and let the reconnect policy take over.
    pub fn reconnect(&self) -> Result<(), ChannelError> {
        self.submit(Command::Close { intentional: false })
    }

    /// Send one JSON payload. Fails with `InvalidState` unless the channel is open.
    pub async fn send_message(&self, payload: Value) -> Result<(), ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Send { payload, reply })?;
        rx.await.map_err(|_| ChannelError::Stopped)?
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> Result<ChannelSnapshot, ChannelError> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| ChannelError::Stopped)?;
        Ok(self.snapshots.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate` (checked immediately first).
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&ChannelSnapshot) -> bool,
    ) -> Result<ChannelSnapshot, ChannelError> {
        let snapshot = self
            .snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| ChannelError::Stopped)?;
        Ok(snapshot.clone())
    }

    /// Close the channel and stop its task.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn submit(&self, command: Command) -> Result<(), ChannelError> {
        self.commands
            .send(command)
            .map_err(|_| ChannelError::Stopped)
    }
}

async fn run(
    mut channel: TaskEventChannel,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    tokens: Arc<dyn TokenProvider>,
    publisher: watch::Sender<ChannelSnapshot>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Open(task_id)) => channel.open(task_id.as_deref(), Arc::clone(&tokens)),
                Some(Command::Close { intentional }) => channel.close(intentional),
                Some(Command::Send { payload, reply }) => {
                    let _ = reply.send(channel.send(&payload));
                }
                Some(Command::Shutdown) | None => break,
            },
            Some(notification) = notifications.recv() => channel.dispatch(notification),
        }
        publish(&channel, &publisher);
    }
    debug!(task_id = channel.task_id().unwrap_or("-"), "channel task stopping");
    channel.close(true);
    publish(&channel, &publisher);
}

fn publish(channel: &TaskEventChannel, publisher: &watch::Sender<ChannelSnapshot>) {
    publisher.send_if_modified(|current| {
        if current.same_revision(channel) {
            return false;
        }
        *current = ChannelSnapshot::capture(channel);
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::channel::{
        CloseInfo, EventKind, Failure, Frame, NORMAL_CLOSURE, RECONNECT_REQUESTED,
    };
    use crate::config::Config;
    use crate::testsupport::MockConnector;
    use serde_json::json;
    use std::time::Duration;

    fn spawn(connector: &MockConnector, token: StaticToken) -> ChannelHandle {
        spawn_channel(
            ChannelSettings::from_config(&Config::default()),
            Arc::new(connector.clone()),
            Arc::new(token),
        )
    }

    async fn settle(
        handle: &mut ChannelHandle,
        predicate: impl FnMut(&ChannelSnapshot) -> bool,
    ) -> ChannelSnapshot {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
            .await
            .expect("snapshot in time")
            .expect("channel alive")
    }

    #[tokio::test]
    async fn handle_drives_a_full_subscription() {
        let connector = MockConnector::default();
        let mut handle = spawn(&connector, StaticToken::new("abc"));

        handle.open(Some("t-1")).expect("open");
        settle(&mut handle, |s| s.status == ChannelStatus::Connecting).await;

        let attempt = connector.latest();
        attempt.transport.set_open(true);
        attempt.sink.opened();
        settle(&mut handle, |s| s.status == ChannelStatus::Open).await;

        handle
            .send_message(json!({"action": "ping"}))
            .await
            .expect("send while open");
        assert_eq!(attempt.transport.sent(), vec![r#"{"action":"ping"}"#.to_string()]);

        attempt
            .sink
            .message(Frame::Text(r#"{"status":"running"}"#.into()));
        let snapshot = settle(&mut handle, |s| {
            s.events.iter().any(|e| e.kind == EventKind::Event)
        })
        .await;
        assert_eq!(snapshot.task_id.as_deref(), Some("t-1"));

        handle.close_channel().expect("close");
        let snapshot = settle(&mut handle, |s| s.status == ChannelStatus::Closed).await;
        assert!(snapshot.is_settled());
        assert_eq!(
            attempt.transport.closed_with(),
            Some((NORMAL_CLOSURE, "closed by client".to_string()))
        );
    }

    #[tokio::test]
    async fn reconnect_schedules_the_first_retry() {
        let connector = MockConnector::default();
        let mut handle = spawn(&connector, StaticToken::new("abc"));
        handle.open(Some("t-1")).expect("open");
        settle(&mut handle, |s| s.status == ChannelStatus::Connecting).await;
        let attempt = connector.latest();
        attempt.transport.set_open(true);
        attempt.sink.opened();
        settle(&mut handle, |s| s.status == ChannelStatus::Open).await;

        handle.reconnect().expect("reconnect");
        settle(&mut handle, |s| {
            s.events
                .iter()
                .any(|e| e.message.as_deref() == Some("reconnect requested by client"))
        })
        .await;
        assert_eq!(
            attempt.transport.closed_with(),
            Some((RECONNECT_REQUESTED, "reconnect requested".to_string()))
        );

        attempt.transport.set_open(false);
        attempt
            .sink
            .closed(CloseInfo::new(RECONNECT_REQUESTED, "reconnect requested", true));
        let snapshot = settle(&mut handle, |s| s.pending_retry.is_some()).await;
        assert_eq!(snapshot.status, ChannelStatus::Error);
        assert_eq!(snapshot.pending_retry.map(|p| p.attempt), Some(1));
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let connector = MockConnector::default();
        let handle = spawn(&connector, StaticToken::new("abc"));
        let err = handle
            .send_message(json!({}))
            .await
            .expect_err("idle channel rejects sends");
        assert_eq!(err, ChannelError::invalid_state(ChannelStatus::Idle, "send"));
    }

    #[tokio::test]
    async fn missing_credential_halts() {
        let connector = MockConnector::default();
        let mut handle = spawn(&connector, StaticToken::empty());
        handle.open(Some("t-1")).expect("open");
        let snapshot = settle(&mut handle, |s| s.is_settled()).await;
        assert!(snapshot.halted);
        assert_eq!(
            snapshot.last_error().and_then(|e| e.failure),
            Some(Failure::NoCredential)
        );
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn dropping_every_handle_tears_down_the_transport() {
        let connector = MockConnector::default();
        let mut handle = spawn(&connector, StaticToken::new("abc"));
        handle.open(Some("t-1")).expect("open");
        settle(&mut handle, |s| s.status == ChannelStatus::Connecting).await;
        let attempt = connector.latest();
        drop(handle);

        tokio::time::timeout(Duration::from_secs(5), async {
            while attempt.transport.closed_with().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transport closed after handles dropped");
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let connector = MockConnector::default();
        let mut handle = spawn(&connector, StaticToken::new("abc"));
        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if handle.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(handle.open(Some("t-1")), Err(ChannelError::Stopped));
    }
}
