//! `taskwatch watch`: follow one task's event stream until it settles.

use crate::app::credentials::credential_file;
use crate::app::signals::wait_for_shutdown_signal;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use taskwatch::auth::{
    ensure_fresh_credential, spawn_refresh_loop, EnvToken, HttpTokenRefresher, LayeredTokens,
    SharedToken, StaticToken, TokenRefresher,
};
use taskwatch::channel::{
    spawn_channel, ChannelHandle, ChannelSettings, ChannelSnapshot, ChannelStatus, WsConnector,
};
use taskwatch::config::Config;
use taskwatch::render::{EventSink, JsonLinesRenderer, Notices, TerminalRenderer};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) struct WatchOptions {
    pub task_id: String,
    pub token: Option<String>,
    pub json: bool,
    pub color: bool,
}

/// Run a watch to completion and return the exit code.
pub(crate) async fn run_watch(
    notices: &Notices,
    config: &Config,
    options: WatchOptions,
) -> Result<i32, String> {
    let settings = ChannelSettings::from_config(config);
    let (tokens, refresh_task) = build_token_chain(notices, config, &settings, &options).await;

    let connector = Arc::new(WsConnector::new(config.backend.request_timeout()));
    let mut handle = spawn_channel(settings, connector, Arc::new(tokens));
    handle
        .open(Some(&options.task_id))
        .map_err(|err| err.to_string())?;

    let mut sink: Box<dyn EventSink> = if options.json {
        Box::new(JsonLinesRenderer::stdout())
    } else {
        Box::new(TerminalRenderer::stdout(options.color))
    };
    let outcome = follow(&mut handle, sink.as_mut()).await;

    handle.shutdown();
    if let Some(task) = refresh_task {
        task.abort();
    }
    let last = outcome?;
    Ok(exit_code(&last))
}

/// Flag token, then the configured environment variable, then the stored
/// login (kept fresh in the background when it can be refreshed).
async fn build_token_chain(
    notices: &Notices,
    config: &Config,
    settings: &ChannelSettings,
    options: &WatchOptions,
) -> (LayeredTokens, Option<JoinHandle<()>>) {
    let flag = options
        .token
        .as_deref()
        .map(StaticToken::new)
        .unwrap_or_else(StaticToken::empty);
    let tokens = LayeredTokens::new()
        .with(flag)
        .with(EnvToken::new(config.auth.token_env.clone()));

    let file = match credential_file(config) {
        Ok(file) => file,
        Err(err) => {
            debug!(error = %err, "credential store unavailable");
            return (tokens, None);
        }
    };
    let refresher: Arc<dyn TokenRefresher> = Arc::new(HttpTokenRefresher::new(
        settings.endpoint.http_url(&config.backend.refresh_path),
        config.backend.request_timeout(),
    ));

    let stored = match ensure_fresh_credential(&file, refresher.as_ref()).await {
        Ok(stored) => stored,
        Err(err) => {
            // Use whatever is on disk; the backend decides whether it still works.
            notices.warn(&format!("could not refresh stored login: {err}"));
            file.load().unwrap_or_else(|err| {
                warn!(error = %err, "failed to read stored login");
                None
            })
        }
    };
    let refreshable = stored.as_ref().is_some_and(|credential| credential.can_refresh());
    let shared = SharedToken::new(stored.map(|credential| credential.access_token));
    let refresh_task = refreshable
        .then(|| spawn_refresh_loop(file, refresher, shared.clone(), REFRESH_INTERVAL));
    (tokens.with(shared), refresh_task)
}

/// Render snapshots until the channel settles. The first shutdown signal
/// closes the channel; rendering continues until the close lands.
async fn follow(
    handle: &mut ChannelHandle,
    sink: &mut dyn EventSink,
) -> Result<ChannelSnapshot, String> {
    let (signal_tx, mut signal_rx) = oneshot::channel();
    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                let _ = signal_tx.send(());
            }
            Err(err) => {
                // Keep the sender alive so the receiver never resolves.
                warn!(error = %err, "failed to install signal handlers");
                std::future::pending::<()>().await;
                drop(signal_tx);
            }
        }
    });

    let mut cursor = EventCursor::default();
    let mut snapshot = handle.snapshot();
    let mut interrupted = false;
    let result = loop {
        if let Err(err) = cursor.render(&snapshot, sink) {
            break Err(format!("failed to write output: {err}"));
        }
        if snapshot.is_settled() {
            break Ok(snapshot);
        }
        let signalled = tokio::select! {
            changed = handle.changed() => match changed {
                Ok(next) => {
                    snapshot = next;
                    false
                }
                Err(err) => break Err(err.to_string()),
            },
            _ = &mut signal_rx, if !interrupted => true,
        };
        if signalled {
            interrupted = true;
            debug!("shutdown signal received; closing channel");
            if let Err(err) = handle.close_channel() {
                break Err(err.to_string());
            }
        }
    };
    signal_task.abort();
    result
}

fn exit_code(snapshot: &ChannelSnapshot) -> i32 {
    let fatal = snapshot
        .last_error()
        .and_then(|event| event.failure)
        .is_some_and(|failure| failure.is_fatal());
    if fatal {
        1
    } else {
        0
    }
}

/// Tracks what has already been rendered across snapshots.
#[derive(Debug, Default)]
struct EventCursor {
    epoch: Option<u64>,
    next_seq: u64,
    status: Option<ChannelStatus>,
}

impl EventCursor {
    fn render(&mut self, snapshot: &ChannelSnapshot, sink: &mut dyn EventSink) -> io::Result<()> {
        if self.epoch != Some(snapshot.epoch) {
            self.epoch = Some(snapshot.epoch);
            self.next_seq = 0;
        }
        let start = self.next_seq;
        for event in snapshot.events.iter().filter(|event| event.seq >= start) {
            sink.event(event)?;
            self.next_seq = event.seq + 1;
        }
        if self.status != Some(snapshot.status) {
            self.status = Some(snapshot.status);
            if snapshot.status != ChannelStatus::Idle {
                sink.status(snapshot.task_id.as_deref(), snapshot.status)?;
            }
        }
        Ok(())
    }
}
