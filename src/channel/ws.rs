//! WebSocket transport backed by tokio-tungstenite.
//!
//! Each connection attempt runs in its own tokio task that owns the socket.
//! The `Transport` handle held by the channel only talks to that task through
//! an outbound queue, so every `Transport` call returns immediately.

use super::transport::{CloseInfo, Connector, Frame, NotificationSink, Transport, ABNORMAL_CLOSURE};
use crate::build_info;
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Close code reported when the peer's close frame carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Creates tokio-tungstenite transports. Must be used inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        url: &str,
        sink: NotificationSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Construction(format!("no async runtime: {err}")))?;
        let mut request = url
            .into_client_request()
            .map_err(|err| TransportError::Construction(err.to_string()))?;
        if let Ok(agent) = HeaderValue::from_str(&build_info::user_agent()) {
            request.headers_mut().insert("User-Agent", agent);
        }

        let open = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run_socket(
            request,
            self.handshake_timeout,
            sink,
            Arc::clone(&open),
            rx,
        ));
        Ok(Box::new(WsTransport {
            open,
            outbound: tx,
            closing: false,
        }))
    }
}

struct WsTransport {
    open: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: bool,
}

impl Transport for WsTransport {
    fn is_open(&self) -> bool {
        !self.closing && self.open.load(Ordering::Acquire)
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Send("connection task has exited".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.open.store(false, Ordering::Release);
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

async fn run_socket(
    request: Request,
    handshake_timeout: Duration,
    sink: NotificationSink,
    open: Arc<AtomicBool>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let abnormal = || CloseInfo::new(ABNORMAL_CLOSURE, "", false);
    let handshake = tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request));

    let stream = tokio::select! {
        result = handshake => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => {
                sink.error(format!("connection failed: {err}"));
                sink.closed(abnormal());
                return;
            }
            Err(_) => {
                sink.error(format!(
                    "connection timed out after {}s",
                    handshake_timeout.as_secs()
                ));
                sink.closed(abnormal());
                return;
            }
        },
        command = outbound.recv() => {
            // Closed (or dropped) before the handshake finished.
            if let Some(Outbound::Close { code, reason }) = command {
                sink.closed(CloseInfo::new(code, reason, false));
            }
            return;
        }
    };

    open.store(true, Ordering::Release);
    sink.opened();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(Message::Text(text.into())).await {
                        open.store(false, Ordering::Release);
                        sink.error(err.to_string());
                        sink.closed(abnormal());
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    open.store(false, Ordering::Release);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    sink.closed(CloseInfo::new(code, reason, true));
                    return;
                }
                None => {
                    // Handle dropped without an explicit close.
                    open.store(false, Ordering::Release);
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => sink.message(Frame::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(bytes))) => sink.message(Frame::Binary(bytes.to_vec())),
                Some(Ok(Message::Close(frame))) => {
                    open.store(false, Ordering::Release);
                    let close = match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.as_str(), true),
                        None => CloseInfo::new(NO_STATUS_RECEIVED, "", true),
                    };
                    debug!(connection = sink.connection(), code = close.code, "peer closed");
                    let _ = write.close().await;
                    sink.closed(close);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    open.store(false, Ordering::Release);
                    sink.error(err.to_string());
                    sink.closed(abnormal());
                    return;
                }
                None => {
                    open.store(false, Ordering::Release);
                    sink.closed(abnormal());
                    return;
                }
            },
        }
    }
}
