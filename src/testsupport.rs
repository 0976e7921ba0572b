//! Shared test fixtures: temp dirs, a scripted connector and credential-store
//! fixtures.

use crate::channel::{Connector, NotificationSink, Transport};
use crate::error::TransportError;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary directory fixture with best-effort cleanup.
#[derive(Debug)]
pub struct TestTempDir {
    path: PathBuf,
}

impl TestTempDir {
    /// Create a unique temporary directory with a readable prefix.
    pub fn new(prefix: &str) -> Self {
        let suffix = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let dir = std::env::temp_dir().join(format!("taskwatch-{prefix}-{millis}-{suffix}"));
        fs::create_dir_all(&dir).expect("failed to create temporary fixture directory");
        Self { path: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Write UTF-8 text to a child path, creating parent directories as needed.
    pub fn write_text(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories for fixture");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        path
    }
}

impl Drop for TestTempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Plaintext (pre-encryption) credential store with one backend record.
pub fn credential_store_json_fixture(
    backend: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at_unix: Option<i64>,
) -> String {
    json!({
        "version": 1,
        "backends": {
            backend: {
                "access_token": access_token,
                "refresh_token": refresh_token,
                "expires_at_unix": expires_at_unix
            }
        }
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Scripted connector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockTransportState {
    open: bool,
    sent: Vec<String>,
    closed_with: Option<(u16, String)>,
}

/// Test-side view of one mock transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransportHandle {
    pub fn set_open(&self, open: bool) {
        self.state.lock().expect("mock transport lock").open = open;
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().expect("mock transport lock").sent.clone()
    }

    /// Code and reason of the first `close` call, if any.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.state.lock().expect("mock transport lock").closed_with.clone()
    }
}

struct MockTransport {
    handle: MockTransportHandle,
}

impl Transport for MockTransport {
    fn is_open(&self) -> bool {
        self.handle.state.lock().expect("mock transport lock").open
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock().expect("mock transport lock");
        if !state.open {
            return Err(TransportError::Send("mock transport is not open".into()));
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut state = self.handle.state.lock().expect("mock transport lock");
        state.open = false;
        state
            .closed_with
            .get_or_insert_with(|| (code, reason.to_string()));
    }
}

/// One recorded `connect` call.
#[derive(Debug, Clone)]
pub struct MockAttempt {
    pub url: String,
    pub connection: u64,
    pub sink: NotificationSink,
    pub transport: MockTransportHandle,
}

#[derive(Debug, Default)]
struct MockConnectorState {
    attempts: Vec<MockAttempt>,
    failures_left: usize,
}

/// Connector that records every attempt and never touches the network.
///
/// Tests drive the attempt through its `sink` (or by dispatching
/// notifications directly) and inspect its `transport`.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
}

impl MockConnector {
    /// Make the next `count` connect calls fail construction.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().expect("mock connector lock").failures_left = count;
    }

    /// Successful attempts so far.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().expect("mock connector lock").attempts.len()
    }

    pub fn latest(&self) -> MockAttempt {
        self.state
            .lock()
            .expect("mock connector lock")
            .attempts
            .last()
            .cloned()
            .expect("at least one connect attempt")
    }

    pub fn urls(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("mock connector lock")
            .attempts
            .iter()
            .map(|attempt| attempt.url.clone())
            .collect()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        url: &str,
        sink: NotificationSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.state.lock().expect("mock connector lock");
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(TransportError::Construction("scripted failure".into()));
        }
        let handle = MockTransportHandle::default();
        state.attempts.push(MockAttempt {
            url: url.to_string(),
            connection: sink.connection(),
            sink,
            transport: handle.clone(),
        });
        Ok(Box::new(MockTransport { handle }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_fixture_writes_and_resolves_paths() {
        let fixture = TestTempDir::new("fixture");
        let file = fixture.write_text("nested/file.txt", "hello");
        assert_eq!(fs::read_to_string(file).unwrap(), "hello");
    }

    #[test]
    fn credential_fixture_contains_backend_record() {
        let raw = credential_store_json_fixture("example.com:8080", "a", None, Some(123));
        assert!(raw.contains("\"backends\""));
        assert!(raw.contains("\"example.com:8080\""));
    }
}
