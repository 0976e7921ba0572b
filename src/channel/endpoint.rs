//! Stream address derivation.

use crate::config::{BackendConfig, BackendProtocol};

/// Where a task's event stream lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    host: String,
    port: Option<u16>,
    protocol: BackendProtocol,
    stream_path: String,
}

impl StreamEndpoint {
    pub fn from_backend(backend: &BackendConfig) -> Self {
        Self {
            host: normalize_host(&backend.host),
            port: backend.port,
            protocol: backend.protocol,
            stream_path: backend.stream_path.clone(),
        }
    }

    /// `host[:port]`, also used as the credential-store key for a backend.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Stream URL for one connection attempt.
    ///
    /// The scheme is `wss` exactly when the backend speaks HTTPS. Both query
    /// values are percent-encoded.
    pub fn stream_url(&self, task_id: &str, access_token: &str) -> String {
        format!(
            "{}://{}{}?task_id={}&access_token={}",
            self.protocol.stream_scheme(),
            self.authority(),
            self.stream_path,
            urlencoding::encode(task_id),
            urlencoding::encode(access_token),
        )
    }

    /// HTTP(S) URL for a REST path on the same backend.
    pub fn http_url(&self, path: &str) -> String {
        format!("{}://{}{path}", self.protocol.http_scheme(), self.authority())
    }
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}
