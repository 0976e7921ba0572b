//! Access-token refresh against the backend's refresh endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::provider::SharedToken;
use super::store::CredentialFile;
use super::types::{unix_now_secs, StoredCredential};
use crate::build_info;

/// Lifetime assumed when the refresh response omits or understates one.
const MIN_TOKEN_LIFETIME_SECS: i64 = 60;

/// Exchanges a refresh token for new credentials.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, current: &StoredCredential) -> Result<StoredCredential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// `POST {"refresh_token": ..}` to the backend's refresh URL.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenRefresher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        // Fall back to reqwest defaults if the builder fails.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(build_info::user_agent())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, current: &StoredCredential) -> Result<StoredCredential, AuthError> {
        let Some(refresh_token) = current
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
        else {
            return Err(AuthError::NoRefreshToken);
        };

        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(AuthError::LoginExpired);
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected { status, body });
        }

        let payload: RefreshResponse = response.json().await?;
        let access_token = payload.access_token.unwrap_or_default().trim().to_string();
        if access_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "did not include access_token".to_string(),
            ));
        }
        let refresh_token = payload
            .refresh_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .or_else(|| current.refresh_token.clone());
        let expires_at_unix = payload.expires_in.map(|secs| {
            unix_now_secs().saturating_add(secs.max(MIN_TOKEN_LIFETIME_SECS))
        });
        Ok(StoredCredential {
            access_token,
            refresh_token,
            expires_at_unix,
        })
    }
}

/// Load the stored credential, refreshing and persisting it first when it
/// is about to expire and can be refreshed.
pub async fn ensure_fresh_credential(
    file: &CredentialFile,
    refresher: &dyn TokenRefresher,
) -> Result<Option<StoredCredential>, AuthError> {
    let Some(current) = file.load()? else {
        return Ok(None);
    };
    if !current.is_expiring_soon() || !current.can_refresh() {
        return Ok(Some(current));
    }
    debug!(backend = file.backend(), "refreshing access token");
    let refreshed = refresher.refresh(&current).await?;
    file.save(refreshed.clone())?;
    info!(backend = file.backend(), "access token refreshed");
    Ok(Some(refreshed))
}

/// Keep `shared` in sync with a fresh stored credential until aborted.
///
/// Refresh failures are logged and retried on the next tick; a revoked login
/// clears the shared token so the next reconnect reports a missing
/// credential instead of replaying a dead token.
pub fn spawn_refresh_loop(
    file: CredentialFile,
    refresher: Arc<dyn TokenRefresher>,
    shared: SharedToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match ensure_fresh_credential(&file, refresher.as_ref()).await {
                Ok(credential) => shared.set(credential.map(|value| value.access_token)),
                Err(err) if err.needs_login() => {
                    warn!(backend = file.backend(), error = %err, "stored login can no longer be refreshed");
                    shared.set(None);
                }
                Err(err) => warn!(backend = file.backend(), error = %err, "token refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenProvider;
    use crate::testsupport::TestTempDir;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}/api/v1/auth/refresh", listener.local_addr().expect("addr"));
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.expect("read");
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    fn refreshable() -> StoredCredential {
        StoredCredential::new("old-access")
            .with_refresh_token("old-refresh")
            .expiring_in(10)
    }

    #[tokio::test]
    async fn http_refresh_posts_the_refresh_token() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"access_token":"new-access","expires_in":3600}"#,
        )
        .await;
        let refresher = HttpTokenRefresher::new(url, Duration::from_secs(5));

        let refreshed = refresher.refresh(&refreshable()).await.expect("refresh");
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!refreshed.is_expiring_soon());

        let request = server.await.expect("server");
        assert!(request.starts_with("POST /api/v1/auth/refresh"), "got: {request}");
        assert!(request.contains(r#""refresh_token":"old-refresh""#), "got: {request}");
    }

    #[tokio::test]
    async fn unauthorized_refresh_means_login_expired() {
        let (url, _server) = serve_once("401 Unauthorized", "{}").await;
        let refresher = HttpTokenRefresher::new(url, Duration::from_secs(5));
        let err = refresher.refresh(&refreshable()).await.expect_err("401");
        assert!(matches!(err, AuthError::LoginExpired));
    }

    #[tokio::test]
    async fn server_errors_keep_status_and_body() {
        let (url, _server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
        let refresher = HttpTokenRefresher::new(url, Duration::from_secs(5));
        let err = refresher.refresh(&refreshable()).await.expect_err("503");
        assert_eq!(err.to_string(), r#"status 503: {"error":"down"}"#);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_rejected_locally() {
        let refresher = HttpTokenRefresher::new("http://127.0.0.1:9/unused", Duration::from_secs(1));
        let err = refresher
            .refresh(&StoredCredential::new("a"))
            .await
            .expect_err("nothing to refresh with");
        assert!(err.to_string().contains("no refresh token"));
    }

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, current: &StoredCredential) -> Result<StoredCredential, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StoredCredential {
                access_token: format!("fresh-{n}"),
                refresh_token: current.refresh_token.clone(),
                expires_at_unix: Some(unix_now_secs() + 3600),
            })
        }
    }

    #[tokio::test]
    async fn ensure_fresh_refreshes_only_expiring_credentials() {
        let tmp = TestTempDir::new("refresh");
        let file = CredentialFile::at(tmp.child("credentials.json"), "example.com:8080");
        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };

        assert_eq!(ensure_fresh_credential(&file, &refresher).await.expect("empty"), None);

        file.save(refreshable()).expect("save");
        let fresh = ensure_fresh_credential(&file, &refresher)
            .await
            .expect("refresh")
            .expect("credential");
        assert_eq!(fresh.access_token, "fresh-0");
        assert_eq!(file.load().expect("load"), Some(fresh.clone()));

        let again = ensure_fresh_credential(&file, &refresher)
            .await
            .expect("no-op")
            .expect("credential");
        assert_eq!(again, fresh);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_loop_publishes_the_fresh_token() {
        let tmp = TestTempDir::new("refresh-loop");
        let file = CredentialFile::at(tmp.child("credentials.json"), "example.com:8080");
        file.save(refreshable()).expect("save");
        let shared = SharedToken::new(Some("old-access".into()));

        let task = spawn_refresh_loop(
            file,
            Arc::new(CountingRefresher {
                calls: AtomicUsize::new(0),
            }),
            shared.clone(),
            Duration::from_millis(10),
        );
        let published = tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                if shared.access_token().as_deref() == Some("fresh-0") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        task.abort();
        assert!(published.is_ok());
    }
}
