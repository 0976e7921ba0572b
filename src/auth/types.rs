//! Credential model types.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

const REFRESH_SAFETY_WINDOW_SECS: i64 = 90;

/// Credentials saved for one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absent when the backend did not say when the token expires.
    #[serde(default)]
    pub expires_at_unix: Option<i64>,
}

impl StoredCredential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at_unix: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the expiry `expires_in_secs` from now.
    pub fn expiring_in(mut self, expires_in_secs: i64) -> Self {
        self.expires_at_unix = Some(unix_now_secs().saturating_add(expires_in_secs));
        self
    }

    pub fn is_expiring_soon(&self) -> bool {
        self.expires_at_unix.is_some_and(|expires_at| {
            unix_now_secs().saturating_add(REFRESH_SAFETY_WINDOW_SECS) >= expires_at
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at_unix
            .is_some_and(|expires_at| unix_now_secs() >= expires_at)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

/// Health summary for stored backend credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHealth {
    pub backend: String,
    pub has_token: bool,
    pub refreshable: bool,
    pub expiring_soon: bool,
    pub expires_at_unix: Option<i64>,
}

pub fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
