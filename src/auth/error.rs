//! Failures of the credential store and the token refresh call.

use std::fmt;

#[derive(Debug)]
pub enum AuthError {
    /// Reading or writing the store file failed.
    Io(std::io::Error),
    /// The refresh request never produced a response.
    Http(reqwest::Error),
    /// The refresh endpoint answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The refresh endpoint refused the refresh token (401/403).
    LoginExpired,
    NoRefreshToken,
    NoConfigRoot,
    /// The store file exists but its JSON does not describe a store.
    MalformedStore(String),
    /// Key derivation, sealing or opening a record failed.
    Crypto(String),
    /// The refresh endpoint answered 2xx with an unusable body.
    MalformedResponse(String),
}

impl AuthError {
    /// True when only a new `taskwatch login` can recover.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::LoginExpired | Self::NoRefreshToken)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "credential store io: {err}"),
            Self::Http(err) => write!(f, "token refresh request failed: {err}"),
            Self::Rejected { status, body } if body.trim().is_empty() => {
                write!(f, "token refresh rejected with status {status}")
            }
            Self::Rejected { status, body } => {
                write!(f, "token refresh rejected with status {status}: {}", body.trim())
            }
            Self::LoginExpired => f.write_str(
                "saved login has expired or was revoked; run `taskwatch login` again",
            ),
            Self::NoRefreshToken => {
                f.write_str("no refresh token stored; run `taskwatch login` again")
            }
            Self::NoConfigRoot => {
                f.write_str("unable to resolve config root for credential storage")
            }
            Self::MalformedStore(msg) | Self::Crypto(msg) => f.write_str(msg),
            Self::MalformedResponse(msg) => write!(f, "token refresh response {msg}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}
