//! Default configuration constants.

/// Embedded default `taskwatch.toml` written by `taskwatch init`.
pub(super) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/taskwatch.toml");
/// Config file name used for local and global lookups.
pub(super) const CONFIG_FILE_NAME: &str = "taskwatch.toml";
/// Directory under the config root holding taskwatch files.
pub(super) const CONFIG_DIR_NAME: &str = "taskwatch";

pub(super) const DEFAULT_HOST: &str = "localhost";
pub(super) const DEFAULT_PORT: u16 = 8080;
pub(super) const DEFAULT_STREAM_PATH: &str = "/ws/subscribe";
pub(super) const DEFAULT_REFRESH_PATH: &str = "/api/v1/auth/refresh";
/// Handshake and HTTP request timeout.
pub(super) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub(super) const DEFAULT_TERMINAL_FIELD: &str = "status";
pub(super) const DEFAULT_TERMINAL_VALUES: [&str; 3] = ["completed", "failed", "cancelled"];

/// Environment variable consulted for an access token before the store.
pub(super) const DEFAULT_TOKEN_ENV: &str = "TASKWATCH_TOKEN";
