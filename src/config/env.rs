//! `TASKWATCH_*` environment overrides.

use crate::error::ConfigError;

use super::{BackendProtocol, Config};

pub(super) const ENV_HOST: &str = "TASKWATCH_HOST";
pub(super) const ENV_PORT: &str = "TASKWATCH_PORT";
pub(super) const ENV_PROTOCOL: &str = "TASKWATCH_PROTOCOL";
pub(super) const ENV_STREAM_PATH: &str = "TASKWATCH_STREAM_PATH";
pub(super) const ENV_MAX_RECONNECT_ATTEMPTS: &str = "TASKWATCH_MAX_RECONNECT_ATTEMPTS";
pub(super) const ENV_REQUEST_TIMEOUT_SECS: &str = "TASKWATCH_REQUEST_TIMEOUT_SECS";

pub(super) fn apply_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(host) = non_empty(env_lookup, ENV_HOST) {
        config.backend.host = host;
    }
    if let Some(port) = non_empty(env_lookup, ENV_PORT) {
        let parsed = port.parse::<u16>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_PORT} value `{port}`: expected a port number"
            ))
        })?;
        config.backend.port = Some(parsed);
    }
    if let Some(protocol) = non_empty(env_lookup, ENV_PROTOCOL) {
        config.backend.protocol = BackendProtocol::parse(&protocol).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "invalid {ENV_PROTOCOL} value `{protocol}`: expected `http` or `https`"
            ))
        })?;
    }
    if let Some(path) = non_empty(env_lookup, ENV_STREAM_PATH) {
        config.backend.stream_path = path;
    }
    if let Some(attempts) = non_empty(env_lookup, ENV_MAX_RECONNECT_ATTEMPTS) {
        config.reconnect.max_attempts = attempts.parse::<u32>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_MAX_RECONNECT_ATTEMPTS} value `{attempts}`: expected a non-negative integer"
            ))
        })?;
    }
    if let Some(timeout) = non_empty(env_lookup, ENV_REQUEST_TIMEOUT_SECS) {
        // Clamp to at least 1 second so a zero never disables the timeout.
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_REQUEST_TIMEOUT_SECS} value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        config.backend.request_timeout_secs = parsed.max(1);
    }
    Ok(())
}

fn non_empty<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
