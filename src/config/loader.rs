//! Top-level config loading pipeline.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::env::apply_env_overrides;
use super::init::config_root_dir;
use super::sources::read_config_text_with_sources;
use super::{Config, LoadedConfig};

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    Ok(load_config_with_source(path_override)?.config)
}

/// Load configuration and report which file it came from.
pub fn load_config_with_source(path_override: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

pub(super) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&config_text)?;
    apply_env_overrides(&mut config, &env_lookup)?;
    validate_config(&config)?;
    Ok(LoadedConfig { config, source })
}

/// Reject settings the channel cannot work with.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let backend = &config.backend;
    if backend.host.trim().is_empty() {
        return Err(ConfigError::Invalid("backend.host must not be empty".into()));
    }
    if backend.port == Some(0) {
        return Err(ConfigError::Invalid("backend.port must be between 1 and 65535".into()));
    }
    for (key, path) in [
        ("backend.stream_path", &backend.stream_path),
        ("backend.refresh_path", &backend.refresh_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "{key} must start with `/` (got `{path}`)"
            )));
        }
    }
    let reconnect = &config.reconnect;
    if reconnect.max_delay_ms < reconnect.initial_delay_ms {
        return Err(ConfigError::Invalid(format!(
            "reconnect.max_delay_ms ({}) must not be smaller than reconnect.initial_delay_ms ({})",
            reconnect.max_delay_ms, reconnect.initial_delay_ms
        )));
    }
    Ok(())
}
