//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`TASKWATCH_HOST`, `TASKWATCH_PORT`,
//!    `TASKWATCH_PROTOCOL`, `TASKWATCH_STREAM_PATH`,
//!    `TASKWATCH_MAX_RECONNECT_ATTEMPTS`, `TASKWATCH_REQUEST_TIMEOUT_SECS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./taskwatch.toml in the current directory
//! 4. $XDG_CONFIG_HOME/taskwatch/taskwatch.toml (or ~/.config/taskwatch/taskwatch.toml)
//! 5. Built-in defaults
//!
//! Command-line flags are applied by the caller after loading.

mod defaults;
mod env;
mod init;
mod loader;
mod sources;
mod types;

pub use init::{config_root_dir, default_global_config_path, initialize_default_global_config};
pub use loader::{load_config, load_config_with_source, validate_config};
pub use types::{
    AuthConfig, BackendConfig, BackendProtocol, Config, ConfigSource, GlobalConfigInitResult,
    LoadedConfig, ReconnectConfig, TerminalConfig,
};
