//! Application entry orchestration for the taskwatch CLI.

use crate::app::credentials::{run_login_flow, run_logout_flow, run_token_flow};
use crate::app::init_flow::run_init_flow;
use crate::app::watch::{run_watch, WatchOptions};
use crate::cli::{Args, Command};
use taskwatch::config::{load_config_with_source, validate_config, Config};
use taskwatch::render::Notices;
use tracing::debug;

/// Top-level CLI entrypoint. Returns the process exit code.
pub(crate) async fn run(args: Args) -> i32 {
    let notices = Notices::new(color_enabled(&args));

    if let Command::Init { force } = &args.command {
        return report(&notices, run_init_flow(&notices, *force));
    }

    let config = match load_effective_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            notices.error(&msg);
            return 1;
        }
    };

    match &args.command {
        Command::Watch {
            task_id,
            token,
            json,
            no_color,
        } => {
            let options = WatchOptions {
                task_id: task_id.clone(),
                token: token.clone(),
                json: *json,
                color: !*no_color,
            };
            match run_watch(&notices, &config, options).await {
                Ok(code) => code,
                Err(msg) => {
                    notices.error(&msg);
                    1
                }
            }
        }
        Command::Login {
            token,
            refresh_token,
            expires_in,
        } => report(
            &notices,
            run_login_flow(
                &notices,
                &config,
                token.as_deref(),
                refresh_token.as_deref(),
                *expires_in,
            ),
        ),
        Command::Logout => report(&notices, run_logout_flow(&notices, &config)),
        Command::Token => report(&notices, run_token_flow(&notices, &config)),
        Command::Init { .. } => 0,
    }
}

fn report(notices: &Notices, result: Result<(), String>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(msg) => {
            notices.error(&msg);
            1
        }
    }
}

fn color_enabled(args: &Args) -> bool {
    !matches!(args.command, Command::Watch { no_color: true, .. })
}

/// Load config, apply CLI overrides that outrank config files, then validate.
fn load_effective_config(args: &Args) -> Result<Config, String> {
    let loaded = load_config_with_source(args.config.as_deref()).map_err(|err| err.to_string())?;
    debug!(source = %loaded.source.describe(), "configuration loaded");
    let mut config = loaded.config;
    apply_cli_overrides(args, &mut config);
    validate_config(&config).map_err(|err| err.to_string())?;
    Ok(config)
}

fn apply_cli_overrides(args: &Args, config: &mut Config) {
    if let Some(host) = &args.host {
        config.backend.host = host.clone();
    }
    if let Some(port) = args.port {
        config.backend.port = Some(port);
    }
    if let Some(protocol) = args.protocol {
        config.backend.protocol = protocol;
    }
}
