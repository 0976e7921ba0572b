//! Tracing/logging bootstrap for the command-line tool.
//!
//! Diagnostics go to stderr so stdout stays clean for rendered events
//! (including `--json` output).

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,taskwatch=info";
const VERBOSE_FILTER: &str = "info,taskwatch=debug";
const LOG_ENV: &str = "TASKWATCH_LOG";

/// Initialize the global tracing subscriber.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `TASKWATCH_LOG`
/// 3) `--verbose`
/// 4) internal default filter
pub fn init(verbose: bool) {
    let env_filter = filter_from_env(verbose, |name| env::var(name).ok());
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_env<FEnv>(verbose: bool, env_lookup: FEnv) -> EnvFilter
where
    FEnv: Fn(&str) -> Option<String>,
{
    for name in [EnvFilter::DEFAULT_ENV, LOG_ENV] {
        if let Some(filter) = env_lookup(name)
            .filter(|value| !value.trim().is_empty())
            .and_then(|value| EnvFilter::try_new(value).ok())
        {
            return filter;
        }
    }
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}
