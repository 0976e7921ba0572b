//! `taskwatch init`: write the bundled default config.

use taskwatch::config::{initialize_default_global_config, GlobalConfigInitResult};
use taskwatch::render::Notices;

pub(crate) fn run_init_flow(notices: &Notices, force: bool) -> Result<(), String> {
    let result = initialize_default_global_config(force)
        .map_err(|err| format!("failed to initialize ~/.config/taskwatch: {err}"))?;
    render_init_result(notices, &result);
    Ok(())
}

fn render_init_result(notices: &Notices, result: &GlobalConfigInitResult) {
    match result {
        GlobalConfigInitResult::Created { path } => {
            notices.section("initialized taskwatch config");
            notices.field("path", &path.display().to_string());
        }
        GlobalConfigInitResult::Overwritten { path, backup_path } => {
            notices.section("reinitialized taskwatch config");
            notices.field("path", &path.display().to_string());
            notices.field("backup", &backup_path.display().to_string());
        }
        GlobalConfigInitResult::AlreadyInitialized { path } => {
            notices.section("taskwatch config already initialized");
            notices.field("path", &path.display().to_string());
            notices.detail("use `taskwatch init --force` to rewrite it from the template");
        }
    }
}
