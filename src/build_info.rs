//! Compile-time build metadata for the CLI version surface.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commit hash captured by `build.rs` (suffixed `-dirty` for modified trees).
pub const GIT_COMMIT: &str = env!("TASKWATCH_BUILD_GIT_HASH");

/// UTC build timestamp captured by `build.rs`.
pub const BUILD_TIMESTAMP: &str = env!("TASKWATCH_BUILD_TIMESTAMP");

/// Version block printed by `taskwatch --version`.
pub const CLI_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("TASKWATCH_BUILD_GIT_HASH"),
    "\nbuilt: ",
    env!("TASKWATCH_BUILD_TIMESTAMP"),
);

/// Value sent as the `User-Agent` header on credential refresh requests.
pub fn user_agent() -> String {
    format!("taskwatch/{VERSION} ({GIT_COMMIT})")
}
