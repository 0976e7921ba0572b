//! Embeds commit and build-time metadata for `taskwatch --version`.
//!
//! Missing git or date tooling degrades to "unknown" markers instead of
//! failing the build.

use std::env;
use std::path::Path;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const HASH_VAR: &str = "TASKWATCH_BUILD_GIT_HASH";
const TIMESTAMP_VAR: &str = "TASKWATCH_BUILD_TIMESTAMP";

fn main() {
    watch_git_head();
    println!("cargo:rerun-if-env-changed={HASH_VAR}");
    println!("cargo:rerun-if-env-changed={TIMESTAMP_VAR}");

    let commit = env::var(HASH_VAR).unwrap_or_else(|_| describe_commit());
    let built = env::var(TIMESTAMP_VAR).unwrap_or_else(|_| utc_timestamp());

    println!("cargo:rustc-env={HASH_VAR}={commit}");
    println!("cargo:rustc-env={TIMESTAMP_VAR}={built}");
}

fn watch_git_head() {
    let head = Path::new(".git").join("HEAD");
    if !head.exists() {
        return;
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    if let Ok(contents) = std::fs::read_to_string(&head) {
        if let Some(reference) = contents.trim().strip_prefix("ref: ") {
            println!("cargo:rerun-if-changed=.git/{reference}");
        }
    }
}

fn describe_commit() -> String {
    let Some(hash) = capture("git", &["rev-parse", "--short=12", "HEAD"]) else {
        return "unknown".to_string();
    };
    // A non-empty porcelain listing means uncommitted edits went into this build.
    let dirty = capture("git", &["status", "--porcelain", "--untracked-files=no"]).is_some();
    if dirty {
        format!("{hash}-dirty")
    } else {
        hash
    }
}

fn utc_timestamp() -> String {
    capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]).unwrap_or_else(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        format!("unix:{secs}")
    })
}

fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
