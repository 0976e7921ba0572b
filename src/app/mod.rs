//! Binary-local application orchestration helpers.
//!
//! `main.rs` only parses arguments and sets up logging; each subcommand's
//! flow lives here.

pub(crate) mod credentials;
pub(crate) mod entry;
pub(crate) mod init_flow;
pub(crate) mod signals;
pub(crate) mod watch;
