//! taskwatch: follow a backend task's live event stream over WebSocket.
//!
//! The core is [`channel::TaskEventChannel`], a state machine that owns one
//! subscription: it derives the stream URL, reconnects with capped
//! exponential backoff, and keeps an ordered log of everything that happened.
//! Applications usually drive it through [`channel::spawn_channel`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskwatch::auth::EnvToken;
//! use taskwatch::channel::{spawn_channel, ChannelSettings, WsConnector};
//! use taskwatch::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?;
//! let mut handle = spawn_channel(
//!     ChannelSettings::from_config(&config),
//!     Arc::new(WsConnector::default()),
//!     Arc::new(EnvToken::new("TASKWATCH_TOKEN")),
//! );
//! handle.open(Some("task-42"))?;
//! let done = handle.wait_for(|snapshot| snapshot.is_settled()).await?;
//! for event in done.events.iter() {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod build_info;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;
#[cfg(test)]
pub(crate) mod testsupport;
