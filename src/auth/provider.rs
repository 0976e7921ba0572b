//! Access-token providers consulted by the channel.
//!
//! The channel asks its provider once per connection attempt, so a provider
//! that changes its answer (rotation, refresh, logout) takes effect on the
//! next reconnect.

use std::sync::{Arc, RwLock};

/// Source of the current access token. `None` means no credential.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// A fixed token (for example from `--token`).
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn access_token(&self) -> Option<String> {
        if self.var.is_empty() {
            return None;
        }
        std::env::var(&self.var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// In-memory token shared between the channel and whoever keeps it current
/// (the refresh loop). Clones share one slot.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = token;
        }
    }
}

impl TokenProvider for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }
}

/// First provider with a non-blank token wins.
#[derive(Clone, Default)]
pub struct LayeredTokens {
    layers: Vec<Arc<dyn TokenProvider>>,
}

impl LayeredTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.layers.push(Arc::new(provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl TokenProvider for LayeredTokens {
    fn access_token(&self) -> Option<String> {
        self.layers
            .iter()
            .filter_map(|layer| layer.access_token())
            .find(|token| !token.trim().is_empty())
    }
}
