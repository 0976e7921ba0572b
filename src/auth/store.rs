//! Persistent credential store.
//!
//! One JSON file holds credentials for every backend the user logged into,
//! keyed by `host[:port]`. Records are always written encrypted; a plaintext
//! file from an older build is re-written encrypted the first time it loads.

use crate::config::config_root_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::crypto::{decrypt_store, encrypt_store, looks_encrypted_store, EncryptedCredentialStore};
use super::error::AuthError;
use super::types::{CredentialHealth, StoredCredential};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CredentialStore {
    #[serde(default)]
    pub(crate) version: u32,
    #[serde(default)]
    pub(crate) backends: BTreeMap<String, StoredCredential>,
}

/// Returns the default store path (`~/.config/taskwatch/credentials.json`).
pub fn default_credential_store_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("taskwatch").join("credentials.json"))
}

/// The credential record for one backend inside a store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFile {
    path: PathBuf,
    backend: String,
}

impl CredentialFile {
    pub fn at(path: impl Into<PathBuf>, backend: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            backend: backend.into(),
        }
    }

    /// The record for `backend` in the default store file.
    pub fn for_backend(backend: impl Into<String>) -> Result<Self, AuthError> {
        let path = default_credential_store_path().ok_or(AuthError::NoConfigRoot)?;
        Ok(Self::at(path, backend))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn load(&self) -> Result<Option<StoredCredential>, AuthError> {
        let store = load_store(&self.path)?;
        Ok(store.backends.get(&self.backend).cloned())
    }

    pub fn save(&self, credential: StoredCredential) -> Result<(), AuthError> {
        let mut store = load_store(&self.path)?;
        store.backends.insert(self.backend.clone(), credential);
        write_store(&self.path, &store)
    }

    /// Remove the record. Returns `true` when one existed.
    pub fn remove(&self) -> Result<bool, AuthError> {
        let mut store = load_store(&self.path)?;
        let removed = store.backends.remove(&self.backend).is_some();
        if removed {
            write_store(&self.path, &store)?;
        }
        Ok(removed)
    }

    /// Inspect the record without modifying it.
    pub fn health(&self) -> Result<CredentialHealth, AuthError> {
        let credential = self.load()?;
        Ok(CredentialHealth {
            backend: self.backend.clone(),
            has_token: credential.is_some(),
            refreshable: credential.as_ref().is_some_and(StoredCredential::can_refresh),
            expiring_soon: credential
                .as_ref()
                .is_some_and(StoredCredential::is_expiring_soon),
            expires_at_unix: credential.and_then(|value| value.expires_at_unix),
        })
    }
}

/// Load and decode the store from disk, including plaintext migration.
pub(crate) fn load_store(path: &Path) -> Result<CredentialStore, AuthError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CredentialStore::default())
        }
        Err(err) => return Err(AuthError::Io(err)),
    };
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| {
        AuthError::MalformedStore(format!(
            "failed to parse credential store `{}`: {err}",
            path.display()
        ))
    })?;

    if looks_encrypted_store(&value) {
        let encrypted: EncryptedCredentialStore = serde_json::from_value(value).map_err(|err| {
            AuthError::MalformedStore(format!(
                "failed to parse encrypted credential store `{}`: {err}",
                path.display()
            ))
        })?;
        return decrypt_store(&encrypted);
    }

    let parsed: CredentialStore = serde_json::from_value(value).map_err(|err| {
        AuthError::MalformedStore(format!(
            "failed to parse credential store `{}`: {err}",
            path.display()
        ))
    })?;
    if !parsed.backends.is_empty() {
        // Migration is best effort; the plaintext copy still loads.
        if let Err(err) = write_store(path, &parsed) {
            warn!(path = %path.display(), error = %err, "failed to encrypt plaintext credential store");
        }
    }
    Ok(parsed)
}

/// Encrypt and persist the store with owner-only permissions.
pub(crate) fn write_store(path: &Path, store: &CredentialStore) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
        }
    }

    let encrypted = encrypt_store(store)?;
    let text = serde_json::to_string_pretty(&encrypted).map_err(|err| {
        AuthError::MalformedStore(format!("failed to serialize encrypted credential store: {err}"))
    })?;
    let mut options = std::fs::OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    #[cfg(unix)]
    {
        // `mode` only applies on create; re-assert for pre-existing files.
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}
