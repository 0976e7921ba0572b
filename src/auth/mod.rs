//! Access-token sources and secure credential storage.
//!
//! Credentials saved by `taskwatch login` live under
//! `~/.config/taskwatch/credentials.json`, keyed by backend `host[:port]`
//! and encrypted with a machine-derived key.

mod crypto;
mod error;
mod provider;
mod refresh;
mod store;
mod types;

pub use error::AuthError;
pub use provider::{EnvToken, LayeredTokens, SharedToken, StaticToken, TokenProvider};
pub use refresh::{ensure_fresh_credential, spawn_refresh_loop, HttpTokenRefresher, TokenRefresher};
pub use store::{default_credential_store_path, CredentialFile};
pub use types::{unix_now_secs, CredentialHealth, StoredCredential};

#[cfg(test)]
mod tests {
    use super::store::{load_store, write_store, CredentialStore};
    use super::*;
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine;
    use crate::testsupport::{credential_store_json_fixture, TestTempDir};

    const BACKEND: &str = "example.com:8080";

    #[test]
    fn expiry_guard_triggers_near_expiration() {
        let almost_expired = StoredCredential::new("a").expiring_in(30);
        assert!(almost_expired.is_expiring_soon());
        assert!(!almost_expired.is_expired());

        let healthy = StoredCredential::new("a").expiring_in(600);
        assert!(!healthy.is_expiring_soon());

        let unknown = StoredCredential::new("a");
        assert!(!unknown.is_expiring_soon());
        assert!(!unknown.is_expired());
    }

    #[test]
    fn write_store_encrypts_tokens_on_disk() {
        let tmp = TestTempDir::new("auth-encrypt");
        let path = tmp.child("credentials.json");
        let credential = StoredCredential::new("access-plain-text")
            .with_refresh_token("refresh-plain-text")
            .expiring_in(3600);
        let mut store = CredentialStore::default();
        store.backends.insert(BACKEND.to_string(), credential.clone());

        write_store(&path, &store).expect("write encrypted store");
        let raw = std::fs::read_to_string(&path).expect("read encrypted file");
        assert!(raw.contains("\"encryption\""), "raw: {raw}");
        assert!(!raw.contains("access-plain-text"), "token leaked on disk");
        assert!(!raw.contains("refresh-plain-text"), "token leaked on disk");

        let loaded = load_store(&path).expect("load encrypted store");
        assert_eq!(loaded.backends.get(BACKEND), Some(&credential));
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TestTempDir::new("auth-perms");
        let file = CredentialFile::at(tmp.child("nested/credentials.json"), BACKEND);
        file.save(StoredCredential::new("a")).expect("save");
        let mode = std::fs::metadata(file.path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn plaintext_store_is_migrated_on_load() {
        let tmp = TestTempDir::new("auth-migrate");
        let path = tmp.write_text(
            "credentials.json",
            &credential_store_json_fixture(BACKEND, "legacy-access", None, None),
        );

        let loaded = load_store(&path).expect("load + migrate plaintext");
        assert_eq!(
            loaded
                .backends
                .get(BACKEND)
                .map(|value| value.access_token.as_str()),
            Some("legacy-access")
        );

        let migrated = std::fs::read_to_string(&path).expect("read migrated store");
        assert!(migrated.contains("\"encryption\""), "raw: {migrated}");
        assert!(!migrated.contains("legacy-access"), "plaintext token remained");
    }

    #[test]
    fn tampered_ciphertext_is_reported() {
        let tmp = TestTempDir::new("auth-tamper");
        let file = CredentialFile::at(tmp.child("credentials.json"), BACKEND);
        file.save(StoredCredential::new("token-a")).expect("save");

        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).expect("read"))
                .expect("parse encrypted json");
        let mut ciphertext = B64
            .decode(
                value["backends"][BACKEND]["ciphertext"]
                    .as_str()
                    .expect("ciphertext"),
            )
            .expect("base64 ciphertext");
        ciphertext[0] ^= 0x01;
        value["backends"][BACKEND]["ciphertext"] = serde_json::Value::String(B64.encode(ciphertext));
        std::fs::write(
            file.path(),
            serde_json::to_string_pretty(&value).expect("serialize tampered"),
        )
        .expect("write tampered");

        let err = file.load().expect_err("tampered payload should fail");
        assert!(err.to_string().contains("failed to decrypt"), "got: {err}");
    }

    #[test]
    fn missing_store_loads_empty() {
        let tmp = TestTempDir::new("auth-missing");
        let file = CredentialFile::at(tmp.child("credentials.json"), BACKEND);
        assert_eq!(file.load().expect("load"), None);
        assert!(!file.remove().expect("remove"));
        let health = file.health().expect("health");
        assert!(!health.has_token);
        assert_eq!(health.expires_at_unix, None);
    }

    #[test]
    fn records_are_scoped_per_backend() {
        let tmp = TestTempDir::new("auth-scoped");
        let path = tmp.child("credentials.json");
        let first = CredentialFile::at(&path, BACKEND);
        let second = CredentialFile::at(&path, "10.0.0.5:9000");
        first.save(StoredCredential::new("first")).expect("save first");
        second
            .save(
                StoredCredential::new("second")
                    .with_refresh_token("r")
                    .expiring_in(30),
            )
            .expect("save second");

        assert_eq!(first.load().expect("load").map(|c| c.access_token), Some("first".into()));
        let health = second.health().expect("health");
        assert!(health.has_token && health.refreshable && health.expiring_soon);
        assert!(health.expires_at_unix.is_some_and(|at| at > unix_now_secs()));

        assert!(first.remove().expect("remove"));
        assert_eq!(first.load().expect("load"), None);
        assert!(second.load().expect("load").is_some());
    }

    #[test]
    fn layered_tokens_take_the_first_non_blank_answer() {
        let layered = LayeredTokens::new()
            .with(StaticToken::empty())
            .with(StaticToken::new("  "))
            .with(StaticToken::new("from-flag"))
            .with(StaticToken::new("ignored"));
        assert_eq!(layered.access_token().as_deref(), Some("from-flag"));
        assert_eq!(LayeredTokens::new().access_token(), None);
    }

    #[test]
    fn env_token_reads_on_every_call() {
        let var = "TASKWATCH_TEST_TOKEN_ENV_READS";
        let provider = EnvToken::new(var);
        std::env::remove_var(var);
        assert_eq!(provider.access_token(), None);
        std::env::set_var(var, " rotated ");
        assert_eq!(provider.access_token().as_deref(), Some("rotated"));
        std::env::remove_var(var);
    }

    #[test]
    fn shared_token_clones_share_one_slot() {
        let shared = SharedToken::new(None);
        let reader = shared.clone();
        assert_eq!(reader.access_token(), None);
        shared.set(Some("t".into()));
        assert_eq!(reader.access_token().as_deref(), Some("t"));
    }
}
