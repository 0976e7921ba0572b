//! Encryption at rest for the credential store.
//!
//! Every backend record is sealed with one random data key. The data key is
//! sealed in turn with a key stretched (scrypt) from this machine's identity,
//! so a copied store file does not open for another host or account.

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Key, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use scrypt::{scrypt, Params as ScryptParams};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::error::AuthError;
use super::store::CredentialStore;
use super::types::StoredCredential;

pub(crate) const STORE_VERSION_ENCRYPTED: u32 = 2;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const MACHINE_KEY_CONTEXT: &str = "taskwatch-credential-kek-v1";

/// On-disk form of an encrypted store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EncryptedCredentialStore {
    #[serde(default)]
    pub(crate) version: u32,
    pub(crate) encryption: KeyEnvelope,
    #[serde(default)]
    pub(crate) backends: BTreeMap<String, Sealed>,
}

/// Salt for the machine key plus the data key sealed under it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct KeyEnvelope {
    pub(crate) salt: String,
    pub(crate) wrapped_key: Sealed,
}

/// Base64 nonce and ciphertext of one AES-GCM-SIV message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Sealed {
    pub(crate) nonce: String,
    pub(crate) ciphertext: String,
}

struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Key bound to this host and user; the same salt yields the same key.
    fn for_machine(salt: &[u8; SALT_LEN]) -> Result<Self, AuthError> {
        let mut seed = Sha256::new();
        seed.update(MACHINE_KEY_CONTEXT.as_bytes());
        seed.update(machine_fingerprint().as_bytes());
        seed.update(salt);
        let seed = seed.finalize();

        let mut bytes = [0u8; KEY_LEN];
        scrypt(&seed, salt, &ScryptParams::recommended(), &mut bytes)
            .map_err(|err| AuthError::Crypto(format!("failed to derive machine key: {err}")))?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256GcmSiv {
        Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(&self.0))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Sealed, AuthError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| AuthError::Crypto("failed to encrypt credentials".to_string()))?;
        Ok(Sealed {
            nonce: B64.encode(nonce),
            ciphertext: B64.encode(ciphertext),
        })
    }

    /// `None` when the ciphertext does not authenticate under this key.
    fn open(&self, sealed: &Sealed) -> Result<Option<Vec<u8>>, AuthError> {
        let nonce = decode_fixed::<NONCE_LEN>(&sealed.nonce, "nonce")?;
        let ciphertext = decode_field(&sealed.ciphertext, "ciphertext")?;
        Ok(self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .ok())
    }
}

pub(crate) fn looks_encrypted_store(value: &serde_json::Value) -> bool {
    value.get("encryption").is_some_and(serde_json::Value::is_object)
}

pub(crate) fn encrypt_store(store: &CredentialStore) -> Result<EncryptedCredentialStore, AuthError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let machine = SymmetricKey::for_machine(&salt)?;
    let data = SymmetricKey::random();

    let backends = store
        .backends
        .iter()
        .map(|(backend, credential)| {
            let payload = serde_json::to_vec(credential).map_err(|err| {
                AuthError::Crypto(format!("failed to serialize credential: {err}"))
            })?;
            Ok((backend.clone(), data.seal(&payload)?))
        })
        .collect::<Result<BTreeMap<_, _>, AuthError>>()?;

    Ok(EncryptedCredentialStore {
        version: STORE_VERSION_ENCRYPTED,
        encryption: KeyEnvelope {
            salt: B64.encode(salt),
            wrapped_key: machine.seal(&data.0)?,
        },
        backends,
    })
}

pub(crate) fn decrypt_store(store: &EncryptedCredentialStore) -> Result<CredentialStore, AuthError> {
    let salt = decode_fixed::<SALT_LEN>(&store.encryption.salt, "salt")?;
    let machine = SymmetricKey::for_machine(&salt)?;
    let raw_key = machine.open(&store.encryption.wrapped_key)?.ok_or_else(|| {
        AuthError::Crypto(
            "failed to decrypt stored credentials (machine identity may have changed); run `taskwatch logout` and log in again"
                .to_string(),
        )
    })?;
    let data = <[u8; KEY_LEN]>::try_from(raw_key.as_slice())
        .map(SymmetricKey)
        .map_err(|_| AuthError::Crypto("invalid key material in credential store".to_string()))?;

    let mut backends = BTreeMap::new();
    for (backend, sealed) in &store.backends {
        let payload = data.open(sealed)?.ok_or_else(|| {
            AuthError::Crypto(format!(
                "failed to decrypt stored credentials for `{backend}`; run `taskwatch logout` and log in again"
            ))
        })?;
        let credential: StoredCredential = serde_json::from_slice(&payload).map_err(|err| {
            AuthError::Crypto(format!("failed to decode credential for `{backend}`: {err}"))
        })?;
        backends.insert(backend.clone(), credential);
    }

    Ok(CredentialStore {
        version: store.version.max(STORE_VERSION_ENCRYPTED),
        backends,
    })
}

fn machine_fingerprint() -> String {
    let host = hostname::get()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default();
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let home = dirs::home_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let machine_id = ["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostid"]
        .into_iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default();
    format!(
        "{}\0{host}\0{user}\0{home}\0{machine_id}",
        std::env::consts::OS
    )
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, AuthError> {
    B64.decode(value).map_err(|err| {
        AuthError::MalformedStore(format!("credential store field `{field}` is not base64: {err}"))
    })
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N], AuthError> {
    let bytes = decode_field(value, field)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        AuthError::MalformedStore(format!(
            "credential store field `{field}` has {} bytes, expected {N}",
            bytes.len()
        ))
    })
}
