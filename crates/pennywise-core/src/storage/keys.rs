//! Encryption key sources for [`EncryptedStore`](super::EncryptedStore).
//!
//! The default source is a random key held in the OS keychain. Hosts without
//! a usable keychain can derive the key from a passphrase with Argon2id.

use anyhow::{anyhow, Context, Result};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use super::KeyValueStore;

const SERVICE_NAME: &str = "pennywise";

/// Keychain account under which the storage key lives
const KEY_ACCOUNT: &str = "secure-storage-key";

/// Plaintext store key for the passphrase salt
pub const SALT_KEY: &str = "storage.salt";

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// 256-bit symmetric key for the encrypted store.
#[derive(Clone)]
pub struct StorageKey([u8; KEY_LEN]);

impl StorageKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .context("Stored key is not valid base64")?;
        let bytes: [u8; KEY_LEN] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| anyhow!("Stored key has length {}, expected {}", v.len(), KEY_LEN))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageKey(..)")
    }
}

/// Storage key kept in the OS keychain.
pub struct KeyringKey;

impl KeyringKey {
    /// Load the storage key, generating and storing a new one on first use.
    pub fn load_or_create() -> Result<StorageKey> {
        let entry = Entry::new(SERVICE_NAME, KEY_ACCOUNT)
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(encoded) => StorageKey::from_base64(&encoded),
            Err(keyring::Error::NoEntry) => {
                let key = StorageKey::generate();
                entry
                    .set_password(&STANDARD.encode(key.as_bytes()))
                    .context("Failed to store storage key in keychain")?;
                info!("Generated new secure storage key");
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to retrieve storage key from keychain"),
        }
    }
}

/// Load the passphrase salt from `store`, creating one if missing.
pub fn load_or_create_salt(store: &dyn KeyValueStore) -> Result<Vec<u8>> {
    if let Some(encoded) = store.get(SALT_KEY)? {
        if let Ok(salt) = STANDARD.decode(encoded.trim()) {
            if salt.len() >= SALT_LEN {
                return Ok(salt);
            }
        }
        tracing::warn!("Stored salt is unusable, generating a new one");
    }

    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    store.set(SALT_KEY, &STANDARD.encode(&salt))?;
    Ok(salt)
}

/// Derive a storage key from a passphrase with Argon2id.
pub fn derive_key_from_passphrase(passphrase: &str, salt: &[u8]) -> Result<StorageKey> {
    let mut bytes = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut bytes)
        .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
    Ok(StorageKey(bytes))
}
