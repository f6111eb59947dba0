//! Device key-value storage.
//!
//! This module provides:
//! - `KeyValueStore`: the storage seam everything else is written against
//! - `MemoryStore` and `FileStore`: plaintext backends
//! - `EncryptedStore`: a wrapper sealing every value with ChaCha20-Poly1305
//! - Key sources for the encrypted store (OS keychain or passphrase)

pub mod encrypted;
pub mod file;
pub mod keys;
pub mod memory;

use anyhow::Result;

pub use encrypted::EncryptedStore;
pub use file::FileStore;
pub use keys::{derive_key_from_passphrase, load_or_create_salt, KeyringKey, StorageKey};
pub use memory::MemoryStore;

/// String key-value storage.
///
/// Implementations must be safe to share across tasks; every method takes
/// `&self` and serializes its own writes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Load and deserialize a JSON value stored under `key`.
///
/// A value that fails to parse is logged and treated as absent.
pub fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key = key, error = %e, "Ignoring unparseable stored value");
            Ok(None)
        }
    }
}

/// Serialize a value as JSON and store it under `key`.
pub fn set_json<T: serde::Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
