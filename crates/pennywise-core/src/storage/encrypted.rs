use std::sync::Arc;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use tracing::warn;

use super::{KeyValueStore, StorageKey};

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

/// Store wrapper that encrypts every value before handing it to `inner`.
///
/// Values are stored as base64(nonce || ciphertext). Keys are left in the
/// clear so the inner store can still list and remove them.
pub struct EncryptedStore {
    inner: Arc<dyn KeyValueStore>,
    cipher: ChaCha20Poly1305,
}

impl EncryptedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, key: &StorageKey) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| anyhow!("Encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let raw = STANDARD.decode(sealed)?;
        if raw.len() < NONCE_LEN {
            return Err(anyhow!("Sealed value too short"));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Decryption failed"))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

impl KeyValueStore for EncryptedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(sealed) = self.inner.get(key)? else {
            return Ok(None);
        };
        match self.open(&sealed) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // Wrong key or tampered data: unreadable counts as absent
                warn!(key = key, error = %e, "Failed to decrypt stored value");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let sealed = self.seal(value)?;
        self.inner.set(key, &sealed)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}
