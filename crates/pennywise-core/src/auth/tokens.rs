use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStore};

/// Secure-store key holding the token record
const TOKENS_KEY: &str = "auth.tokens";

/// Access/refresh token pair. `expires_at` comes from the access token's
/// `exp` claim rather than being issued separately.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn new(access_token: String, id_token: Option<String>, refresh_token: String) -> Self {
        let expires_at = decode_expiry(&access_token);
        Self {
            access_token,
            id_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(true)
    }
}

/// On-disk form; both tokens are always written in one record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    refresh_token: String,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Read the `exp` claim from a JWT without verifying it.
///
/// Returns `None` for anything that does not decode; callers treat that as
/// already expired.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp?, 0)
}

/// Reads and writes the token pair in the secure store.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<TokenPair>> {
        let stored: Option<StoredTokens> = storage::get_json(self.store.as_ref(), TOKENS_KEY)?;
        Ok(stored.map(|s| TokenPair::new(s.access_token, s.id_token, s.refresh_token)))
    }

    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        let stored = StoredTokens {
            access_token: pair.access_token.clone(),
            id_token: pair.id_token.clone(),
            refresh_token: pair.refresh_token.clone(),
        };
        storage::set_json(self.store.as_ref(), TOKENS_KEY, &stored)
    }

    /// Remove all token material. Safe to call repeatedly.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(TOKENS_KEY)
    }
}
