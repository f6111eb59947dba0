use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStore};

const TRUSTED_KEY: &str = "device.trusted";
const PERSISTENT_SESSION_KEY: &str = "device.persistent_session";

/// Longer-lived refresh credential held for a "remember me" device.
/// Only a fallback; never used as the primary credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentSession {
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
}

/// Tracks whether this device is trusted and holds its persistent session.
#[derive(Clone)]
pub struct DeviceTrustStore {
    store: Arc<dyn KeyValueStore>,
}

impl DeviceTrustStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn is_trusted(&self) -> Result<bool> {
        Ok(storage::get_json::<bool>(self.store.as_ref(), TRUSTED_KEY)?.unwrap_or(false))
    }

    /// Mark the device trusted and store a fresh persistent session.
    pub fn remember(&self, refresh_token: &str) -> Result<()> {
        let session = PersistentSession {
            refresh_token: refresh_token.to_string(),
            created_at: Utc::now(),
        };
        storage::set_json(self.store.as_ref(), PERSISTENT_SESSION_KEY, &session)?;
        storage::set_json(self.store.as_ref(), TRUSTED_KEY, &true)
    }

    pub fn persistent_session(&self) -> Result<Option<PersistentSession>> {
        storage::get_json(self.store.as_ref(), PERSISTENT_SESSION_KEY)
    }

    /// The persistent session for a trusted device, if both exist.
    pub fn usable_session(&self) -> Result<Option<PersistentSession>> {
        if !self.is_trusted()? {
            return Ok(None);
        }
        self.persistent_session()
    }

    /// Drop the persistent session after the backend rejected it.
    /// The device stays trusted so the next "remember me" login replaces it.
    pub fn invalidate_persistent_session(&self) -> Result<()> {
        self.store.remove(PERSISTENT_SESSION_KEY)
    }

    /// Forget the device entirely.
    pub fn forget(&self) -> Result<()> {
        self.store.remove(PERSISTENT_SESSION_KEY)?;
        self.store.remove(TRUSTED_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_remember_and_forget() {
        let trust = DeviceTrustStore::new(Arc::new(MemoryStore::new()));
        assert!(!trust.is_trusted().unwrap());
        assert_eq!(trust.usable_session().unwrap(), None);

        trust.remember("persist-1").unwrap();
        assert!(trust.is_trusted().unwrap());
        assert_eq!(
            trust.usable_session().unwrap().map(|s| s.refresh_token),
            Some("persist-1".to_string())
        );

        trust.forget().unwrap();
        assert!(!trust.is_trusted().unwrap());
        assert_eq!(trust.persistent_session().unwrap(), None);
    }

    #[test]
    fn test_invalidate_keeps_trust_flag() {
        let trust = DeviceTrustStore::new(Arc::new(MemoryStore::new()));
        trust.remember("persist-1").unwrap();
        trust.invalidate_persistent_session().unwrap();

        assert!(trust.is_trusted().unwrap());
        assert_eq!(trust.usable_session().unwrap(), None);
    }

    #[test]
    fn test_session_without_trust_is_not_usable() {
        let store = Arc::new(MemoryStore::new());
        let trust = DeviceTrustStore::new(store.clone());
        trust.remember("persist-1").unwrap();
        store.remove(TRUSTED_KEY).unwrap();

        assert!(trust.persistent_session().unwrap().is_some());
        assert_eq!(trust.usable_session().unwrap(), None);
    }
}
