use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{self, KeyValueStore};

const MARKER_KEY: &str = "banking.callback_marker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    BankingCallback,
}

/// Left behind while an external bank-linking redirect is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingCallbackMarker {
    pub kind: MarkerKind,
    pub created_at: DateTime<Utc>,
}

impl BankingCallbackMarker {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            kind: MarkerKind::BankingCallback,
            created_at,
        }
    }

    pub fn is_recent(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age = now - self.created_at;
        // A marker from the future (clock skew) still counts as in progress
        age <= window
    }
}

#[derive(Clone)]
pub struct BankingCallbackStore {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
}

impl BankingCallbackStore {
    pub fn new(store: Arc<dyn KeyValueStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn mark_started(&self) -> Result<()> {
        debug!("Banking callback started");
        storage::set_json(self.store.as_ref(), MARKER_KEY, &BankingCallbackMarker::new(Utc::now()))
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(MARKER_KEY)
    }

    pub fn marker(&self) -> Result<Option<BankingCallbackMarker>> {
        storage::get_json(self.store.as_ref(), MARKER_KEY)
    }

    pub fn is_recent(&self) -> Result<bool> {
        Ok(self
            .marker()?
            .map(|m| m.is_recent(Utc::now(), self.window))
            .unwrap_or(false))
    }
}
