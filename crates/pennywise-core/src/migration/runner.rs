use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::KeyValueStore;

/// Plaintext store key holding the last completed migration version
pub const VERSION_KEY: &str = "storage.migration_version";

/// How a legacy value is validated before it is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Text,
    /// Must parse as JSON; unparseable values count as absent
    Json,
}

/// Move one plaintext key into the secure store.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub version: u32,
    pub key: &'static str,
    pub payload: Payload,
}

pub const DEFAULT_STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        key: "user_pin",
        payload: Payload::Text,
    },
    MigrationStep {
        version: 2,
        key: "user_profile",
        payload: Payload::Json,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    /// Versions whose step completed in this run
    pub migrations_run: Vec<u32>,
    /// Failure message per key
    pub errors: BTreeMap<String, String>,
    pub cleaned_keys: Vec<String>,
}

enum StepOutcome {
    Migrated,
    NothingToMigrate,
}

pub struct MigrationRunner {
    plain: Arc<dyn KeyValueStore>,
    secure: Arc<dyn KeyValueStore>,
    steps: Vec<MigrationStep>,
    run_lock: Mutex<()>,
}

impl MigrationRunner {
    pub fn new(plain: Arc<dyn KeyValueStore>, secure: Arc<dyn KeyValueStore>) -> Self {
        Self::with_steps(plain, secure, DEFAULT_STEPS.to_vec())
    }

    pub fn with_steps(
        plain: Arc<dyn KeyValueStore>,
        secure: Arc<dyn KeyValueStore>,
        mut steps: Vec<MigrationStep>,
    ) -> Self {
        steps.sort_by_key(|s| s.version);
        Self {
            plain,
            secure,
            steps,
            run_lock: Mutex::new(()),
        }
    }

    /// Last completed version. Missing or unparseable counts as 0.
    pub fn current_version(&self) -> Result<u32> {
        let raw = self.plain.get(VERSION_KEY)?;
        Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
    }

    pub fn latest_version(&self) -> u32 {
        self.steps.last().map(|s| s.version).unwrap_or(0)
    }

    /// Run every step newer than the stored version.
    pub fn run_migrations(&self) -> MigrationReport {
        let _guard = self
            .run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut report = MigrationReport::default();

        let current = match self.current_version() {
            Ok(version) => version,
            Err(e) => {
                report.errors.insert(VERSION_KEY.to_string(), format!("{:#}", e));
                return report;
            }
        };

        let pending: Vec<&MigrationStep> = self.steps.iter().filter(|s| s.version > current).collect();
        let Some(target) = pending.last().map(|s| s.version) else {
            debug!(version = current, "Storage is up to date");
            report.success = true;
            return report;
        };

        info!(from = current, to = target, steps = pending.len(), "Running storage migrations");

        let mut to_clean = Vec::new();
        for step in &pending {
            match self.run_step(step) {
                Ok(StepOutcome::Migrated) => {
                    report.migrations_run.push(step.version);
                    to_clean.push(step.key);
                }
                Ok(StepOutcome::NothingToMigrate) => report.migrations_run.push(step.version),
                Err(e) => {
                    warn!(version = step.version, key = step.key, error = %e, "Migration step failed");
                    report.errors.insert(step.key.to_string(), format!("{:#}", e));
                }
            }
        }

        if !report.errors.is_empty() {
            return report;
        }

        for key in to_clean {
            match self.plain.remove(key) {
                Ok(()) => report.cleaned_keys.push(key.to_string()),
                Err(e) => {
                    report.errors.insert(key.to_string(), format!("cleanup failed: {:#}", e));
                }
            }
        }
        if !report.errors.is_empty() {
            return report;
        }

        if let Err(e) = self.plain.set(VERSION_KEY, &target.to_string()) {
            report.errors.insert(VERSION_KEY.to_string(), format!("{:#}", e));
            return report;
        }

        info!(version = target, cleaned = report.cleaned_keys.len(), "Storage migrations complete");
        report.success = true;
        report
    }

    fn run_step(&self, step: &MigrationStep) -> Result<StepOutcome> {
        let Some(legacy) = self
            .plain
            .get(step.key)
            .with_context(|| format!("Failed to read legacy key {}", step.key))?
        else {
            return Ok(StepOutcome::NothingToMigrate);
        };

        if step.payload == Payload::Json && serde_json::from_str::<serde_json::Value>(&legacy).is_err() {
            warn!(key = step.key, "Legacy value is not valid JSON, skipping");
            return Ok(StepOutcome::NothingToMigrate);
        }

        self.secure
            .set(step.key, &legacy)
            .with_context(|| format!("Failed to write secure key {}", step.key))?;

        // Read back before the legacy copy becomes eligible for deletion
        match self.secure.get(step.key)? {
            Some(stored) if stored == legacy => Ok(StepOutcome::Migrated),
            _ => Err(anyhow!("Secure copy of {} did not verify", step.key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EncryptedStore, MemoryStore, StorageKey};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Secure store whose writes fail while `failing` is set.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) && key == "user_profile" {
                return Err(anyhow!("secure storage unavailable"));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    fn legacy_store() -> Arc<MemoryStore> {
        let plain = Arc::new(MemoryStore::new());
        plain.set("user_pin", "2468").unwrap();
        plain.set("user_profile", r#"{"name":"Sam"}"#).unwrap();
        plain
    }

    #[test]
    fn test_runs_once() {
        let plain = legacy_store();
        let secure = Arc::new(EncryptedStore::new(Arc::new(MemoryStore::new()), &StorageKey::generate()));
        let runner = MigrationRunner::new(plain.clone(), secure.clone());

        let first = runner.run_migrations();
        assert!(first.success);
        assert_eq!(first.migrations_run, vec![1, 2]);
        assert_eq!(first.cleaned_keys, vec!["user_pin", "user_profile"]);
        assert!(first.errors.is_empty());

        assert_eq!(secure.get("user_pin").unwrap().as_deref(), Some("2468"));
        assert_eq!(plain.get("user_pin").unwrap(), None);
        assert_eq!(plain.get(VERSION_KEY).unwrap().as_deref(), Some("2"));

        let second = runner.run_migrations();
        assert!(second.success);
        assert!(second.migrations_run.is_empty());
        assert!(second.cleaned_keys.is_empty());
    }

    #[test]
    fn test_failed_step_keeps_version_and_retries() {
        let plain = legacy_store();
        let secure = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(true),
        });
        let runner = MigrationRunner::new(plain.clone(), secure.clone());

        let failed = runner.run_migrations();
        assert!(!failed.success);
        assert_eq!(failed.migrations_run, vec![1]);
        assert!(failed.errors.contains_key("user_profile"));
        assert!(failed.cleaned_keys.is_empty());
        assert_eq!(runner.current_version().unwrap(), 0);
        // nothing deleted while the run is incomplete
        assert!(plain.get("user_pin").unwrap().is_some());

        secure.failing.store(false, Ordering::SeqCst);
        let retried = runner.run_migrations();
        assert!(retried.success);
        assert_eq!(retried.migrations_run, vec![1, 2]);
        assert_eq!(secure.get("user_profile").unwrap().as_deref(), Some(r#"{"name":"Sam"}"#));
        assert_eq!(runner.current_version().unwrap(), 2);
    }

    #[test]
    fn test_missing_legacy_data_is_noop() {
        let plain = Arc::new(MemoryStore::new());
        let secure = Arc::new(MemoryStore::new());
        let runner = MigrationRunner::new(plain.clone(), secure.clone());

        let report = runner.run_migrations();
        assert!(report.success);
        assert_eq!(report.migrations_run, vec![1, 2]);
        assert!(report.cleaned_keys.is_empty());
        assert!(secure.keys().unwrap().is_empty());
        assert_eq!(runner.current_version().unwrap(), 2);
    }

    #[test]
    fn test_malformed_profile_is_skipped() {
        let plain = Arc::new(MemoryStore::new());
        plain.set("user_profile", "{broken").unwrap();
        let secure = Arc::new(MemoryStore::new());
        let runner = MigrationRunner::new(plain.clone(), secure.clone());

        let report = runner.run_migrations();
        assert!(report.success);
        assert!(report.errors.is_empty());
        assert_eq!(secure.get("user_profile").unwrap(), None);
        assert_eq!(plain.get("user_profile").unwrap().as_deref(), Some("{broken"));
    }

    #[test]
    fn test_only_newer_steps_run() {
        let plain = legacy_store();
        plain.set(VERSION_KEY, "1").unwrap();
        let secure = Arc::new(MemoryStore::new());
        let runner = MigrationRunner::new(plain.clone(), secure.clone());

        let report = runner.run_migrations();
        assert_eq!(report.migrations_run, vec![2]);
        assert_eq!(report.cleaned_keys, vec!["user_profile"]);
        assert_eq!(secure.get("user_pin").unwrap(), None);
        assert!(plain.get("user_pin").unwrap().is_some());
    }

    #[test]
    fn test_unparseable_version_counts_as_zero() {
        let plain = Arc::new(MemoryStore::new());
        plain.set(VERSION_KEY, "two").unwrap();
        let runner = MigrationRunner::new(plain, Arc::new(MemoryStore::new()));
        assert_eq!(runner.current_version().unwrap(), 0);
        assert_eq!(runner.latest_version(), 2);
    }
}
