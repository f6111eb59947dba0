//! Wiring of the core services for one CLI invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use pennywise_core::storage::{derive_key_from_passphrase, load_or_create_salt, KeyringKey, StorageKey};
use pennywise_core::{
    ApiClient, Config, EncryptedStore, FileStore, HttpAuthApi, KeyValueStore, MigrationRunner, SessionManager,
};

/// Selects passphrase-derived encryption instead of the OS keychain
pub const PASSPHRASE_ENV: &str = "PENNYWISE_PASSPHRASE";

/// Plaintext store file (markers, salt, migration version, legacy keys)
const PLAIN_STORE_FILE: &str = "store.json";

/// Encrypted store file (tokens, persistent session, migrated secrets)
const SECURE_STORE_FILE: &str = "secure.json";

pub struct App {
    pub config: Config,
    pub plain: Arc<dyn KeyValueStore>,
    pub secure: Arc<dyn KeyValueStore>,
    pub session: SessionManager,
    pub api: ApiClient,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load().context("Failed to load config")?;
        let data_dir = config
            .data_dir()
            .unwrap_or_else(|_| PathBuf::from("./pennywise-data"));
        debug!(data_dir = %data_dir.display(), "Opening stores");

        let plain: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir.join(PLAIN_STORE_FILE))?);
        let key = storage_key(plain.as_ref())?;
        let secure: Arc<dyn KeyValueStore> = Arc::new(EncryptedStore::new(
            Arc::new(FileStore::new(data_dir.join(SECURE_STORE_FILE))?),
            &key,
        ));

        let auth_api = HttpAuthApi::new(config.api_base_url.clone())?;
        let session = SessionManager::new(
            Arc::new(auth_api),
            secure.clone(),
            plain.clone(),
            config.session.policy(),
        );
        let api = ApiClient::new(config.api_base_url.clone(), session.clone())?;

        Ok(Self {
            config,
            plain,
            secure,
            session,
            api,
        })
    }

    pub fn migration_runner(&self) -> MigrationRunner {
        MigrationRunner::new(self.plain.clone(), self.secure.clone())
    }

    /// Run pending storage migrations, logging failures without aborting.
    pub fn migrate_quietly(&self) {
        let report = self.migration_runner().run_migrations();
        if !report.success {
            tracing::warn!(errors = ?report.errors, "Storage migration incomplete, will retry next start");
        } else if !report.migrations_run.is_empty() {
            info!(versions = ?report.migrations_run, "Storage migrated");
        }
    }

    pub fn remember_email(&mut self, email: &str) -> Result<()> {
        if self.config.last_email.as_deref() != Some(email) {
            self.config.last_email = Some(email.to_string());
            self.config.save()?;
        }
        Ok(())
    }
}

fn storage_key(plain: &dyn KeyValueStore) -> Result<StorageKey> {
    match std::env::var(PASSPHRASE_ENV) {
        Ok(passphrase) if !passphrase.is_empty() => {
            let salt = load_or_create_salt(plain)?;
            derive_key_from_passphrase(&passphrase, &salt)
        }
        _ => KeyringKey::load_or_create(),
    }
}
