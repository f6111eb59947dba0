//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, the last used email and the session
//! timing settings.
//!
//! Configuration is stored at `~/.config/pennywise/config.json`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::SessionPolicy;

/// Application name used for config/data directory paths
const APP_NAME: &str = "pennywise";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url` when set
pub const API_URL_ENV: &str = "PENNYWISE_API_URL";

const DEFAULT_API_BASE_URL: &str = "https://api.pennywise.app/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub last_email: Option<String>,
    #[serde(default)]
    pub session: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            last_email: None,
            session: SessionSettings::default(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the key-value stores and logs live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

/// Session timing knobs as they appear in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub refresh_window_secs: u64,
    pub grace_period_secs: u64,
    pub operation_timeout_secs: u64,
    pub max_refresh_attempts: u32,
    pub attempt_window_secs: u64,
    pub transient_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub banking_callback_window_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_window_secs: 300,
            grace_period_secs: 7200,
            operation_timeout_secs: 30,
            max_refresh_attempts: 3,
            attempt_window_secs: 60,
            transient_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4000,
            banking_callback_window_secs: 300,
        }
    }
}

/// Out-of-range values saturate instead of overflowing.
fn secs(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl SessionSettings {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            refresh_window: secs(self.refresh_window_secs),
            grace_period: secs(self.grace_period_secs),
            operation_timeout: std::time::Duration::from_secs(self.operation_timeout_secs),
            max_refresh_attempts: self.max_refresh_attempts.max(1),
            attempt_window: secs(self.attempt_window_secs),
            transient_retries: self.transient_retries,
            initial_backoff: std::time::Duration::from_millis(self.initial_backoff_ms),
            max_backoff: std::time::Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            banking_callback_window: secs(self.banking_callback_window_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_policy_default() {
        let from_settings = SessionSettings::default().policy();
        let default = SessionPolicy::default();
        assert_eq!(from_settings.refresh_window, default.refresh_window);
        assert_eq!(from_settings.grace_period, default.grace_period);
        assert_eq!(from_settings.operation_timeout, default.operation_timeout);
        assert_eq!(from_settings.max_refresh_attempts, default.max_refresh_attempts);
        assert_eq!(from_settings.attempt_window, default.attempt_window);
        assert_eq!(from_settings.max_backoff, default.max_backoff);
        assert_eq!(from_settings.banking_callback_window, default.banking_callback_window);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.last_email = Some("sam@example.com".to_string());
        config.session.grace_period_secs = 600;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_email.as_deref(), Some("sam@example.com"));
        assert_eq!(loaded.session.grace_period_secs, 600);
        assert_eq!(loaded.policy_grace_minutes(), 10);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    fn test_partial_session_section_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"session":{"max_refresh_attempts":5}}"#).unwrap();
        assert_eq!(config.session.max_refresh_attempts, 5);
        assert_eq!(config.session.refresh_window_secs, 300);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_backoff_cap_never_below_initial() {
        let settings = SessionSettings {
            initial_backoff_ms: 2000,
            max_backoff_ms: 100,
            ..SessionSettings::default()
        };
        let policy = settings.policy();
        assert_eq!(policy.max_backoff, std::time::Duration::from_millis(2000));
    }

    #[test]
    fn test_huge_values_saturate() {
        let settings = SessionSettings {
            grace_period_secs: 10_000_000_000_000_000,
            attempt_window_secs: u64::MAX,
            ..SessionSettings::default()
        };
        let policy = settings.policy();
        assert_eq!(policy.grace_period, chrono::Duration::MAX);
        assert_eq!(policy.attempt_window, chrono::Duration::MAX);
        assert_eq!(policy.refresh_window, chrono::Duration::seconds(300));
    }

    impl Config {
        fn policy_grace_minutes(&self) -> i64 {
            self.session.policy().grace_period.num_minutes()
        }
    }
}
