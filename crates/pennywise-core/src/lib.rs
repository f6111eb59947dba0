//! Pennywise Core - shared library for the Pennywise finance client.
//!
//! Contains everything below the UI: the session lifecycle manager, secure
//! key-value storage, the transaction categorizer, storage migrations and
//! the REST client. Frontends only wire these together.

pub mod api;
pub mod auth;
pub mod categorize;
pub mod config;
pub mod migration;
pub mod models;
pub mod storage;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, AuthApi, HttpAuthApi};
pub use auth::{SessionInfo, SessionManager, SessionPolicy, SessionState};
pub use categorize::{categorize, Category};
pub use config::{Config, SessionSettings};
pub use migration::{MigrationReport, MigrationRunner};
pub use storage::{EncryptedStore, FileStore, KeyValueStore, MemoryStore};
