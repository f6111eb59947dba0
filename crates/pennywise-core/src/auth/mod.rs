//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: hands out valid access tokens, refreshing as needed
//! - `TokenStore`: token pair persistence with expiry read from the JWT
//! - `DeviceTrustStore`: "remember me" flag and persistent session
//! - `BankingCallbackStore`: marker for in-progress bank-linking redirects
//!
//! Tokens refresh 5 minutes before expiry and stay recoverable for 2 hours
//! after it, unless configured otherwise.

pub mod banking;
pub mod manager;
pub mod session;
pub mod tokens;
pub mod trust;

pub use banking::{BankingCallbackMarker, BankingCallbackStore};
pub use manager::SessionManager;
pub use session::{SessionInfo, SessionPolicy, SessionState};
pub use tokens::{decode_expiry, TokenPair, TokenStore};
pub use trust::{DeviceTrustStore, PersistentSession};
