//! REST API client module for the Pennywise backend.
//!
//! This module provides:
//! - `AuthApi` / `HttpAuthApi`: login and token refresh endpoints
//! - `ApiClient`: authenticated access to profile, bills, goals and
//!   transactions, with tokens supplied by the session manager
//!
//! The backend uses JWT bearer tokens issued by `/auth/login` and renewed
//! through `/auth/refresh`.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthApi, HttpAuthApi, LoginResponse, RefreshResponse};
pub use client::ApiClient;
pub use error::ApiError;
