//! API client for the Pennywise REST backend.
//!
//! Every request asks the [`SessionManager`] for a valid access token first,
//! so callers never deal with expiry or refresh themselves.

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::auth::{check_response, parse_json, transport_error};
use super::ApiError;
use crate::auth::SessionManager;
use crate::models::{BankTransaction, BillPreferences, Goal, Profile};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Authenticated client for the data endpoints.
/// Clone is cheap - reqwest::Client and SessionManager share their state.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionManager) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let token = self
                .session
                .get_valid_access_token()
                .await
                .ok_or(ApiError::Unauthorized)?;

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(header::ACCEPT, "application/json")
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(method = %method, url = %url, "Sending request");
            let response = request.send().await.map_err(transport_error)?;

            if response.status().as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let response = check_response(response).await?;
            return parse_json(response).await;
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, path, None).await
    }

    async fn put<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    // ===== Data Fetching Methods =====

    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        self.get("/profile").await
    }

    pub async fn update_profile(&self, profile: &Profile) -> Result<Profile, ApiError> {
        self.put("/profile", profile).await
    }

    pub async fn fetch_bill_preferences(&self) -> Result<BillPreferences, ApiError> {
        self.get("/bills/preferences").await
    }

    pub async fn update_bill_preferences(&self, prefs: &BillPreferences) -> Result<BillPreferences, ApiError> {
        self.put("/bills/preferences", prefs).await
    }

    pub async fn fetch_goals(&self) -> Result<Vec<Goal>, ApiError> {
        self.get("/goals").await
    }

    pub async fn fetch_transactions(&self) -> Result<Vec<BankTransaction>, ApiError> {
        self.get("/transactions").await
    }
}
