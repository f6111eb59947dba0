//! Auth endpoints of the Pennywise backend.
//!
//! The session manager talks to these through the [`AuthApi`] trait so tests
//! and alternative transports can stand in for the HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::ApiError;

/// HTTP request timeout in seconds.
/// Kept below the session manager's operation timeout so a hung request
/// still leaves room for a retry.
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    remember_me: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    pub refresh_token: String,
    /// Longer-lived credential issued when "remember me" was requested
    #[serde(default)]
    pub persistent_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Present only when the backend rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginResponse, ApiError>;

    /// `POST /auth/refresh`. 401/403 means the refresh token is no longer valid.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;
}

/// Map a transport error, separating timeouts from other network failures.
pub(crate) fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::NetworkError(e)
    }
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

pub(crate) async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// `reqwest` implementation of [`AuthApi`].
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_response(response).await?;
        parse_json(response).await
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            email,
            password,
            remember_me,
        };
        self.post("/auth/login", &body).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.post("/auth/refresh", &RefreshRequest { refresh_token }).await
    }
}
