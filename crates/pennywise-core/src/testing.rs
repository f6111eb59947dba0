//! Shared test doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use crate::api::{ApiError, AuthApi, LoginResponse, RefreshResponse};

static TOKEN_SERIAL: AtomicUsize = AtomicUsize::new(0);

/// Unsigned JWT with the given expiry. Every call yields a distinct token.
pub(crate) fn jwt_expiring_at(exp: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": "user-1",
        "exp": exp.timestamp(),
        "jti": TOKEN_SERIAL.fetch_add(1, Ordering::Relaxed),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// Scripted backend behavior for one refresh token.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Issue an access token valid for the given duration
    Issue(Duration),
    /// Issue an access token and rotate the refresh token
    IssueRotated(Duration, &'static str),
    /// 403
    Reject,
    /// 503
    Unavailable,
    /// Never answer within any reasonable timeout
    Hang,
}

/// In-memory [`AuthApi`] that plays back scripted replies and counts calls.
///
/// Each refresh token has a queue of replies; the last reply repeats.
/// Unknown refresh tokens are rejected.
pub(crate) struct MockAuthApi {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    login: Mutex<Option<LoginResponse>>,
    delay: StdDuration,
    calls: Mutex<Vec<String>>,
}

impl MockAuthApi {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            login: Mutex::new(None),
            delay: StdDuration::from_millis(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn on_refresh(self, refresh_token: &str, replies: Vec<Reply>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(refresh_token.to_string(), replies.into());
        self
    }

    pub(crate) fn on_login(self, response: LoginResponse) -> Self {
        *self.login.lock().unwrap() = Some(response);
        self
    }

    pub(crate) fn refresh_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, refresh_token: &str) -> Reply {
        let mut script = self.script.lock().unwrap();
        match script.get_mut(refresh_token) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Reject),
            None => Reply::Reject,
        }
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(
        &self,
        _email: &str,
        _password: &str,
        _remember_me: bool,
    ) -> Result<LoginResponse, ApiError> {
        self.login.lock().unwrap().clone().ok_or(ApiError::Unauthorized)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.calls.lock().unwrap().push(refresh_token.to_string());
        let reply = self.next_reply(refresh_token);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            Reply::Issue(ttl) => Ok(RefreshResponse {
                access_token: jwt_expiring_at(Utc::now() + ttl),
                id_token: None,
                refresh_token: None,
            }),
            Reply::IssueRotated(ttl, rotated) => Ok(RefreshResponse {
                access_token: jwt_expiring_at(Utc::now() + ttl),
                id_token: Some("id-rotated".to_string()),
                refresh_token: Some(rotated.to_string()),
            }),
            Reply::Reject => Err(ApiError::AccessDenied("refresh token revoked".to_string())),
            Reply::Unavailable => Err(ApiError::ServerError("maintenance".to_string())),
            Reply::Hang => {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                Err(ApiError::Timeout)
            }
        }
    }
}
