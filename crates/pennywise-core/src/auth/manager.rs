//! Session lifecycle manager.
//!
//! Hands out access tokens that are valid for the next request, refreshing
//! them through the [`AuthApi`] when they are close to expiry. Concurrent
//! callers share a single in-flight refresh. When the primary refresh token
//! is rejected, a trusted device's persistent session is tried before the
//! session is cleared.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    BankingCallbackStore, DeviceTrustStore, SessionInfo, SessionPolicy, SessionState, TokenPair,
    TokenStore,
};
use crate::api::{ApiError, AuthApi, RefreshResponse};
use crate::storage::KeyValueStore;

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Throttle for refresh operations within a rolling window.
#[derive(Debug, Default)]
struct RetryState {
    /// Start times of the attempts still inside the window, oldest first
    attempts: VecDeque<DateTime<Utc>>,
}

impl RetryState {
    /// Record a new attempt, or refuse if the window already holds the maximum.
    fn try_acquire(&mut self, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
        while self
            .attempts
            .front()
            .is_some_and(|started| now - *started >= policy.attempt_window)
        {
            self.attempts.pop_front();
        }
        if self.attempts.len() >= policy.max_refresh_attempts as usize {
            return false;
        }
        self.attempts.push_back(now);
        true
    }

    fn reset(&mut self) {
        self.attempts.clear();
    }
}

/// Outcome of trying the persistent session.
enum Fallback {
    Restored(String),
    Rejected,
    Unavailable,
    Transient,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    tokens: TokenStore,
    trust: DeviceTrustStore,
    banking: BankingCallbackStore,
    policy: SessionPolicy,
    retry: Mutex<RetryState>,
    in_flight: Mutex<InFlight>,
}

/// The refresh currently running, if any. `generation` tells a finishing
/// task whether the slot still holds its own refresh.
#[derive(Default)]
struct InFlight {
    generation: u64,
    refresh: Option<SharedRefresh>,
}

/// Owns the token lifecycle. Construct once and clone freely; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionManager {
    /// `secure` holds token material; `plain` holds non-secret markers.
    pub fn new(
        api: Arc<dyn AuthApi>,
        secure: Arc<dyn KeyValueStore>,
        plain: Arc<dyn KeyValueStore>,
        policy: SessionPolicy,
    ) -> Self {
        let banking = BankingCallbackStore::new(plain, policy.banking_callback_window);
        Self {
            inner: Arc::new(Inner {
                api,
                tokens: TokenStore::new(secure.clone()),
                trust: DeviceTrustStore::new(secure),
                banking,
                policy,
                retry: Mutex::new(RetryState::default()),
                in_flight: Mutex::new(InFlight::default()),
            }),
        }
    }

    /// A token usable for the next API call, or `None` if there is none.
    ///
    /// Never blocks longer than the policy's operation timeout.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        match tokio::time::timeout(self.inner.policy.operation_timeout, self.refresh_token_if_needed()).await {
            Ok(token) => token,
            Err(_) => {
                warn!(
                    timeout_secs = self.inner.policy.operation_timeout.as_secs_f64(),
                    "Timed out waiting for a valid access token"
                );
                None
            }
        }
    }

    /// Return the current token if it is comfortably valid, otherwise refresh.
    ///
    /// At most one refresh runs at a time; concurrent callers await the same
    /// result.
    pub async fn refresh_token_if_needed(&self) -> Option<String> {
        let tokens = match self.inner.tokens.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                return None;
            }
        };

        match SessionState::evaluate(tokens.as_ref(), Utc::now(), &self.inner.policy) {
            SessionState::LoggedOut => None,
            SessionState::Active => tokens.map(|t| t.access_token),
            state => {
                debug!(state = ?state, "Access token needs refresh");
                let current = tokens.filter(|_| state.is_usable()).map(|t| t.access_token);
                self.join_or_start_refresh(current).await
            }
        }
    }

    /// `current` is the stored token while it is still usable; it is handed
    /// back when the attempt budget is spent.
    async fn join_or_start_refresh(&self, current: Option<String>) -> Option<String> {
        let refresh = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.refresh.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let allowed = lock(&self.inner.retry).try_acquire(Utc::now(), &self.inner.policy);
                    if !allowed {
                        warn!(
                            max_attempts = self.inner.policy.max_refresh_attempts,
                            "Refresh attempts exhausted for this window"
                        );
                        return current;
                    }
                    slot.generation += 1;
                    let refresh = Arc::clone(&self.inner).spawn_refresh(slot.generation);
                    slot.refresh = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Side-effect-free snapshot of the session.
    pub fn session_info(&self) -> SessionInfo {
        let tokens = self.inner.tokens.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read stored tokens");
            None
        });
        let device_trusted = self.inner.trust.is_trusted().unwrap_or(false);
        let has_persistent_session = self
            .inner
            .trust
            .persistent_session()
            .map(|s| s.is_some())
            .unwrap_or(false);

        SessionInfo::compute(
            tokens.as_ref(),
            device_trusted,
            has_persistent_session,
            Utc::now(),
            &self.inner.policy,
        )
    }

    /// Remove all token material. Idempotent.
    pub fn clear_all_tokens(&self) -> Result<()> {
        self.inner.tokens.clear().context("Failed to clear stored tokens")
    }

    /// Log in and store the new token pair.
    ///
    /// With `remember_me`, the device becomes trusted and keeps a persistent
    /// session: the backend's persistent token if it issued one, otherwise
    /// the login refresh token.
    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> Result<SessionInfo> {
        let response = self
            .inner
            .api
            .login(email, password, remember_me)
            .await
            .context("Login request failed")?;

        let pair = TokenPair::new(response.access_token, response.id_token, response.refresh_token);
        self.inner.tokens.save(&pair).context("Failed to store tokens")?;

        if remember_me {
            let persistent = response
                .persistent_token
                .as_deref()
                .unwrap_or(pair.refresh_token.as_str());
            self.inner.trust.remember(persistent)?;
        } else {
            self.inner.trust.forget()?;
        }
        lock(&self.inner.retry).reset();

        info!(remember_me = remember_me, "Logged in");
        Ok(self.session_info())
    }

    /// Clear tokens; with `forget_device` also drop trust and the persistent session.
    pub fn logout(&self, forget_device: bool) -> Result<()> {
        self.clear_all_tokens()?;
        if forget_device {
            self.inner.trust.forget()?;
        }
        lock(&self.inner.retry).reset();
        info!(forget_device = forget_device, "Logged out");
        Ok(())
    }

    /// Host resume trigger: opportunistically make sure a valid token is on hand.
    pub async fn on_resume(&self) -> SessionState {
        let before = self.session_info().state;
        if !matches!(before, SessionState::Active | SessionState::LoggedOut) {
            let refreshed = self.get_valid_access_token().await.is_some();
            debug!(state = ?before, refreshed = refreshed, "Resume check");
        }
        self.session_info().state
    }

    /// Fire [`on_resume`](Self::on_resume) every `interval` for hosts
    /// without app lifecycle events.
    pub fn spawn_resume_timer(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.on_resume().await;
            }
        })
    }

    pub fn mark_banking_callback_started(&self) -> Result<()> {
        self.inner.banking.mark_started()
    }

    pub fn clear_banking_callback(&self) -> Result<()> {
        self.inner.banking.clear()
    }

    pub fn is_banking_callback_recent(&self) -> bool {
        self.inner.banking.is_recent().unwrap_or(false)
    }
}

impl Inner {
    /// Run the refresh on its own task so it completes, and frees the slot,
    /// even when every waiting caller has given up.
    fn spawn_refresh(self: Arc<Self>, generation: u64) -> SharedRefresh {
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(self.policy.operation_timeout, self.clone().perform_refresh()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Token refresh timed out");
                    None
                }
            };
            let mut slot = lock(&self.in_flight);
            if slot.generation == generation {
                slot.refresh = None;
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Token refresh task failed");
                None
            })
        }
        .boxed()
        .shared()
    }

    async fn perform_refresh(self: Arc<Self>) -> Option<String> {
        let pair = match self.tokens.load() {
            Ok(Some(pair)) => pair,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                return None;
            }
        };
        let state = SessionState::evaluate(Some(&pair), Utc::now(), &self.policy);

        // Another refresh finished between the caller's check and this one
        if state == SessionState::Active {
            return Some(pair.access_token);
        }

        if !pair.has_refresh_token() {
            debug!("No refresh token stored, trying persistent session");
            return self.restore_without_refresh_token(&pair).await;
        }

        match self.call_refresh(&pair.refresh_token).await {
            Ok(response) => Some(self.store_refreshed(&pair, response, None)),
            Err(e) if e.is_credential_rejection() => {
                info!("Refresh token rejected, trying persistent session");
                self.recover_after_rejection(&pair).await
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, state = ?state, "Token refresh failed after retries");
                if state == SessionState::Expired {
                    return self.restore_after_transient(&pair).await;
                }
                Self::still_usable(&pair)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Self::still_usable(&pair)
            }
        }
    }

    /// `POST /auth/refresh`, retrying transient failures with capped
    /// exponential backoff.
    async fn call_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let mut backoff = self.policy.initial_backoff;
        let mut retries = 0;

        loop {
            match self.api.refresh(refresh_token).await {
                Err(e) if e.is_transient() && retries < self.policy.transient_retries => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient refresh failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                }
                result => return result,
            }
        }
    }

    /// Persist a refreshed pair. Tokens the response omits are carried over;
    /// `promoted` replaces the previous refresh token when the persistent
    /// session did the refresh.
    fn store_refreshed(&self, previous: &TokenPair, response: RefreshResponse, promoted: Option<&str>) -> String {
        let refresh_token = response
            .refresh_token
            .or_else(|| promoted.map(str::to_string))
            .unwrap_or_else(|| previous.refresh_token.clone());
        let id_token = response.id_token.or_else(|| previous.id_token.clone());
        let pair = TokenPair::new(response.access_token, id_token, refresh_token);

        if let Err(e) = self.tokens.save(&pair) {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
        lock(&self.retry).reset();

        debug!(expires_at = ?pair.expires_at, "Access token refreshed");
        pair.access_token
    }

    /// The current token when it has not expired yet.
    fn still_usable(pair: &TokenPair) -> Option<String> {
        if pair.is_expired_at(Utc::now()) {
            None
        } else {
            Some(pair.access_token.clone())
        }
    }

    /// Destructive actions are suppressed while a bank-linking redirect is in progress.
    fn destructive_allowed(&self) -> bool {
        match self.banking.is_recent() {
            Ok(true) => {
                info!("Banking callback in progress, keeping session intact");
                false
            }
            Ok(false) => true,
            Err(e) => {
                warn!(error = %e, "Failed to read banking callback marker, keeping session intact");
                false
            }
        }
    }

    async fn try_persistent_session(&self, primary: &TokenPair, primary_rejected: bool) -> Fallback {
        let session = match self.trust.usable_session() {
            Ok(Some(session)) => session,
            Ok(None) => return Fallback::Unavailable,
            Err(e) => {
                warn!(error = %e, "Failed to read persistent session");
                return Fallback::Unavailable;
            }
        };

        if session.refresh_token == primary.refresh_token {
            // The same credential already failed as the primary token
            return if primary_rejected {
                Fallback::Rejected
            } else {
                Fallback::Unavailable
            };
        }

        match self.call_refresh(&session.refresh_token).await {
            Ok(response) => {
                info!("Session restored from persistent session");
                Fallback::Restored(self.store_refreshed(primary, response, Some(&session.refresh_token)))
            }
            Err(e) if e.is_credential_rejection() => Fallback::Rejected,
            Err(e) => {
                warn!(error = %e, "Persistent session refresh failed");
                Fallback::Transient
            }
        }
    }

    async fn recover_after_rejection(&self, pair: &TokenPair) -> Option<String> {
        match self.try_persistent_session(pair, true).await {
            Fallback::Restored(token) => Some(token),
            Fallback::Transient => None,
            Fallback::Rejected => {
                if self.destructive_allowed() {
                    warn!("Persistent session rejected, clearing session");
                    self.invalidate_persistent_session();
                    self.clear_tokens();
                }
                None
            }
            Fallback::Unavailable => {
                if self.destructive_allowed() {
                    warn!("No persistent session to fall back on, clearing session");
                    self.clear_tokens();
                }
                None
            }
        }
    }

    async fn restore_after_transient(&self, pair: &TokenPair) -> Option<String> {
        match self.try_persistent_session(pair, false).await {
            Fallback::Restored(token) => Some(token),
            Fallback::Rejected => {
                if self.destructive_allowed() {
                    self.invalidate_persistent_session();
                }
                None
            }
            Fallback::Unavailable | Fallback::Transient => None,
        }
    }

    /// Nothing was rejected, so the stored pair is kept whatever happens.
    async fn restore_without_refresh_token(&self, pair: &TokenPair) -> Option<String> {
        match self.try_persistent_session(pair, false).await {
            Fallback::Restored(token) => Some(token),
            Fallback::Rejected => {
                if self.destructive_allowed() {
                    self.invalidate_persistent_session();
                }
                Self::still_usable(pair)
            }
            Fallback::Unavailable | Fallback::Transient => Self::still_usable(pair),
        }
    }

    fn invalidate_persistent_session(&self) {
        if let Err(e) = self.trust.invalidate_persistent_session() {
            warn!(error = %e, "Failed to invalidate persistent session");
        }
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
    }
}
