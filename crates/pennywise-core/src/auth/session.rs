use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::TokenPair;

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// How long after expiry a token is still recoverable through refresh
const TOKEN_GRACE_PERIOD_MINUTES: i64 = 120;

/// Timing policy for the session manager.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// A token closer than this to expiry is refreshed ahead of time
    pub refresh_window: Duration,
    /// How long an expired token is still treated as refreshable
    pub grace_period: Duration,
    /// Upper bound for `get_valid_access_token`
    pub operation_timeout: std::time::Duration,
    /// Refresh operations allowed within `attempt_window`
    pub max_refresh_attempts: u32,
    pub attempt_window: Duration,
    /// Extra attempts per refresh call after a transient failure
    pub transient_retries: u32,
    pub initial_backoff: std::time::Duration,
    pub max_backoff: std::time::Duration,
    /// How long a banking-callback marker counts as in progress
    pub banking_callback_window: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            refresh_window: Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES),
            grace_period: Duration::minutes(TOKEN_GRACE_PERIOD_MINUTES),
            operation_timeout: std::time::Duration::from_secs(30),
            max_refresh_attempts: 3,
            attempt_window: Duration::seconds(60),
            transient_retries: 3,
            initial_backoff: std::time::Duration::from_millis(500),
            max_backoff: std::time::Duration::from_millis(4000),
            banking_callback_window: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    ExpiringSoon,
    RefreshNeeded,
    Expired,
    LoggedOut,
}

impl SessionState {
    /// Derive the state from stored token material. Always recomputed, never cached.
    pub fn evaluate(tokens: Option<&TokenPair>, now: DateTime<Utc>, policy: &SessionPolicy) -> Self {
        let Some(tokens) = tokens else {
            return SessionState::LoggedOut;
        };
        let has_refresh = tokens.has_refresh_token();

        // Unparseable tokens count as already expired
        let Some(expires_at) = tokens.expires_at else {
            return if has_refresh {
                SessionState::RefreshNeeded
            } else {
                SessionState::Expired
            };
        };

        let remaining = expires_at - now;
        if remaining > policy.refresh_window {
            SessionState::Active
        } else if remaining > Duration::zero() {
            SessionState::ExpiringSoon
        } else if has_refresh && -remaining <= policy.grace_period {
            SessionState::RefreshNeeded
        } else {
            SessionState::Expired
        }
    }

    /// The current access token may still be sent as-is.
    pub fn is_usable(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::ExpiringSoon)
    }
}

/// Snapshot of the session for display and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub state: SessionState,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_until_expiry: Option<i64>,
    pub has_refresh_token: bool,
    pub device_trusted: bool,
    pub has_persistent_session: bool,
}

impl SessionInfo {
    pub fn compute(
        tokens: Option<&TokenPair>,
        device_trusted: bool,
        has_persistent_session: bool,
        now: DateTime<Utc>,
        policy: &SessionPolicy,
    ) -> Self {
        let expires_at = tokens.and_then(|t| t.expires_at);
        Self {
            state: SessionState::evaluate(tokens, now, policy),
            expires_at,
            seconds_until_expiry: expires_at.map(|e| (e - now).num_seconds()),
            has_refresh_token: tokens.map(TokenPair::has_refresh_token).unwrap_or(false),
            device_trusted,
            has_persistent_session,
        }
    }

    /// Minutes remaining until expiry, for display
    pub fn minutes_until_expiry(&self) -> i64 {
        self.seconds_until_expiry
            .map(|s| (s / 60).max(0))
            .unwrap_or(0)
    }
}
