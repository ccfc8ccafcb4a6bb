//! End-user sessions
//!
//! A session outlives any single connection: several tabs of the same user
//! share one `Arc<Session>`. The engine only reads identity from it, refreshes
//! its token and records activity.

use crate::core::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

/// Subject and username of the session used when auth is disabled
pub const ANONYMOUS: &str = "default";

/// An OAuth2 access token with optional refresh material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

#[derive(Debug)]
struct SessionState {
    token: Option<OAuthToken>,
    last_active: DateTime<Utc>,
}

/// An authenticated (or anonymous) end user
#[derive(Debug)]
pub struct Session {
    subject: String,
    username: String,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(subject: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            username: username.into(),
            state: RwLock::new(SessionState {
                token: None,
                last_active: Utc::now(),
            }),
        }
    }

    /// Session shared by every connection when auth is disabled
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS, ANONYMOUS)
    }

    pub fn with_token(mut self, token: OAuthToken) -> Self {
        self.state.get_mut().token = Some(token);
        self
    }

    /// Stable identity of the user, used for multicast scoping
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn token(&self) -> Option<OAuthToken> {
        self.state.read().await.token.clone()
    }

    pub async fn set_token(&self, token: OAuthToken) {
        self.state.write().await.token = Some(token);
    }

    pub async fn last_active(&self) -> DateTime<Utc> {
        self.state.read().await.last_active
    }

    /// Record activity, or report that the session went idle for too long
    ///
    /// A zero `inactivity_timeout` disables the check. An expired session
    /// keeps its old activity timestamp so every later call also fails.
    pub async fn touch(&self, inactivity_timeout: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if !inactivity_timeout.is_zero()
            && let Ok(limit) = chrono::Duration::from_std(inactivity_timeout)
            && now.signed_duration_since(state.last_active) > limit
        {
            return Err(SyncError::SessionExpired);
        }

        state.last_active = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_touch_within_timeout_updates_activity() {
        let session = Session::new("sub-1", "alice");
        let before = session.last_active().await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        session.touch(Duration::from_secs(60)).await.unwrap();

        assert!(session.last_active().await > before);
    }

    #[tokio::test]
    async fn test_touch_after_timeout_expires() {
        let session = Session::new("sub-1", "alice");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = session.touch(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SyncError::SessionExpired)));

        // Stays expired
        let result = session.touch(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SyncError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_zero_timeout_disables_expiry() {
        let session = Session::new("sub-1", "alice");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.touch(Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let session = Session::anonymous();
        assert_eq!(session.subject(), ANONYMOUS);
        assert!(session.token().await.is_none());

        session.set_token(OAuthToken::new("abc")).await;
        assert_eq!(session.token().await.unwrap().access_token, "abc");
    }

    #[tokio::test]
    async fn test_with_token_builder() {
        let session = Session::new("s", "u").with_token(OAuthToken::new("t0"));
        assert_eq!(session.token().await.unwrap().access_token, "t0");
    }

}
