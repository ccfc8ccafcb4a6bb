//! Auth provider contract
//!
//! The engine never talks to an identity provider itself. When an
//! [`AuthProvider`] is configured, it asks the provider to keep the session's
//! OAuth2 token valid before handling each inbound frame.

use crate::core::error::{Result, SyncError};
use crate::core::session::{OAuthToken, Session};
use async_trait::async_trait;
use std::time::Duration;

/// Trait for OAuth2 token providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return `token` if it is still valid, or a refreshed token otherwise
    async fn ensure_valid_token(&self, token: &OAuthToken) -> Result<OAuthToken>;
}

/// Provider that accepts every token as-is (for development)
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn ensure_valid_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
        Ok(token.clone())
    }
}

/// Refresh the session token, bounded by `timeout`
///
/// Sessions without a token are left alone. On success the (possibly new)
/// token is stored back into the session.
pub async fn refresh_session_token(
    auth: &dyn AuthProvider,
    session: &Session,
    timeout: Duration,
) -> Result<()> {
    let Some(token) = session.token().await else {
        return Ok(());
    };

    let refreshed = tokio::time::timeout(timeout, auth.ensure_valid_token(&token))
        .await
        .map_err(|_| SyncError::Auth("token refresh timed out".to_string()))??;

    if refreshed != token {
        session.set_token(refreshed).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RotatingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for RotatingProvider {
        async fn ensure_valid_token(&self, _token: &OAuthToken) -> Result<OAuthToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OAuthToken::new(format!("rotated-{n}")))
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl AuthProvider for StalledProvider {
        async fn ensure_valid_token(&self, token: &OAuthToken) -> Result<OAuthToken> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(token.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl AuthProvider for FailingProvider {
        async fn ensure_valid_token(&self, _token: &OAuthToken) -> Result<OAuthToken> {
            Err(SyncError::Auth("refresh token revoked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_refresh_stores_new_token() {
        let session = Session::new("s", "u").with_token(OAuthToken::new("old"));
        let provider = RotatingProvider {
            calls: AtomicUsize::new(0),
        };

        refresh_session_token(&provider, &session, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(session.token().await.unwrap().access_token, "rotated-0");
    }

    #[tokio::test]
    async fn test_refresh_skips_sessions_without_token() {
        let session = Session::anonymous();
        let provider = RotatingProvider {
            calls: AtomicUsize::new(0),
        };

        refresh_session_token(&provider, &session, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_times_out() {
        let session = Session::new("s", "u").with_token(OAuthToken::new("old"));

        let result =
            refresh_session_token(&StalledProvider, &session, Duration::from_millis(20)).await;

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(session.token().await.unwrap().access_token, "old");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_old_token() {
        let session = Session::new("s", "u").with_token(OAuthToken::new("old"));

        let result = refresh_session_token(&FailingProvider, &session, Duration::from_secs(1)).await;

        assert!(result.is_err());
        assert_eq!(session.token().await.unwrap().access_token, "old");
    }

    #[tokio::test]
    async fn test_no_auth_provider_is_identity() {
        let token = OAuthToken::new("same").with_refresh_token("r");
        let out = NoAuthProvider.ensure_valid_token(&token).await.unwrap();
        assert_eq!(out, token);
    }
}
