//! Server host for transport-agnostic connection handling
//!
//! [`SyncHost`] carries everything a connection engine needs: configuration,
//! the broker, the optional auth provider and the session lookup. Exposures
//! only translate their transport into [`Frame`](crate::client::Frame)s and
//! hand them to a [`Client`](crate::client::Client) built from the host.

use crate::broker::Broker;
use crate::client::ClientBuilder;
use crate::config::SyncConfig;
use crate::core::auth::AuthProvider;
use crate::core::session::Session;
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::sync::Arc;

/// Resolves the session of an incoming connection
///
/// Returning `None` refuses the connection.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_for(&self, headers: &HeaderMap) -> Option<Arc<Session>>;
}

/// Every connection shares the `default` session
pub struct AnonymousSessions {
    session: Arc<Session>,
}

impl AnonymousSessions {
    pub fn new() -> Self {
        Self {
            session: Arc::new(Session::anonymous()),
        }
    }
}

impl Default for AnonymousSessions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for AnonymousSessions {
    async fn session_for(&self, _headers: &HeaderMap) -> Option<Arc<Session>> {
        Some(self.session.clone())
    }
}

/// Host context shared by every connection
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(
///     SyncHost::new(config, broker)
///         .with_auth(Arc::new(MyAuth))
///         .with_sessions(Arc::new(CookieSessions::new(store))),
/// );
/// let app = WebSocketExposure::build_router(host)?;
/// ```
pub struct SyncHost {
    pub config: Arc<SyncConfig>,
    pub broker: Arc<dyn Broker>,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub sessions: Arc<dyn SessionProvider>,
}

impl SyncHost {
    /// Host with anonymous sessions and no auth
    pub fn new(config: SyncConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            config: Arc::new(config),
            broker,
            auth: None,
            sessions: Arc::new(AnonymousSessions::new()),
        }
    }

    /// Enable token refresh and inactivity checks
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Builder for a connection engine bound to this host
    pub fn client_builder(&self, session: Arc<Session>) -> ClientBuilder {
        let builder = ClientBuilder::new(session, self.broker.clone())
            .with_config(self.config.as_ref().clone());
        match &self.auth {
            Some(auth) => builder.with_auth(auth.clone()),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::core::auth::NoAuthProvider;
    use crate::core::session::ANONYMOUS;

    #[tokio::test]
    async fn test_anonymous_sessions_share_one_session() {
        let sessions = AnonymousSessions::new();
        let a = sessions.session_for(&HeaderMap::new()).await.unwrap();
        let b = sessions.session_for(&HeaderMap::new()).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.username(), ANONYMOUS);
        assert_eq!(a.subject(), ANONYMOUS);
    }

    #[tokio::test]
    async fn test_client_builder_uses_host_config() {
        let host = SyncHost::new(
            SyncConfig::default().with_editable(true),
            Arc::new(InMemoryBroker::new()),
        )
        .with_auth(Arc::new(NoAuthProvider));

        let session = Arc::new(Session::anonymous());
        let client = host.client_builder(session).with_id("c-9").build();

        assert_eq!(client.id(), "c-9");
        assert!(host.config.editable);
        assert!(host.auth.is_some());
    }
}
