//! ServerBuilder for fluent API to build sync servers

use super::host::{SessionProvider, SyncHost};
use crate::broker::Broker;
use crate::config::SyncConfig;
use crate::core::auth::AuthProvider;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;

#[cfg(feature = "websocket")]
use super::exposure::WebSocketExposure;
#[cfg(feature = "websocket")]
use std::net::SocketAddr;
#[cfg(feature = "websocket")]
use tokio::net::TcpListener;

/// Builder for sync servers
///
/// # Example
///
/// ```ignore
/// let broker = Arc::new(InMemoryBroker::new());
/// broker.register_app("/chat", Arc::new(ChatApp::new())).await;
///
/// ServerBuilder::new()
///     .with_config(SyncConfig::from_yaml_file("sync.yaml")?)
///     .with_broker(broker)
///     .serve("127.0.0.1:3000")
///     .await?;
/// ```
pub struct ServerBuilder {
    config: SyncConfig,
    broker: Option<Arc<dyn Broker>>,
    auth: Option<Arc<dyn AuthProvider>>,
    sessions: Option<Arc<dyn SessionProvider>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
            broker: None,
            auth: None,
            sessions: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the broker (required)
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Replace the default anonymous session lookup
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Add routes served next to the sync endpoint
    ///
    /// Use this for login pages, static assets or health checks.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(mut self) -> Result<SyncHost> {
        self.config.validate()?;

        let broker = self
            .broker
            .take()
            .ok_or_else(|| anyhow::anyhow!("Broker is required. Call .with_broker()"))?;

        let mut host = SyncHost::new(self.config, broker);
        if let Some(auth) = self.auth.take() {
            host = host.with_auth(auth);
        }
        if let Some(sessions) = self.sessions.take() {
            host = host.with_sessions(sessions);
        }

        Ok(host)
    }

    /// Build the final router: the WebSocket endpoint plus custom routes
    #[cfg(feature = "websocket")]
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);

        let mut router = WebSocketExposure::build_router(host)?;
        for routes in custom_routes {
            router = router.merge(routes);
        }
        Ok(router)
    }

    /// Serve the application with graceful shutdown
    #[cfg(feature = "websocket")]
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "websocket")]
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    #[test]
    fn test_build_host_requires_broker() {
        let result = ServerBuilder::new().build_host();
        let err = result.err().unwrap();
        assert!(err.to_string().contains("Broker is required"));
    }

    #[test]
    fn test_build_host_rejects_invalid_config() {
        let result = ServerBuilder::new()
            .with_config(SyncConfig::default().with_base_url("/no-slash"))
            .with_broker(Arc::new(InMemoryBroker::new()))
            .build_host();

        let err = result.err().unwrap();
        assert!(err.to_string().contains("must end with '/'"));
    }

    #[test]
    fn test_build_host_keeps_config() {
        let host = ServerBuilder::new()
            .with_config(SyncConfig::default().with_base_url("/ui/"))
            .with_broker(Arc::new(InMemoryBroker::new()))
            .build_host()
            .unwrap();

        assert_eq!(host.config.base_url, "/ui/");
        assert!(host.auth.is_none());
    }

    #[cfg(feature = "websocket")]
    #[tokio::test]
    async fn test_build_router_with_custom_routes() {
        use axum::routing::get;

        let router = ServerBuilder::new()
            .with_broker(Arc::new(InMemoryBroker::new()))
            .with_custom_routes(Router::new().route("/health", get(|| async { "ok" })))
            .build();

        assert!(router.is_ok());
    }
}
