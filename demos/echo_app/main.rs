//! Echo app demo
//!
//! Serves the sync endpoint on `ws://127.0.0.1:3000/_s/` with:
//! - `/echo`: an app that sends every boot and query body back to the caller
//! - `/notes`: an editable page
//!
//! Try it with any WebSocket client:
//!
//! ```text
//! > + /notes
//! < {"m":{"username":"default","editor":true}}
//! < {"p":{"title":"Notes"}}
//! > * /notes {"title":"Groceries"}
//! < {"title":"Groceries"}
//! > + /echo #start
//! < {"args":{"#":"#start"},"headers":{...}}
//! ```

use serde_json::json;
use std::sync::Weak;
use tracing_subscriber::EnvFilter;
use wavesync::prelude::*;

struct EchoApp {
    broker: Weak<InMemoryBroker>,
}

#[async_trait]
impl App for EchoApp {
    fn mode(&self) -> AppMode {
        AppMode::Unicast
    }

    async fn forward(&self, client_id: &str, session: &Session, body: Vec<u8>) -> SyncResult<()> {
        let Some(broker) = self.broker.upgrade() else {
            return Err(SyncError::Forward("broker is gone".to_string()));
        };

        let report = broker.publish(&format!("/{client_id}"), &body).await;
        tracing::info!(
            client_id = %client_id,
            user = %session.username(),
            delivered = report.delivered,
            "echoed"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wavesync=debug")),
        )
        .init();

    let config = match std::env::var("WAVESYNC_CONFIG") {
        Ok(path) => SyncConfig::from_yaml_file(&path)?,
        Err(_) => SyncConfig::default().with_editable(true),
    };

    let broker = Arc::new(InMemoryBroker::new());
    broker
        .register_app(
            "/echo",
            Arc::new(EchoApp {
                broker: Arc::downgrade(&broker),
            }),
        )
        .await;
    broker
        .set_page("/notes", Page::new(json!({"title": "Notes"})))
        .await;

    ServerBuilder::new()
        .with_config(config)
        .with_broker(broker)
        .serve("127.0.0.1:3000")
        .await
}
