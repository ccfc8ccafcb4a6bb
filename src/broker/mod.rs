//! Broker contract
//!
//! The broker is the process-wide registry that maps addresses to apps, pages
//! and subscriber sets. Connection engines only ever call its operations; they
//! never touch its internals. Implementations do their own synchronization.
//!
//! # Architecture
//!
//! ```text
//! Client ──watch──▶ Broker::subscribe(route, handle)
//!        ──query──▶ Broker::app(route) ──▶ App::forward(client_id, session, body)
//!        ──patch──▶ Broker::patch(route, data)
//!
//! App ──publish(route)──▶ Broker ──ClientHandle::send()──▶ subscribed clients
//! ```

mod memory;

pub use memory::{InMemoryBroker, PublishReport};

use crate::client::ClientHandle;
use crate::core::error::Result;
use crate::core::session::Session;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// How an app delivers updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    /// Updates go to one connection (`/{client_id}`)
    Unicast,
    /// Updates go to every connection of one user (`/{subject}`)
    Multicast,
}

/// An application instance bound to a route
#[async_trait]
pub trait App: Send + Sync {
    fn mode(&self) -> AppMode;

    /// Deliver a query or boot body on behalf of `client_id`
    async fn forward(&self, client_id: &str, session: &Session, body: Vec<u8>) -> Result<()>;
}

/// A static page served at an address
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    snapshot: Value,
}

impl Page {
    pub fn new(snapshot: Value) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Value {
        &self.snapshot
    }

    /// Shallow-merge the keys of a JSON object into the snapshot
    pub fn apply(&mut self, patch: &serde_json::Map<String, Value>) {
        if !self.snapshot.is_object() {
            self.snapshot = Value::Object(Default::default());
        }
        if let Some(snapshot) = self.snapshot.as_object_mut() {
            for (key, value) in patch {
                if value.is_null() {
                    snapshot.remove(key);
                } else {
                    snapshot.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Wire form: `{"p": <snapshot>}`
    pub fn marshal(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&json!({ "p": self.snapshot }))
    }
}

/// Routing registry used by connection engines
#[async_trait]
pub trait Broker: Send + Sync {
    /// Add `client` to the subscriber set of `route`
    async fn subscribe(&self, route: &str, client: ClientHandle);

    /// Remove `client` from every route in `routes`
    async fn unsubscribe(&self, client: &ClientHandle, routes: &[String]);

    /// Apply a client edit to the page at `addr` and fan it out
    async fn patch(&self, addr: &str, data: &[u8]);

    /// App bound to `addr`, if any
    async fn app(&self, addr: &str) -> Option<Arc<dyn App>>;

    /// Page stored at `addr`, if any
    async fn page(&self, addr: &str) -> Option<Page>;

    /// Remember the headers a client connected with
    async fn cache_headers(&self, client_id: &str, headers: HeaderMap);

    /// Take the cached headers of `client_id`; later calls return `None`
    async fn take_headers(&self, client_id: &str) -> Option<HeaderMap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_marshal() {
        let page = Page::new(json!({"title": "Hello"}));
        let value: Value = serde_json::from_slice(&page.marshal().unwrap()).unwrap();
        assert_eq!(value, json!({"p": {"title": "Hello"}}));
    }

    #[test]
    fn test_page_apply_merges_and_removes() {
        let mut page = Page::new(json!({"a": 1, "b": 2}));
        let patch = json!({"b": null, "c": 3});
        page.apply(patch.as_object().unwrap());
        assert_eq!(page.snapshot(), &json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_page_apply_replaces_non_object_snapshot() {
        let mut page = Page::new(json!("scalar"));
        page.apply(json!({"k": true}).as_object().unwrap());
        assert_eq!(page.snapshot(), &json!({"k": true}));
    }

    #[test]
    fn test_app_mode_serde() {
        assert_eq!(serde_json::to_value(AppMode::Unicast).unwrap(), json!("unicast"));
        let mode: AppMode = serde_json::from_value(json!("multicast")).unwrap();
        assert_eq!(mode, AppMode::Multicast);
    }
}
