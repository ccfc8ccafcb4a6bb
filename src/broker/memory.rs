//! In-memory broker
//!
//! Keeps apps, pages, cached headers and subscriber sets in `RwLock`-guarded
//! maps. Reads (lookups, fan-out) are frequent, writes (subscribe,
//! unsubscribe, registration) are rare.
//!
//! # Fan-out
//!
//! ```text
//! publish(route, data)
//!        │
//!  subscribers[route]
//!        │
//!  for each ClientHandle ──try_send──▶ outbound queue (dropped if full)
//! ```

use super::{App, Broker, Page};
use crate::client::ClientHandle;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the message
    pub delivered: usize,
    /// Subscribers whose queue was full or closed
    pub dropped: usize,
}

/// Broker backed by in-process maps
#[derive(Default)]
pub struct InMemoryBroker {
    apps: RwLock<HashMap<String, Arc<dyn App>>>,
    pages: RwLock<HashMap<String, Page>>,
    headers: RwLock<HashMap<String, HeaderMap>>,
    /// route -> client id -> handle
    subscribers: RwLock<HashMap<String, HashMap<String, ClientHandle>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an app to a route, replacing any previous binding
    pub async fn register_app(&self, route: impl Into<String>, app: Arc<dyn App>) {
        let route = route.into();
        tracing::info!(route = %route, mode = ?app.mode(), "app registered");
        self.apps.write().await.insert(route, app);
    }

    pub async fn unregister_app(&self, route: &str) -> Option<Arc<dyn App>> {
        let removed = self.apps.write().await.remove(route);
        if removed.is_some() {
            tracing::info!(route = %route, "app unregistered");
        }
        removed
    }

    pub async fn set_page(&self, route: impl Into<String>, page: Page) {
        self.pages.write().await.insert(route.into(), page);
    }

    pub async fn remove_page(&self, route: &str) -> Option<Page> {
        self.pages.write().await.remove(route)
    }

    /// Push `data` to every subscriber of `route` without waiting
    pub async fn publish(&self, route: &str, data: &[u8]) -> PublishReport {
        let subscribers = self.subscribers.read().await;
        let mut report = PublishReport::default();

        let Some(clients) = subscribers.get(route) else {
            return report;
        };

        for (client_id, client) in clients {
            if client.send(data.to_vec()) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                tracing::debug!(
                    route = %route,
                    client_id = %client_id,
                    "publish dropped for slow or closing client"
                );
            }
        }

        report
    }

    pub async fn subscriber_count(&self, route: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(route)
            .map_or(0, HashMap::len)
    }

    /// Number of routes with at least one subscriber
    pub async fn route_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn subscribe(&self, route: &str, client: ClientHandle) {
        tracing::debug!(route = %route, client_id = %client.id(), "subscribed");
        self.subscribers
            .write()
            .await
            .entry(route.to_string())
            .or_default()
            .insert(client.id().to_string(), client);
    }

    async fn unsubscribe(&self, client: &ClientHandle, routes: &[String]) {
        let mut subscribers = self.subscribers.write().await;

        for route in routes {
            let Some(clients) = subscribers.get_mut(route) else {
                continue;
            };
            if clients
                .get(client.id())
                .is_some_and(|existing| existing.same_client(client))
            {
                clients.remove(client.id());
            }
            if clients.is_empty() {
                subscribers.remove(route);
            }
        }

        tracing::debug!(
            client_id = %client.id(),
            routes = routes.len(),
            "unsubscribed"
        );
    }

    async fn patch(&self, addr: &str, data: &[u8]) {
        if let Ok(Value::Object(changes)) = serde_json::from_slice::<Value>(data) {
            self.pages
                .write()
                .await
                .entry(addr.to_string())
                .or_insert_with(|| Page::new(Value::Object(Default::default())))
                .apply(&changes);
        }

        let report = self.publish(addr, data).await;
        tracing::debug!(
            route = %addr,
            delivered = report.delivered,
            dropped = report.dropped,
            "patch published"
        );
    }

    async fn app(&self, addr: &str) -> Option<Arc<dyn App>> {
        self.apps.read().await.get(addr).cloned()
    }

    async fn page(&self, addr: &str) -> Option<Page> {
        self.pages.read().await.get(addr).cloned()
    }

    async fn cache_headers(&self, client_id: &str, headers: HeaderMap) {
        self.headers
            .write()
            .await
            .insert(client_id.to_string(), headers);
    }

    async fn take_headers(&self, client_id: &str) -> Option<HeaderMap> {
        self.headers.write().await.remove(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::AppMode;
    use crate::core::error::Result;
    use crate::core::session::Session;
    use axum::http::HeaderValue;
    use serde_json::json;

    struct NullApp(AppMode);

    #[async_trait]
    impl App for NullApp {
        fn mode(&self) -> AppMode {
            self.0
        }

        async fn forward(&self, _: &str, _: &Session, _: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let broker = InMemoryBroker::new();
        let (client, mut outbox) = ClientHandle::new("c1", 8);

        broker.subscribe("/demo", client.clone()).await;
        assert_eq!(broker.subscriber_count("/demo").await, 1);

        let report = broker.publish("/demo", b"hello").await;
        assert_eq!(report, PublishReport { delivered: 1, dropped: 0 });
        assert_eq!(outbox.rx.try_recv().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_publish_to_unknown_route() {
        let broker = InMemoryBroker::new();
        assert_eq!(broker.publish("/nowhere", b"x").await, PublishReport::default());
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_keeps_one_entry() {
        let broker = InMemoryBroker::new();
        let (client, mut outbox) = ClientHandle::new("c1", 8);

        broker.subscribe("/demo", client.clone()).await;
        broker.subscribe("/demo", client.clone()).await;

        assert_eq!(broker.subscriber_count("/demo").await, 1);
        broker.publish("/demo", b"once").await;
        assert_eq!(outbox.rx.try_recv().unwrap(), b"once");
        assert!(outbox.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_from_all_routes() {
        let broker = InMemoryBroker::new();
        let (c1, _o1) = ClientHandle::new("c1", 8);
        let (c2, _o2) = ClientHandle::new("c2", 8);

        broker.subscribe("/a", c1.clone()).await;
        broker.subscribe("/b", c1.clone()).await;
        broker.subscribe("/a", c2.clone()).await;

        broker
            .unsubscribe(&c1, &["/a".to_string(), "/b".to_string(), "/a".to_string()])
            .await;

        assert_eq!(broker.subscriber_count("/a").await, 1);
        assert_eq!(broker.subscriber_count("/b").await, 0);
        assert_eq!(broker.route_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_counts_full_queues_as_dropped() {
        let broker = InMemoryBroker::new();
        let (fast, _fast_outbox) = ClientHandle::new("fast", 8);
        let (slow, _slow_outbox) = ClientHandle::new("slow", 1);

        broker.subscribe("/feed", fast.clone()).await;
        broker.subscribe("/feed", slow.clone()).await;

        broker.publish("/feed", b"1").await;
        let report = broker.publish("/feed", b"2").await;

        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_headers_are_taken_once() {
        let broker = InMemoryBroker::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-user", HeaderValue::from_static("alice"));

        broker.cache_headers("c1", headers).await;

        let taken = broker.take_headers("c1").await.unwrap();
        assert_eq!(taken["x-user"], "alice");
        assert!(broker.take_headers("c1").await.is_none());
    }

    #[tokio::test]
    async fn test_app_registration() {
        let broker = InMemoryBroker::new();
        assert!(broker.app("/demo").await.is_none());

        broker
            .register_app("/demo", Arc::new(NullApp(AppMode::Multicast)))
            .await;
        assert_eq!(broker.app("/demo").await.unwrap().mode(), AppMode::Multicast);

        assert!(broker.unregister_app("/demo").await.is_some());
        assert!(broker.app("/demo").await.is_none());
    }

    #[tokio::test]
    async fn test_patch_updates_page_and_publishes() {
        let broker = InMemoryBroker::new();
        let (client, mut outbox) = ClientHandle::new("c1", 8);
        broker.set_page("/page", Page::new(json!({"title": "old"}))).await;
        broker.subscribe("/page", client).await;

        broker.patch("/page", br#"{"title":"new"}"#).await;

        assert_eq!(
            broker.page("/page").await.unwrap().snapshot(),
            &json!({"title": "new"})
        );
        assert_eq!(outbox.rx.try_recv().unwrap(), br#"{"title":"new"}"#);
    }

    #[tokio::test]
    async fn test_patch_with_opaque_data_only_publishes() {
        let broker = InMemoryBroker::new();
        let (client, mut outbox) = ClientHandle::new("c1", 8);
        broker.subscribe("/page", client).await;

        broker.patch("/page", b"not json").await;

        assert!(broker.page("/page").await.is_none());
        assert_eq!(outbox.rx.try_recv().unwrap(), b"not json");
    }
}
