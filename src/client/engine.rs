//! Connection engine
//!
//! One [`Client`] per connected browser. [`Client::run`] spawns the write loop
//! and runs the read loop on the calling task:
//!
//! 1. Read the next frame (bounded by the pong deadline)
//! 2. Refresh the session token and check inactivity
//! 3. Decode the frame and resolve its address
//! 4. Dispatch `patch`, `query` or `watch` to the broker
//!
//! When either loop stops, the engine unsubscribes from every route it
//! watched, closes the outbound queue and waits for the write loop to close
//! the transport. That teardown runs exactly once.

use super::handle::{ClientHandle, ConnState, Outbox};
use super::transport::{Frame, is_expected_close, is_expected_error};
use super::writer::{WriterExit, run_writer};
use crate::broker::{App, AppMode, Broker};
use crate::config::SyncConfig;
use crate::core::auth::{AuthProvider, refresh_session_token};
use crate::core::error::{ProtocolError, SyncError};
use crate::core::headers::merge_headers;
use crate::core::protocol::{Boot, Directive, ForwardBody, Message, MessageKind, decode_args};
use crate::core::session::Session;
use axum::http::HeaderMap;
use futures::{Sink, Stream, StreamExt};
use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Builder for [`Client`]
///
/// # Example
///
/// ```rust,ignore
/// let client = ClientBuilder::new(session, broker)
///     .with_config(config)
///     .with_auth(auth)
///     .with_headers(request_headers)
///     .build();
/// client.run(stream, sink).await;
/// ```
pub struct ClientBuilder {
    id: Option<String>,
    remote_addr: String,
    session: Arc<Session>,
    broker: Arc<dyn Broker>,
    auth: Option<Arc<dyn AuthProvider>>,
    headers: HeaderMap,
    config: SyncConfig,
}

impl ClientBuilder {
    pub fn new(session: Arc<Session>, broker: Arc<dyn Broker>) -> Self {
        Self {
            id: None,
            remote_addr: "unknown".to_string(),
            session,
            broker,
            auth: None,
            headers: HeaderMap::new(),
            config: SyncConfig::default(),
        }
    }

    /// Use a fixed client id instead of a generated one
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Remote address, only used in logs
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Request headers captured when the connection was accepted
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Client {
        let id = self
            .id
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let (handle, outbox) = ClientHandle::new(id.as_str(), self.config.timings.send_buffer);

        Client {
            id,
            remote_addr: self.remote_addr,
            session: self.session,
            broker: self.broker,
            auth: self.auth,
            handle,
            outbox: Some(outbox),
            routes: Vec::new(),
            headers: self.headers,
            config: self.config,
        }
    }
}

/// Protocol engine for one connection
pub struct Client {
    id: String,
    remote_addr: String,
    session: Arc<Session>,
    broker: Arc<dyn Broker>,
    auth: Option<Arc<dyn AuthProvider>>,
    handle: ClientHandle,
    outbox: Option<Outbox>,
    /// Every route watched so far, duplicates included
    routes: Vec<String>,
    headers: HeaderMap,
    config: SyncConfig,
}

impl Client {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle for pushing data to this client or asking it to quit
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    pub fn state(&self) -> ConnState {
        self.handle.state()
    }

    /// Drive the connection until the transport fails or the client quits
    pub async fn run<S, K, E>(mut self, mut stream: S, sink: K) -> ConnState
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Error + 'static,
        K: Sink<Frame> + Unpin + Send + 'static,
        K::Error: Display,
    {
        let Some(outbox) = self.outbox.take() else {
            tracing::warn!(client_id = %self.id, "client already ran");
            return self.state();
        };

        tracing::debug!(
            client_id = %self.id,
            client = %self.remote_addr,
            "client connected"
        );

        let mut writer = Some(tokio::spawn(run_writer(
            self.id.clone(),
            outbox,
            sink,
            self.config.timings.clone(),
        )));

        self.listen(&mut stream, &mut writer).await;
        self.teardown(writer).await;
        self.state()
    }

    /// Read loop; returns when the connection should be torn down
    ///
    /// Sets `writer` to `None` if the write loop finished first.
    async fn listen<S, E>(&mut self, stream: &mut S, writer: &mut Option<JoinHandle<WriterExit>>)
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: Error + 'static,
    {
        let timings = self.config.timings.clone();
        let mut deadline = Instant::now() + timings.pong_wait();

        loop {
            let next = match writer.as_mut() {
                Some(write_task) => tokio::select! {
                    exit = write_task => {
                        *writer = None;
                        match exit {
                            Ok(exit) => tracing::debug!(
                                client_id = %self.id,
                                exit = ?exit,
                                "write loop ended, closing"
                            ),
                            Err(e) => tracing::warn!(
                                client_id = %self.id,
                                error = %e,
                                "write loop panicked"
                            ),
                        }
                        return;
                    }
                    next = tokio::time::timeout_at(deadline, stream.next()) => next,
                },
                None => tokio::time::timeout_at(deadline, stream.next()).await,
            };

            let frame = match next {
                Err(_) => {
                    let err = SyncError::Transport("no pong within deadline".to_string());
                    tracing::warn!(
                        client_id = %self.id,
                        client = %self.remote_addr,
                        code = err.error_code(),
                        error = %err,
                        "socket_read failed"
                    );
                    return;
                }
                Ok(None) => {
                    tracing::debug!(
                        client_id = %self.id,
                        client = %self.remote_addr,
                        "socket_read: peer went away"
                    );
                    return;
                }
                Ok(Some(Err(e))) => {
                    let expected = is_expected_error(&e);
                    let err = SyncError::Transport(e.to_string());
                    if expected {
                        tracing::debug!(
                            client_id = %self.id,
                            client = %self.remote_addr,
                            code = err.error_code(),
                            error = %err,
                            "socket_read: peer went away"
                        );
                    } else {
                        tracing::warn!(
                            client_id = %self.id,
                            client = %self.remote_addr,
                            code = err.error_code(),
                            error = %err,
                            "socket_read failed"
                        );
                    }
                    return;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Frame::Pong(_) => deadline = Instant::now() + timings.pong_wait(),
                Frame::Ping(_) => {}
                Frame::Close(code) => {
                    if is_expected_close(code) {
                        tracing::debug!(client_id = %self.id, code = ?code, "socket closed");
                    } else {
                        tracing::warn!(
                            client_id = %self.id,
                            client = %self.remote_addr,
                            code = ?code,
                            "socket closed unexpectedly"
                        );
                    }
                    return;
                }
                Frame::Text(data) | Frame::Binary(data) => {
                    if data.len() > timings.max_message_size {
                        let err = ProtocolError::FrameTooLarge {
                            size: data.len(),
                            limit: timings.max_message_size,
                        };
                        tracing::warn!(
                            client_id = %self.id,
                            client = %self.remote_addr,
                            code = err.error_code(),
                            error = %err,
                            "socket_read: closing"
                        );
                        return;
                    }
                    self.handle_frame(&data).await;
                }
            }
        }
    }

    /// Process one inbound data frame
    pub(crate) async fn handle_frame(&mut self, raw: &[u8]) {
        self.handle.mark_active();

        if let Some(auth) = &self.auth {
            if let Err(e) = refresh_session_token(
                auth.as_ref(),
                &self.session,
                self.config.timings.token_refresh_timeout(),
            )
            .await
            {
                // Not fatal, retried on the next frame
                tracing::warn!(
                    client_id = %self.id,
                    client = %self.remote_addr,
                    code = e.error_code(),
                    error = %e,
                    "refresh_oauth2_token failed"
                );
            }

            if self
                .session
                .touch(self.config.auth.inactivity_timeout())
                .await
                .is_err()
            {
                tracing::info!(
                    client_id = %self.id,
                    user = %self.session.username(),
                    "session inactive, logging out"
                );
                match Directive::logout(&self.config.base_url).to_vec() {
                    Ok(data) => {
                        self.send(data);
                    }
                    Err(e) => tracing::error!(error = %e, "failed marshaling logout"),
                }
                return;
            }
        }

        let msg = match Message::parse(raw) {
            Ok(msg) => msg.resolve(&self.config.base_url),
            Err(e) => {
                tracing::debug!(
                    client_id = %self.id,
                    code = e.error_code(),
                    error = %e,
                    "dropping malformed frame"
                );
                return;
            }
        };

        match msg.kind {
            MessageKind::Patch => self.on_patch(msg).await,
            MessageKind::Query => self.on_query(msg).await,
            MessageKind::Watch => self.on_watch(msg).await,
        }
    }

    async fn on_patch(&mut self, msg: Message) {
        if !self.config.editable {
            tracing::debug!(
                client_id = %self.id,
                route = %msg.addr,
                "patch ignored on read-only connection"
            );
            return;
        }
        self.broker.patch(&msg.addr, &msg.data).await;
    }

    async fn on_query(&mut self, msg: Message) {
        let Some(app) = self.broker.app(&msg.addr).await else {
            let err = SyncError::AppUnavailable { route: msg.addr };
            tracing::info!(
                client_id = %self.id,
                client = %self.remote_addr,
                code = err.error_code(),
                error = %err,
                "query: service unavailable"
            );
            return;
        };

        let body = ForwardBody::new(decode_args(&msg.data));
        self.forward(app.as_ref(), &msg.addr, &body).await;
    }

    async fn on_watch(&mut self, msg: Message) {
        // Subscribe even if nothing serves the route yet
        self.subscribe(&msg.addr).await;

        if let Some(app) = self.broker.app(&msg.addr).await {
            let scope = match app.mode() {
                AppMode::Unicast => format!("/{}", self.id),
                AppMode::Multicast => format!("/{}", self.session.subject()),
            };
            self.subscribe(&scope).await;

            let args = match Boot::from_watch_data(&msg.data).to_value() {
                Ok(args) => args,
                Err(e) => {
                    tracing::error!(route = %msg.addr, error = %e, "failed marshaling boot");
                    return;
                }
            };
            let mut body = ForwardBody::new(args);

            // Headers are delivered once; the app keeps them from here on
            if let Some(cached) = self.broker.take_headers(&self.id).await {
                body = body.with_headers(merge_headers(&self.headers, &cached));
            }

            self.forward(app.as_ref(), &msg.addr, &body).await;
            return;
        }

        match Directive::meta(self.session.username(), self.config.editable).to_vec() {
            Ok(meta) => {
                self.send(meta);
            }
            Err(e) => tracing::error!(error = %e, "failed marshaling meta"),
        }

        if let Some(page) = self.broker.page(&msg.addr).await {
            match page.marshal() {
                Ok(data) => {
                    self.send(data);
                    return;
                }
                Err(e) => tracing::error!(route = %msg.addr, error = %e, "failed marshaling page"),
            }
        }

        match Directive::not_found().to_vec() {
            Ok(data) => {
                self.send(data);
            }
            Err(e) => tracing::error!(route = %msg.addr, error = %e, "failed marshaling not_found"),
        }
    }

    async fn forward(&self, app: &dyn App, route: &str, body: &ForwardBody) {
        let data = match body.to_vec() {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    client_id = %self.id,
                    route = %route,
                    error = %e,
                    "failed marshaling body"
                );
                return;
            }
        };

        if let Err(e) = app.forward(&self.id, &self.session, data).await {
            tracing::warn!(
                client_id = %self.id,
                route = %route,
                code = e.error_code(),
                error = %e,
                "forward to app failed"
            );
        }
    }

    async fn subscribe(&mut self, route: &str) {
        self.routes.push(route.to_string());
        self.broker.subscribe(route, self.handle.clone()).await;
    }

    fn send(&self, data: Vec<u8>) -> bool {
        self.handle.send(data)
    }

    /// Unsubscribe, close the queue and wait for the writer; runs once
    async fn teardown(&mut self, writer: Option<JoinHandle<WriterExit>>) {
        if !self.handle.begin_close() {
            return;
        }

        self.broker.unsubscribe(&self.handle, &self.routes).await;
        // Never booted an app: drop the unread header cache entry
        self.broker.take_headers(&self.id).await;
        self.handle.quit();

        if let Some(writer) = writer
            && let Err(e) = writer.await
        {
            tracing::warn!(client_id = %self.id, error = %e, "write loop panicked");
        }

        self.handle.mark_closed();
        tracing::debug!(
            client_id = %self.id,
            client = %self.remote_addr,
            routes = self.routes.len(),
            "client disconnected"
        );
    }
}
