//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

use sync_gateway::client::{Connector, TransportEvent, TransportLink};
use sync_gateway::config::{
    ClientSettings, CorsSettings, HeartbeatSettings, JwtSettings, ServerSettings, Settings,
    WebSocketSettings,
};
use sync_gateway::domain::value_objects::ConnectionState;
use sync_gateway::infrastructure::auth::{Claims, JwtIdentityVerifier};
use sync_gateway::presentation::http::routes;
use sync_gateway::shared::error::ClientError;
use sync_gateway::startup::{AppState, Application, Handlers};

pub const TEST_SECRET: &str = "integration-test-secret-that-is-long-enough";

/// Settings bound to an ephemeral local port
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        websocket: WebSocketSettings::default(),
        heartbeat: HeartbeatSettings::default(),
        jwt: JwtSettings {
            secret: TEST_SECRET.into(),
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        client: ClientSettings::default(),
        environment: "test".into(),
    }
}

/// Signed token for `user_id`, valid for an hour
pub fn token_for(user_id: &str) -> String {
    JwtIdentityVerifier::new(TEST_SECRET)
        .issue(&Claims::for_user(user_id, 3600))
        .expect("token should sign")
}

/// Router-level test application
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application with the in-memory handlers
    pub async fn new() -> Self {
        let settings = test_settings();
        let handlers = Handlers::in_memory(&settings);
        let state = AppState::new(settings, handlers);

        Self {
            router: routes::create_router(state.clone()),
            state,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

/// A gateway listening on a real socket
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let app = Application::build(test_settings())
            .await
            .expect("application should build");
        let addr = app.local_addr().expect("listener should be bound");
        let state = app.state().clone();
        tokio::spawn(app.run_until_stopped());

        Self { addr, state }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Server side of an in-memory transport link
pub struct MockPeer {
    /// Frames written by the client
    pub frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockPeer {
    /// Next frame the client wrote, parsed
    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv_text().await;
        serde_json::from_str(&text).expect("client frames are JSON")
    }

    pub async fn recv_text(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(30), self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the link")
    }

    pub fn push(&self, message: Value) {
        let _ = self.events.send(TransportEvent::Message(message.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Whether the client dropped its end of the link
    pub async fn is_dropped(&mut self) -> bool {
        loop {
            match tokio::time::timeout(Duration::from_secs(1), self.frames.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// In-memory connector handing each opened link to the test
pub struct MockConnector {
    opens: AtomicUsize,
    refuse: AtomicBool,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            opens: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            peers,
        });
        (connector, rx)
    }

    /// Connector whose every open fails
    pub fn refusing() -> Arc<Self> {
        let (connector, _) = Self::new();
        connector.refuse.store(true, Ordering::SeqCst);
        connector
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _endpoint: &str) -> Result<TransportLink, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }

        let (outbound, frames) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = self.peers.send(MockPeer {
            frames,
            events: events_tx,
        });
        Ok(TransportLink { outbound, events })
    }
}

pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<MockPeer>) -> MockPeer {
    tokio::time::timeout(Duration::from_secs(120), peers.recv())
        .await
        .expect("timed out waiting for a connection attempt")
        .expect("connector dropped")
}

/// Wait until the watched state satisfies `predicate`
pub async fn wait_for_state<F>(rx: &mut watch::Receiver<ConnectionState>, predicate: F) -> ConnectionState
where
    F: FnMut(&ConnectionState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("manager dropped")
        .clone()
}

/// Forwarding handler: every payload lands on the returned receiver
pub fn collector() -> (
    impl Fn(&Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |payload: &Value| {
        let _ = tx.send(payload.clone());
    };
    (handler, rx)
}

pub async fn recv_within(rx: &mut mpsc::UnboundedReceiver<Value>, secs: u64) -> Value {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for a payload")
        .expect("channel closed")
}
