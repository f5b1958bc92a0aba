//! Shared helpers for integration tests: spin up a real server on a random
//! port, register users over REST, and drive the WebSocket protocol.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parlor_server::db;
use parlor_server::routes;
use parlor_server::state::AppState;
use parlor_server::ws::registry::PresenceRegistry;

pub struct TestServer {
    pub addr: SocketAddr,
    pub base_url: String,
    _tmp: tempfile::TempDir,
}

/// Start the server on a random port and return its handle.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = parlor_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = AppState {
        db,
        jwt_secret,
        registry: Arc::new(PresenceRegistry::new()),
    };

    let app = routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        _tmp: tmp_dir,
    }
}

/// Register a user and return (access_token, user_id).
pub async fn register_user(base_url: &str, username: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "password123",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200, "Registration failed for {}", username);
    let body: Value = resp.json().await.unwrap();
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

pub struct WsClient {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsClient {
    /// Connect with a token; panics if the handshake fails.
    pub async fn connect(addr: &SocketAddr, token: &str) -> Self {
        let ws_url = format!("ws://{}/ws?token={}", addr, token);
        let (stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("Failed to connect to WebSocket");
        let (write, read) = stream.split();
        Self { write, read }
    }

    /// Connect and wait for the online-users snapshot. The snapshot is sent
    /// after the connection is registered, so once it arrives this client is
    /// guaranteed to receive subsequent fan-outs.
    pub async fn connect_ready(addr: &SocketAddr, token: &str) -> Self {
        let mut client = Self::connect(addr, token).await;
        client.expect_event("online-users").await;
        client
    }

    pub async fn send(&mut self, event: Value) {
        self.write
            .send(Message::Text(event.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON event within the timeout, or None.
    pub async fn next_event(&mut self, wait: Duration) -> Option<Value> {
        loop {
            match tokio::time::timeout(wait, self.read.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return serde_json::from_str(text.as_str()).ok()
                }
                Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
                _ => return None,
            }
        }
    }

    /// Drain events until one with the given name arrives. Panics after a
    /// deadline so tests fail loudly instead of hanging.
    pub async fn expect_event(&mut self, name: &str) -> Value {
        for _ in 0..20 {
            match self.next_event(Duration::from_secs(2)).await {
                Some(event) => {
                    if event["event"] == name {
                        return event;
                    }
                }
                None => break,
            }
        }
        panic!("Did not receive expected event '{}'", name);
    }

    /// Assert that no event with the given name arrives within the window.
    pub async fn expect_silence(&mut self, name: &str, window: Duration) {
        let deadline = std::time::Instant::now() + window;
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return;
            }
            match self.next_event(deadline - now).await {
                Some(event) => {
                    assert_ne!(
                        event["event"], name,
                        "Expected silence but received: {event}"
                    );
                }
                None => return,
            }
        }
    }

    /// Send a close frame and drop the connection.
    pub async fn close(mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }
}
