//! Integration tests for the WebSocket session layer: handshake auth,
//! presence transitions, and message fan-out.

mod common;

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use common::{register_user, start_test_server, WsClient};

const SILENCE: Duration = Duration::from_millis(400);

#[tokio::test]
async fn invalid_token_closes_with_4002() {
    let server = start_test_server().await;

    let ws_url = format!("ws://{}/ws?token=garbage", server.addr);
    let (mut stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Upgrade should succeed before the close frame");

    match stream.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 4002);
        }
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_token_rejects_upgrade() {
    let server = start_test_server().await;

    let ws_url = format!("ws://{}/ws", server.addr);
    assert!(tokio_tungstenite::connect_async(&ws_url).await.is_err());
}

#[tokio::test]
async fn connecting_client_receives_online_snapshot() {
    let server = start_test_server().await;
    let (token_a, user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, user_b) = register_user(&server.base_url, "bob").await;

    let _alice = WsClient::connect_ready(&server.addr, &token_a).await;
    let mut bob = WsClient::connect(&server.addr, &token_b).await;

    let snapshot = bob.expect_event("online-users").await;
    let users = snapshot["users"].as_array().unwrap();
    let ids: Vec<&str> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&user_a.as_str()));
    assert!(ids.contains(&user_b.as_str()));
}

#[tokio::test]
async fn presence_broadcasts_only_on_first_and_last_connection() {
    let server = start_test_server().await;
    let (token_a, _user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, user_b) = register_user(&server.base_url, "bob").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;

    // First tab: exactly one online broadcast
    let bob_tab1 = WsClient::connect_ready(&server.addr, &token_b).await;
    let event = alice.expect_event("presence-changed").await;
    assert_eq!(event["userId"], user_b.as_str());
    assert_eq!(event["status"], "online");

    // Second tab: silent
    let bob_tab2 = WsClient::connect_ready(&server.addr, &token_b).await;
    alice.expect_silence("presence-changed", SILENCE).await;

    // Closing one of two tabs: still online, silent
    bob_tab2.close().await;
    alice.expect_silence("presence-changed", SILENCE).await;

    // Closing the last tab: exactly one offline broadcast
    bob_tab1.close().await;
    let event = alice.expect_event("presence-changed").await;
    assert_eq!(event["userId"], user_b.as_str());
    assert_eq!(event["status"], "offline");
}

#[tokio::test]
async fn global_message_reaches_every_connection() {
    let server = start_test_server().await;
    let (token_a, user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, _user_b) = register_user(&server.base_url, "bob").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;
    let mut bob = WsClient::connect_ready(&server.addr, &token_b).await;

    alice
        .send(json!({ "event": "send-global", "text": "hi room" }))
        .await;

    for client in [&mut alice, &mut bob] {
        let event = client.expect_event("global-message").await;
        assert_eq!(event["text"], "hi room");
        assert_eq!(event["user"]["id"], user_a.as_str());
    }
}

#[tokio::test]
async fn whitespace_only_global_message_is_dropped() {
    let server = start_test_server().await;
    let (token_a, _user_a) = register_user(&server.base_url, "alice").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;

    alice
        .send(json!({ "event": "send-global", "text": "   \n " }))
        .await;
    alice.expect_silence("global-message", SILENCE).await;
    alice.expect_silence("error", SILENCE).await;
}

#[tokio::test]
async fn direct_message_reaches_both_parties_and_all_tabs() {
    let server = start_test_server().await;
    let (token_a, user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, user_b) = register_user(&server.base_url, "bob").await;
    let (token_c, _user_c) = register_user(&server.base_url, "carol").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;
    let mut bob_tab1 = WsClient::connect_ready(&server.addr, &token_b).await;
    let mut bob_tab2 = WsClient::connect_ready(&server.addr, &token_b).await;
    let mut carol = WsClient::connect_ready(&server.addr, &token_c).await;

    alice
        .send(json!({
            "event": "send-direct",
            "text": "hi bob",
            "recipientId": user_b,
        }))
        .await;

    for client in [&mut alice, &mut bob_tab1, &mut bob_tab2] {
        let event = client.expect_event("direct-message").await;
        assert_eq!(event["text"], "hi bob");
        assert_eq!(event["user"]["id"], user_a.as_str());
        assert_eq!(event["recipientId"], user_b.as_str());
        assert_eq!(event["isRead"], false);
    }

    // Bystanders see nothing
    carol.expect_silence("direct-message", SILENCE).await;
}

#[tokio::test]
async fn direct_message_to_unknown_recipient_errors_sender_only() {
    let server = start_test_server().await;
    let (token_a, _user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, _user_b) = register_user(&server.base_url, "bob").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;
    let mut bob = WsClient::connect_ready(&server.addr, &token_b).await;

    alice
        .send(json!({
            "event": "send-direct",
            "text": "hello?",
            "recipientId": "no-such-user",
        }))
        .await;

    let event = alice.expect_event("error").await;
    assert_eq!(event["message"], "Recipient not found");
    bob.expect_silence("error", SILENCE).await;
    bob.expect_silence("direct-message", SILENCE).await;
}

#[tokio::test]
async fn typing_relays_to_recipient_never_echoes() {
    let server = start_test_server().await;
    let (token_a, user_a) = register_user(&server.base_url, "alice").await;
    let (token_b, user_b) = register_user(&server.base_url, "bob").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;
    let mut bob = WsClient::connect_ready(&server.addr, &token_b).await;

    alice
        .send(json!({
            "event": "typing",
            "recipientId": user_b,
            "isTyping": true,
        }))
        .await;

    let event = bob.expect_event("user-typing").await;
    assert_eq!(event["userId"], user_a.as_str());
    assert_eq!(event["username"], "alice");
    assert_eq!(event["isTyping"], true);

    alice.expect_silence("user-typing", SILENCE).await;
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = start_test_server().await;
    let (token_a, _user_a) = register_user(&server.base_url, "alice").await;

    let mut alice = WsClient::connect_ready(&server.addr, &token_a).await;

    alice.send(json!({ "event": "join-room", "room": "x" })).await;
    alice.send(json!({ "not": "an event" })).await;

    // Connection survives and keeps working
    alice
        .send(json!({ "event": "send-global", "text": "still here" }))
        .await;
    let event = alice.expect_event("global-message").await;
    assert_eq!(event["text"], "still here");
}
