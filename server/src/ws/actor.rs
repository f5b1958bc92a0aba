use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::store;
use crate::db;
use crate::db::models::UserIdentity;
use crate::state::AppState;
use crate::ws::dispatch;
use crate::ws::protocol::{PresenceStatus, ServerEvent};
use crate::ws::Connection;

/// Ping interval: server sends a WebSocket ping every 30 seconds so abrupt
/// disconnects surface instead of leaking registry entries.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if no pong arrives within 10 seconds after a ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the socket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader loop: processes incoming frames in arrival order
///
/// The mpsc channel lets any part of the system push events to this client
/// by cloning the sender.
pub async fn run_connection(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let conn = Connection::new(identity, tx.clone());

    // Presence: only the zero-to-one transition is announced. A second tab
    // for an already-online user stays silent.
    let came_online = state.registry.register(&conn.identity.id, conn.id, tx.clone());
    if came_online {
        state.registry.send_to_all(&ServerEvent::PresenceChanged {
            user_id: conn.identity.id.clone(),
            status: PresenceStatus::Online,
        });
    }

    // The connecting client gets a full point-in-time snapshot of who is
    // online; everyone else already heard the presence broadcast.
    send_online_snapshot(&state, &conn).await;

    tracing::info!(
        user_id = %conn.identity.id,
        username = %conn.identity.username,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    read_loop(ws_receiver, &state, &conn, &tx, &pong_tx).await;

    writer_handle.abort();
    ping_handle.abort();

    // Disconnect removes future deliverability only; any store write a
    // handler started has already completed, because the reader does not
    // run handlers concurrently with its own teardown.
    let went_offline = state.registry.unregister(&conn.identity.id, conn.id);
    if went_offline {
        state.registry.send_to_all(&ServerEvent::PresenceChanged {
            user_id: conn.identity.id.clone(),
            status: PresenceStatus::Offline,
        });
    }

    tracing::info!(
        user_id = %conn.identity.id,
        username = %conn.identity.username,
        "WebSocket actor stopped"
    );
}

/// Reader loop: frames for this connection are handled strictly in arrival
/// order — the next frame is not read until the current handler returns.
async fn read_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    state: &AppState,
    conn: &Connection,
    tx: &mpsc::UnboundedSender<Message>,
    pong_tx: &mpsc::UnboundedSender<()>,
) {
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    dispatch::handle_frame(state, conn, text.as_str()).await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %conn.identity.id,
                        "Ignoring binary frame on JSON protocol"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %conn.identity.id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %conn.identity.id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %conn.identity.id, "WebSocket stream ended");
                break;
            }
        }
    }
}

/// Full snapshot of online user identities for the connecting client.
/// Registry ids that no longer resolve in the store are dropped.
async fn send_online_snapshot(state: &AppState, conn: &Connection) {
    let ids = state.registry.online_user_ids();
    match db::with_store(&state.db, move |c| store::identities_by_ids(c, &ids)).await {
        Ok(users) => conn.send(&ServerEvent::OnlineUsers { users }),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load online-user snapshot");
        }
    }
}

/// Writer task: forwards frames from the mpsc channel to the WebSocket sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
