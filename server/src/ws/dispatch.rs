//! Inbound event dispatch: validate, persist, fan out.
//!
//! Every handler runs on an authenticated connection (the actor only starts
//! after the handshake resolves an identity). Validation failures are either
//! silent no-ops or a single `error` event to the originator — never a
//! broadcast.

use crate::chat::conversations::{self, ConversationSummary, Counterpart};
use crate::chat::store::{self, MessageScope};
use crate::db::{self, StoreError};
use crate::state::AppState;
use crate::ws::protocol::{
    ClientEvent, DirectMessagePayload, MessagePayload, SearchHit, ServerEvent,
};
use crate::ws::Connection;

/// Global history replay cap.
const HISTORY_LIMIT: usize = 100;

/// Parse one text frame and dispatch it. Malformed frames are dropped with
/// a debug log; clients get no parse feedback.
pub async fn handle_frame(state: &AppState, conn: &Connection, frame: &str) {
    match serde_json::from_str::<ClientEvent>(frame) {
        Ok(event) => handle_event(state, conn, event).await,
        Err(e) => {
            tracing::debug!(
                user_id = %conn.identity.id,
                error = %e,
                "Dropping malformed client frame"
            );
        }
    }
}

pub async fn handle_event(state: &AppState, conn: &Connection, event: ClientEvent) {
    match event {
        ClientEvent::SendGlobal { text } => send_global(state, conn, text).await,
        ClientEvent::SendDirect { text, recipient_id } => {
            send_direct(state, conn, text, recipient_id).await
        }
        ClientEvent::GetHistory => get_history(state, conn).await,
        ClientEvent::GetDirectMessages { counterpart_id } => {
            get_direct_messages(state, conn, counterpart_id).await
        }
        ClientEvent::StartConversation { recipient_id } => {
            start_conversation(state, conn, recipient_id).await
        }
        ClientEvent::Typing {
            recipient_id,
            is_typing,
        } => typing(state, conn, recipient_id, is_typing),
        ClientEvent::MarkRead {
            message_ids,
            sender_id,
        } => mark_read(state, conn, message_ids, sender_id).await,
        ClientEvent::SearchUsers { query } => search_users(state, conn, query).await,
        ClientEvent::GetConversations => get_conversations(state, conn).await,
    }
}

/// Store failures become one `error` event to the originator plus a local
/// log line; the shared process never dies on a bad query.
fn report_store_failure(conn: &Connection, err: StoreError) {
    tracing::error!(
        user_id = %conn.identity.id,
        error = %err,
        "Store operation failed"
    );
    conn.send(&ServerEvent::Error {
        message: "Internal server error".to_string(),
    });
}

async fn send_global(state: &AppState, conn: &Connection, text: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        // Whitespace-only: silent no-op, no error event
        return;
    }

    let author = conn.identity.clone();
    let result = db::with_store(&state.db, move |c| {
        store::save_message(c, &author, &text, &MessageScope::Global)
    })
    .await;

    match result {
        Ok(saved) => {
            state
                .registry
                .send_to_all(&ServerEvent::GlobalMessage(MessagePayload::from(saved)));
        }
        Err(e) => report_store_failure(conn, e),
    }
}

async fn send_direct(state: &AppState, conn: &Connection, text: String, recipient_id: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }

    let lookup_id = recipient_id.clone();
    let recipient = match db::with_store(&state.db, move |c| store::find_user(c, &lookup_id)).await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            conn.send(&ServerEvent::Error {
                message: "Recipient not found".to_string(),
            });
            return;
        }
        Err(e) => {
            report_store_failure(conn, e);
            return;
        }
    };

    let author = conn.identity.clone();
    let scope = MessageScope::Direct {
        recipient_id: recipient.id.clone(),
    };
    let saved = match db::with_store(&state.db, move |c| {
        store::save_message(c, &author, &text, &scope)
    })
    .await
    {
        Ok(saved) => saved,
        Err(e) => {
            report_store_failure(conn, e);
            return;
        }
    };

    // Identical payload to every connection of both parties; the sender's
    // own tabs update from the same event.
    let event = ServerEvent::DirectMessage(DirectMessagePayload::from(saved));
    state.registry.send_to_user(&conn.identity.id, &event);
    if recipient.id != conn.identity.id {
        state.registry.send_to_user(&recipient.id, &event);
    }
}

async fn get_history(state: &AppState, conn: &Connection) {
    match db::with_store(&state.db, |c| store::global_history(c, HISTORY_LIMIT)).await {
        Ok(messages) => conn.send(&ServerEvent::MessageHistory {
            messages: messages.into_iter().map(Into::into).collect(),
        }),
        Err(e) => report_store_failure(conn, e),
    }
}

async fn get_direct_messages(state: &AppState, conn: &Connection, counterpart_id: String) {
    let me = conn.identity.id.clone();
    let other = counterpart_id.clone();
    match db::with_store(&state.db, move |c| store::direct_history(c, &me, &other)).await {
        Ok(messages) => conn.send(&ServerEvent::DirectMessageHistory {
            counterpart_id,
            messages: messages.into_iter().map(Into::into).collect(),
        }),
        Err(e) => report_store_failure(conn, e),
    }
}

/// Nothing is persisted: the synthetic pair lets the client open an empty
/// thread before any message exists.
async fn start_conversation(state: &AppState, conn: &Connection, recipient_id: String) {
    let lookup_id = recipient_id.clone();
    let recipient = match db::with_store(&state.db, move |c| store::find_user(c, &lookup_id)).await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            conn.send(&ServerEvent::Error {
                message: "User not found".to_string(),
            });
            return;
        }
        Err(e) => {
            report_store_failure(conn, e);
            return;
        }
    };

    let is_online = state.registry.is_online(&recipient.id);
    conn.send(&ServerEvent::NewConversation(ConversationSummary {
        user: Counterpart {
            id: recipient.id.clone(),
            username: recipient.username.clone(),
            is_online,
        },
        latest_message: None,
    }));
    conn.send(&ServerEvent::ConversationStarted {
        user_id: recipient.id,
        username: recipient.username,
        is_online,
    });
}

/// Pure relay: nothing persisted, the 2-second expiry lives client-side,
/// and the signal is never echoed back to the sender.
fn typing(state: &AppState, conn: &Connection, recipient_id: String, is_typing: bool) {
    if recipient_id == conn.identity.id {
        return;
    }
    state.registry.send_to_user(
        &recipient_id,
        &ServerEvent::UserTyping {
            user_id: conn.identity.id.clone(),
            username: conn.identity.username.clone(),
            is_typing,
        },
    );
}

async fn mark_read(
    state: &AppState,
    conn: &Connection,
    message_ids: Vec<String>,
    sender_id: String,
) {
    let ids = message_ids.clone();
    match db::with_store(&state.db, move |c| store::mark_read(c, &ids)).await {
        Ok(transitioned) => {
            tracing::debug!(
                reader_id = %conn.identity.id,
                requested = message_ids.len(),
                transitioned,
                "Marked messages read"
            );
            // Repeat calls still notify: the store transition is one-way, so
            // the author's UI reconciles the same ids idempotently.
            state.registry.send_to_user(
                &sender_id,
                &ServerEvent::MessagesRead {
                    message_ids,
                    reader_id: conn.identity.id.clone(),
                },
            );
        }
        Err(e) => report_store_failure(conn, e),
    }
}

async fn search_users(state: &AppState, conn: &Connection, query: String) {
    let me = conn.identity.id.clone();
    match db::with_store(&state.db, move |c| store::search_users(c, &query, &me)).await {
        Ok(matches) => {
            let users = matches
                .into_iter()
                .map(|u| SearchHit {
                    is_online: state.registry.is_online(&u.id),
                    id: u.id,
                    username: u.username,
                })
                .collect();
            conn.send(&ServerEvent::SearchResults { users });
        }
        Err(e) => report_store_failure(conn, e),
    }
}

async fn get_conversations(state: &AppState, conn: &Connection) {
    let me = conn.identity.id.clone();
    let online = state.registry.online_id_set();
    match db::with_store(&state.db, move |c| {
        conversations::conversations_for(c, &me, &online)
    })
    .await
    {
        Ok(conversations) => conn.send(&ServerEvent::Conversations { conversations }),
        Err(e) => report_store_failure(conn, e),
    }
}
