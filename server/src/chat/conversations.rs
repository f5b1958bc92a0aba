//! Conversation summaries derived from the message store.
//!
//! A conversation is not stored anywhere: it is the set of direct-message
//! counterparts a user has exchanged messages with, each paired with the
//! most recent message between the two. Recomputed per query; the client's
//! cached copy is advisory and reconciled by re-fetch.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::chat::store::{self, StoredMessage};

/// The other party of a conversation, with their presence projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: String,
    pub username: String,
    pub is_online: bool,
}

/// Preview of the most recent message between the two parties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestMessage {
    pub text: String,
    pub created_at: String,
    pub is_from_self: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user: Counterpart,
    pub latest_message: Option<LatestMessage>,
}

/// All conversations for a user: distinct counterparts from both message
/// directions, each resolved to a live user row (stale ids are dropped) and
/// paired with the latest message of the thread. The list order is
/// unspecified; sorting by recency is the client's concern.
pub fn conversations_for(
    conn: &Connection,
    user_id: &str,
    online: &HashSet<String>,
) -> rusqlite::Result<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT CASE WHEN author_id = ?1 THEN recipient_id ELSE author_id END
         FROM messages
         WHERE scope = 'direct' AND (author_id = ?1 OR recipient_id = ?1)",
    )?;
    let counterparts: Vec<String> = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut summaries = Vec::with_capacity(counterparts.len());
    for counterpart_id in counterparts {
        let Some(user) = store::find_user(conn, &counterpart_id)? else {
            continue;
        };

        let latest = latest_between(conn, user_id, &counterpart_id)?;
        summaries.push(ConversationSummary {
            user: Counterpart {
                is_online: online.contains(&user.id),
                id: user.id,
                username: user.username,
            },
            latest_message: latest.map(|m| LatestMessage {
                text: m.text,
                created_at: m.created_at,
                is_from_self: m.author.id == user_id,
            }),
        });
    }

    Ok(summaries)
}

/// The single most recent direct message between a pair, by creation time
/// with the time-ordered id as tiebreaker.
fn latest_between(
    conn: &Connection,
    user_id: &str,
    counterpart_id: &str,
) -> rusqlite::Result<Option<StoredMessage>> {
    let sql = format!(
        "SELECT {}
         FROM messages m
         JOIN users u ON u.id = m.author_id
         WHERE m.scope = 'direct'
           AND ((m.author_id = ?1 AND m.recipient_id = ?2)
             OR (m.author_id = ?2 AND m.recipient_id = ?1))
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT 1",
        store::MESSAGE_COLUMNS
    );
    conn.query_row(&sql, [user_id, counterpart_id], store::row_to_message)
        .optional()
}
