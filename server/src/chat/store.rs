//! Message store: append-only chat log plus user lookups.
//!
//! All functions here are synchronous rusqlite queries. Callers run them
//! through `db::with_store` on the blocking pool; a slow query stalls only
//! the handler awaiting it.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use crate::db::models::{User, UserIdentity};

/// Scope of a stored chat message: the shared room or a two-party thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    Global,
    Direct { recipient_id: String },
}

impl MessageScope {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Direct { .. } => "direct",
        }
    }

    fn recipient_id(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Direct { recipient_id } => Some(recipient_id),
        }
    }
}

/// A message joined with its author's identity, ready for fan-out or replay.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub author: UserIdentity,
    pub recipient_id: Option<String>,
    pub is_read: bool,
    pub read_at: Option<String>,
}

/// Millisecond-precision RFC3339 UTC timestamp. The canonical ordering key
/// for history replay; ties are broken by the time-ordered message id.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Persist a message and return it joined with the author identity.
pub fn save_message(
    conn: &Connection,
    author: &UserIdentity,
    text: &str,
    scope: &MessageScope,
) -> rusqlite::Result<StoredMessage> {
    let id = Uuid::now_v7().to_string();
    let created_at = now_rfc3339();

    conn.execute(
        "INSERT INTO messages (id, text, author_id, scope, recipient_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, text, author.id, scope.as_str(), scope.recipient_id(), created_at],
    )?;

    Ok(StoredMessage {
        id,
        text: text.to_string(),
        created_at,
        author: author.clone(),
        recipient_id: scope.recipient_id().map(str::to_string),
        is_read: false,
        read_at: None,
    })
}

pub(crate) const MESSAGE_COLUMNS: &str =
    "m.id, m.text, m.created_at, m.recipient_id, m.is_read, m.read_at,
       u.id, u.username, u.message_color";

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        text: row.get(1)?,
        created_at: row.get(2)?,
        recipient_id: row.get(3)?,
        is_read: row.get(4)?,
        read_at: row.get(5)?,
        author: UserIdentity {
            id: row.get(6)?,
            username: row.get(7)?,
            message_color: row.get(8)?,
        },
    })
}

/// The `limit` most recent global messages, returned in ascending
/// creation order for replay.
pub fn global_history(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<StoredMessage>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM (SELECT * FROM messages WHERE scope = 'global'
               ORDER BY created_at DESC, id DESC LIMIT ?1) m
         JOIN users u ON u.id = m.author_id
         ORDER BY m.created_at ASC, m.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([limit as i64], row_to_message)?;
    rows.collect()
}

/// All direct messages between two users, both directions, ascending.
pub fn direct_history(
    conn: &Connection,
    user_id: &str,
    counterpart_id: &str,
) -> rusqlite::Result<Vec<StoredMessage>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         JOIN users u ON u.id = m.author_id
         WHERE m.scope = 'direct'
           AND ((m.author_id = ?1 AND m.recipient_id = ?2)
             OR (m.author_id = ?2 AND m.recipient_id = ?1))
         ORDER BY m.created_at ASC, m.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id, counterpart_id], row_to_message)?;
    rows.collect()
}

/// Mark messages read. Only rows still unread transition; already-read and
/// nonexistent ids are no-ops, so the call is idempotent. Returns the number
/// of rows that actually transitioned.
pub fn mark_read(conn: &Connection, ids: &[String]) -> rusqlite::Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let now = now_rfc3339();
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE messages SET is_read = 1, read_at = ?
         WHERE id IN ({placeholders}) AND is_read = 0"
    );

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(ids.len() + 1);
    params.push(&now);
    for id in ids {
        params.push(id);
    }

    conn.execute(&sql, params.as_slice())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        message_color: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, message_color, created_at, updated_at";

pub fn find_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        row_to_user,
    )
    .optional()
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        row_to_user,
    )
    .optional()
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        [email],
        row_to_user,
    )
    .optional()
}

/// Case-insensitive partial username match, excluding the requester.
pub fn search_users(
    conn: &Connection,
    query: &str,
    exclude_id: &str,
) -> rusqlite::Result<Vec<UserIdentity>> {
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(
        "SELECT id, username, message_color FROM users
         WHERE username LIKE ?1 AND id != ?2
         ORDER BY username ASC",
    )?;
    let rows = stmt.query_map([pattern.as_str(), exclude_id], |row| {
        Ok(UserIdentity {
            id: row.get(0)?,
            username: row.get(1)?,
            message_color: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Resolve a set of user ids to identities. Ids that no longer resolve are
/// dropped rather than erroring — callers tolerate stale references.
pub fn identities_by_ids(
    conn: &Connection,
    ids: &[String],
) -> rusqlite::Result<Vec<UserIdentity>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, username, message_color FROM users
         WHERE id IN ({placeholders}) ORDER BY username ASC"
    );
    let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok(UserIdentity {
            id: row.get(0)?,
            username: row.get(1)?,
            message_color: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Insert a new user row. Uniqueness of username/email is checked by the
/// caller first so it can report which field conflicted.
pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> rusqlite::Result<User> {
    let id = Uuid::now_v7().to_string();
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, username, email, password_hash, now, now],
    )?;

    find_user(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Update a user's message color and return the fresh row.
pub fn update_message_color(
    conn: &Connection,
    user_id: &str,
    color: &str,
) -> rusqlite::Result<Option<User>> {
    conn.execute(
        "UPDATE users SET message_color = ?2, updated_at = ?3 WHERE id = ?1",
        rusqlite::params![user_id, color, now_rfc3339()],
    )?;
    find_user(conn, user_id)
}
