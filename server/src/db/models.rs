//! Database row types and the identity projection shared with the wire
//! protocol.

use serde::{Deserialize, Serialize};

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub message_color: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id.clone(),
            username: self.username.clone(),
            message_color: self.message_color.clone(),
        }
    }
}

/// The public identity attached to a connection once authenticated.
/// Immutable for the connection's lifetime; online status is a projection
/// held by the presence registry, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub message_color: String,
}
