pub mod actor;
pub mod dispatch;
pub mod handler;
pub mod protocol;
pub mod registry;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::models::UserIdentity;
use crate::ws::protocol::ServerEvent;

/// Sender half of a connection's outbound channel. Any part of the system
/// can clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// An authenticated connection. The identity is bound exactly once, at
/// authentication, before the connection actor starts — no dispatched event
/// can ever observe a connection without one.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub identity: UserIdentity,
    tx: ConnectionSender,
}

impl Connection {
    pub fn new(identity: UserIdentity, tx: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            identity,
            tx,
        }
    }

    /// Push a server event to this connection only.
    pub fn send(&self, event: &ServerEvent) {
        if let Some(frame) = protocol::encode(event) {
            let _ = self.tx.send(frame);
        }
    }
}
