//! Presence registry: active connections per user.
//!
//! This is the one shared structure mutated from many connection handlers.
//! All mutations go through `register`/`unregister`, and the came-online /
//! went-offline decisions are made atomically with the mutation itself, so
//! two near-simultaneous disconnects cannot both skip the offline broadcast.

use std::collections::HashSet;

use dashmap::DashMap;
use uuid::Uuid;

use crate::ws::protocol::{self, ServerEvent};
use crate::ws::ConnectionSender;

struct RegisteredConnection {
    conn_id: Uuid,
    tx: ConnectionSender,
}

/// Maps user id to that user's active connections. A user may have zero,
/// one, or many (multiple tabs); online means the set is non-empty.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: DashMap<String, Vec<RegisteredConnection>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Returns true iff the user transitioned
    /// offline→online (zero to one active connections). The check and the
    /// insert happen under one map guard, so two racing connects cannot
    /// both observe an empty set.
    pub fn register(&self, user_id: &str, conn_id: Uuid, tx: ConnectionSender) -> bool {
        let mut conns = self.connections.entry(user_id.to_string()).or_default();
        let came_online = conns.is_empty();
        conns.push(RegisteredConnection { conn_id, tx });
        came_online
    }

    /// Remove a connection. Returns true iff it was the user's last active
    /// one — the condition for the offline broadcast. The emptiness check
    /// is re-validated by `remove_if`, so a reconnect racing the removal
    /// suppresses the offline transition.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let emptied = match self.connections.get_mut(user_id) {
            Some(mut conns) => {
                conns.retain(|c| c.conn_id != conn_id && !c.tx.is_closed());
                conns.is_empty()
            }
            None => false,
        };

        emptied
            && self
                .connections
                .remove_if(user_id, |_, conns| conns.is_empty())
                .is_some()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connections
            .get(user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    /// Point-in-time snapshot of online user ids.
    pub fn online_user_ids(&self) -> Vec<String> {
        self.connections
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn online_id_set(&self) -> HashSet<String> {
        self.online_user_ids().into_iter().collect()
    }

    /// Deliver an event to every active connection.
    pub fn send_to_all(&self, event: &ServerEvent) {
        let Some(frame) = protocol::encode(event) else {
            return;
        };
        for entry in self.connections.iter() {
            for conn in entry.value() {
                let _ = conn.tx.send(frame.clone());
            }
        }
    }

    /// Deliver an event to all of one user's connections (multi-tab
    /// consistency). A no-op when the user has none — persistence never
    /// depends on deliverability.
    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        let Some(frame) = protocol::encode(event) else {
            return;
        };
        if let Some(conns) = self.connections.get(user_id) {
            for conn in conns.iter() {
                let _ = conn.tx.send(frame.clone());
            }
        }
    }
}
