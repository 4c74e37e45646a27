use parlor_common::ServerToClient;
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::Tx;

/// Live binding of a registered username to one connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn_id: Uuid,
    pub tx: Tx,
}

/// Who is reachable right now. Never persisted.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionHandle>,
}

impl SessionRegistry {
    /// Last writer wins: an existing session under the same name is
    /// replaced and returned, nobody is told.
    pub fn register(&mut self, username: &str, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.insert(username.to_owned(), handle)
    }

    pub fn lookup(&self, username: &str) -> Option<&SessionHandle> {
        self.sessions.get(username)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    /// Removes the mapping only if it still belongs to `conn_id`, so a
    /// connection that lost its name to a newer one cannot unregister it.
    pub fn remove(&mut self, username: &str, conn_id: Uuid) -> bool {
        match self.sessions.get(username) {
            Some(h) if h.conn_id == conn_id => {
                self.sessions.remove(username);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Queue `msg` for `username` if online. Returns whether it was queued.
    pub fn send(&self, username: &str, msg: ServerToClient) -> bool {
        match self.sessions.get(username) {
            Some(h) => deliver(&h.tx, msg, username),
            None => false,
        }
    }

    pub fn disconnect_all(&mut self) {
        self.sessions.clear();
    }
}

/// Non-blocking enqueue on a connection's outbound queue. A full queue
/// drops the envelope for that peer only.
pub fn deliver(tx: &Tx, msg: ServerToClient, who: &str) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("outbound queue full for {who}, dropping envelope");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("connection of {who} already closed");
            false
        }
    }
}
