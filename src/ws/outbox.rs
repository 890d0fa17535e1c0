//! Outbound delivery: connection ids and the per-connection send queues

use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

use super::protocol::ServerMsg;

/// Identity of one WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Best-effort delivery of server messages to connections.
/// Sending to a connection that is gone is silently dropped.
pub trait Outbox: Send + Sync {
    fn send(&self, conn: ConnId, msg: &ServerMsg);

    fn broadcast(&self, conns: &[ConnId], msg: &ServerMsg) {
        for conn in conns {
            self.send(*conn, msg);
        }
    }
}

/// Live connections and their outbound queues
#[derive(Default)]
pub struct ConnectionDirectory {
    senders: DashMap<ConnId, mpsc::UnboundedSender<String>>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a queue for `conn`; the socket writer drains the receiver
    pub fn register(&self, conn: ConnId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(conn, tx);
        rx
    }

    pub fn unregister(&self, conn: ConnId) {
        self.senders.remove(&conn);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn deliver(&self, conn: ConnId, text: String) {
        if let Some(tx) = self.senders.get(&conn) {
            let _ = tx.send(text);
        }
    }
}

fn encode(msg: &ServerMsg) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "Failed to encode server message");
            None
        }
    }
}

impl Outbox for ConnectionDirectory {
    fn send(&self, conn: ConnId, msg: &ServerMsg) {
        if let Some(text) = encode(msg) {
            self.deliver(conn, text);
        }
    }

    /// Encodes once for all recipients
    fn broadcast(&self, conns: &[ConnId], msg: &ServerMsg) {
        let Some(text) = encode(msg) else {
            return;
        };
        for conn in conns {
            self.deliver(*conn, text.clone());
        }
    }
}
