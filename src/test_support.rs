//! Shared helpers for unit tests

use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ws::outbox::{ConnId, Outbox};
use crate::ws::protocol::ServerMsg;
use crate::ws::router::LoopEvent;

/// Router loop channel; tests usually keep the receiver only to hold it open
pub fn loop_channel() -> (
    mpsc::UnboundedSender<LoopEvent>,
    mpsc::UnboundedReceiver<LoopEvent>,
) {
    mpsc::unbounded_channel()
}

/// Outbox that records every delivery as JSON
#[derive(Default)]
pub struct RecordingOutbox {
    sent: Mutex<Vec<(ConnId, Value)>>,
}

impl RecordingOutbox {
    /// Everything delivered to `conn`, oldest first
    pub fn to(&self, conn: ConnId) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == conn)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Just the `type` tags delivered to `conn`
    pub fn types_to(&self, conn: ConnId) -> Vec<String> {
        self.to(conn)
            .iter()
            .filter_map(|msg| msg["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Outbox for RecordingOutbox {
    fn send(&self, conn: ConnId, msg: &ServerMsg) {
        let value = serde_json::to_value(msg).expect("server messages serialize");
        self.sent.lock().unwrap().push((conn, value));
    }
}
