//! Application state shared across routes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::ws::outbox::ConnectionDirectory;
use crate::ws::router::{LoopEvent, ProtocolRouter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Outbound queues for every open socket
    pub connections: Arc<ConnectionDirectory>,
    /// Inbound side of the router loop
    pub events: mpsc::UnboundedSender<LoopEvent>,
    /// Room count published by the router after each event
    pub active_rooms: Arc<AtomicUsize>,
}

impl AppState {
    /// Build the shared state together with the router that serves it.
    /// The caller is expected to spawn [`ProtocolRouter::run`].
    pub fn new(config: Config) -> (Self, ProtocolRouter) {
        let config = Arc::new(config);
        let connections = Arc::new(ConnectionDirectory::new());
        let active_rooms = Arc::new(AtomicUsize::new(0));
        let (events, events_rx) = mpsc::unbounded_channel();

        let registry = RoomRegistry::new(config.room_settings(), events.clone());
        let router = ProtocolRouter::new(
            registry,
            connections.clone(),
            active_rooms.clone(),
            events_rx,
        );

        let state = Self {
            config,
            connections,
            events,
            active_rooms,
        };
        (state, router)
    }

    pub fn active_rooms(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }
}
