//! WebSocket transport: upgrade handling, wire protocol, outbound queues
//! and the router loop that owns all rooms

pub mod handler;
pub mod outbox;
pub mod protocol;
pub mod router;
