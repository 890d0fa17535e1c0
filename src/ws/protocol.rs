//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{Letter, Rect, TankInput, Winner};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Host display asks for a new room
    CreateRoom {
        /// Number of tanks (2-4); defaults to 2 when absent
        #[serde(default, rename = "playerCount")]
        player_count: Option<u8>,
    },

    /// Host display (re)binds to an existing room
    Observe { code: String },

    /// Reserve the next free slot in a waiting room
    ClaimSlot { code: String },

    /// Bind this connection as the controller for a slot
    Attach { code: String, player: Letter },

    /// Host is about to drop its connection for a page transition
    HostNavigating {},

    /// Host asks to begin the countdown
    StartGame {},

    /// Latest controller state for this connection's tank
    TankInput {
        #[serde(default)]
        input: TankInput,
    },

    /// Back to a fresh countdown from any state
    RestartGame {},
}

impl ClientMsg {
    /// Decode a text frame. Anything that fails to parse is the caller's to drop.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Room allocated for the requesting host
    RoomCreated {
        code: String,
        #[serde(rename = "playerCount")]
        player_count: usize,
    },

    /// Request rejected
    Error { message: String },

    /// Slot reserved for the requesting connection
    SlotClaimed { player: Letter },

    /// Sent to the host whenever a slot is reserved
    PlayerJoined {
        count: usize,
        player: Letter,
        total: usize,
    },

    /// Controller bound to its slot
    Attached { player: Letter },

    /// Match is live
    GameStart {
        walls: Vec<Rect>,
        #[serde(rename = "playerCount")]
        player_count: usize,
    },

    /// Countdown sequence begins
    CountdownStart,

    /// One countdown value
    Countdown { value: u8 },

    /// Per-step state
    GameState {
        tanks: BTreeMap<Letter, TankSnapshot>,
        bullets: Vec<BulletSnapshot>,
        #[serde(rename = "hitEvents")]
        hit_events: Vec<HitEvent>,
    },

    /// Sent only to the controller whose tank was destroyed
    Eliminated,

    /// Match decided
    GameOver { winner: Winner },

    /// A bound connection went away
    PlayerDisconnected { who: String },

    /// Room torn down after sitting idle
    RoomExpired,
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Tank state in a snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TankSnapshot {
    /// Sprite top-left X, rounded
    pub x: i32,
    /// Sprite top-left Y, rounded
    pub y: i32,
    /// Heading in degrees, rounded to a tenth
    pub angle: f32,
    pub hits: u8,
    pub reloading: bool,
    pub hit_flash: bool,
    pub eliminated: bool,
}

/// Bullet state in a snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletSnapshot {
    pub id: u64,
    pub owner: Letter,
    pub x: i32,
    pub y: i32,
    pub wall_hit: bool,
}

/// A hit registered during a step
#[derive(Debug, Clone, Serialize)]
pub struct HitEvent {
    pub tank: Letter,
    pub shooter: Letter,
    /// Target's hit count after this hit
    pub hits: u8,
}
