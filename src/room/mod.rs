//! Rooms: per-match state machines, their timers and the code registry

pub mod error;
pub mod registry;
pub mod state;
pub mod timers;

pub use error::RoomError;
pub use registry::RoomRegistry;
pub use state::{RoomState, TimerOutcome};
pub use timers::TimerFired;

use std::time::Duration;

use crate::config::DEFAULT_INACTIVITY_SECS;
use crate::util::time::{tick_duration, COUNTDOWN_STEP};

/// Timing parameters shared by every room
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    /// First value broadcast by the countdown
    pub countdown_from: u8,
    /// Delay between countdown values
    pub countdown_period: Duration,
    /// Fixed simulation step
    pub tick_period: Duration,
    /// Idle window for rooms that are not playing
    pub inactivity_timeout: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            countdown_from: 7,
            countdown_period: COUNTDOWN_STEP,
            tick_period: tick_duration(),
            inactivity_timeout: Duration::from_secs(DEFAULT_INACTIVITY_SECS),
        }
    }
}
