//! Registry of live rooms keyed by their numeric code

use std::collections::HashMap;

use rand::Rng;
use tracing::info;

use crate::ws::outbox::ConnId;

use super::error::RoomError;
use super::state::Room;
use super::timers::TimerSender;
use super::RoomSettings;

/// Valid player counts for a room
pub const PLAYER_COUNTS: std::ops::RangeInclusive<u8> = 2..=4;
/// Used when `create_room` omits a player count
pub const DEFAULT_PLAYER_COUNT: u8 = 2;

/// Owned by the router task; never shared across threads
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    settings: RoomSettings,
    events: TimerSender,
}

impl RoomRegistry {
    pub fn new(settings: RoomSettings, events: TimerSender) -> Self {
        Self {
            rooms: HashMap::new(),
            settings,
            events,
        }
    }

    /// Allocate a room with a fresh code and `host` as its display
    pub fn create(
        &mut self,
        player_count: Option<u8>,
        host: ConnId,
    ) -> Result<&mut Room, RoomError> {
        let player_count = player_count.unwrap_or(DEFAULT_PLAYER_COUNT);
        if !PLAYER_COUNTS.contains(&player_count) {
            return Err(RoomError::InvalidPlayerCount(player_count));
        }

        let code = self.allocate_code();
        let room = Room::new(
            code.clone(),
            player_count as usize,
            host,
            self.settings,
            self.events.clone(),
        );

        info!(room = %code, player_count, host = %host, "Created new room");
        Ok(self.rooms.entry(code).or_insert(room))
    }

    /// Six digit code not used by any live room
    fn allocate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code = rng.gen_range(100_000..1_000_000u32).to_string();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Dropping the room cancels all of its timers
    pub fn remove(&mut self, code: &str) -> Option<Room> {
        self.rooms.remove(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
