//! Errors surfaced to the originating connection as `error{message}`

use crate::game::Letter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    #[error("Room is full")]
    Full,

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Not all players have joined yet")]
    PlayersNotReady,

    #[error("{0}")]
    InvalidTransition(&'static str),

    #[error("Player count must be 2, 3 or 4 (got {0})")]
    InvalidPlayerCount(u8),

    #[error("Player slot {0} is not part of this room")]
    InvalidSlot(Letter),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(RoomError::Full.to_string(), "Room is full");
        assert_eq!(RoomError::NotFound.to_string(), "Room not found");
        assert_eq!(
            RoomError::InvalidSlot(Letter::D).to_string(),
            "Player slot D is not part of this room"
        );
        assert_eq!(
            RoomError::InvalidTransition("Game already in progress").to_string(),
            "Game already in progress"
        );
    }
}
