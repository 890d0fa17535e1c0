//! Arena dimensions, player slots, spawn points and the wall layout

use std::fmt;

use serde::{Deserialize, Serialize};

use super::collision::Rect;

pub const ARENA_W: f32 = 1920.0;
pub const ARENA_H: f32 = 1080.0;

/// Full tank sprite size
pub const TANK_W: f32 = 173.0;
pub const TANK_H: f32 = 94.0;

/// Edge length of each square wall block
pub const WALL_SIZE: f32 = 120.0;
/// Distance of the outer wall blocks from the arena edge
const WALL_INSET: f32 = 140.0;

/// Horizontal distance of a spawn from the side edges
const SPAWN_INSET_X: f32 = 120.0;
/// Vertical distance of a spawn from the top/bottom edges
const SPAWN_INSET_Y: f32 = 200.0;

/// A player slot. Ordering is the stable order used for simulation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    pub const ALL: [Letter; 4] = [Letter::A, Letter::B, Letter::C, Letter::D];

    /// The first `player_count` letters, clamped to the four available slots
    pub fn configured(player_count: usize) -> &'static [Letter] {
        &Self::ALL[..player_count.min(Self::ALL.len())]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spawn pose: sprite top-left corner plus heading in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spawn {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

/// Fixed per-letter spawn, each corner facing the middle of the arena
pub fn spawn_for(letter: Letter) -> Spawn {
    let left = SPAWN_INSET_X;
    let right = ARENA_W - SPAWN_INSET_X - TANK_W;
    let top = SPAWN_INSET_Y;
    let bottom = ARENA_H - SPAWN_INSET_Y - TANK_H;

    match letter {
        Letter::A => Spawn { x: left, y: top, angle: 45.0 },
        Letter::B => Spawn { x: right, y: top, angle: 135.0 },
        Letter::C => Spawn { x: left, y: bottom, angle: 315.0 },
        Letter::D => Spawn { x: right, y: bottom, angle: 225.0 },
    }
}

/// The five wall blocks: dead center plus one between each pair of
/// orthogonally adjacent spawns. The layout does not depend on player count.
pub fn generate_walls() -> Vec<Rect> {
    let mid_x = ARENA_W / 2.0 - WALL_SIZE / 2.0;
    let mid_y = ARENA_H / 2.0 - WALL_SIZE / 2.0;

    vec![
        // Dead center
        Rect::new(mid_x, mid_y, WALL_SIZE, WALL_SIZE),
        // Between A and B
        Rect::new(mid_x, WALL_INSET, WALL_SIZE, WALL_SIZE),
        // Between C and D
        Rect::new(mid_x, ARENA_H - WALL_INSET - WALL_SIZE, WALL_SIZE, WALL_SIZE),
        // Between A and C
        Rect::new(WALL_INSET, mid_y, WALL_SIZE, WALL_SIZE),
        // Between B and D
        Rect::new(ARENA_W - WALL_INSET - WALL_SIZE, mid_y, WALL_SIZE, WALL_SIZE),
    ]
}
