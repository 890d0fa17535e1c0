//! Tank movement and movement constraints

use super::arena::{ARENA_H, ARENA_W, TANK_H, TANK_W};
use super::collision::{rect_overlap, Rect};
use super::TankInput;

/// Tank movement constants
#[derive(Debug, Clone, Copy)]
pub struct TankStats {
    /// Distance travelled per step
    pub speed: f32,
    /// Degrees turned per step
    pub turn_rate: f32,
    /// Collision body width (narrower than the sprite)
    pub body_w: f32,
    /// Collision body height
    pub body_h: f32,
    /// Minimum distance of the tank center from the side and bottom edges.
    /// Slightly above the sprite's half-diagonal so rotation never clips.
    pub safe_margin: f32,
    /// Minimum distance of the tank center from the top edge (scoreboard band)
    pub top_safe_margin: f32,
}

pub const TANK_STATS: TankStats = TankStats {
    speed: 4.0,
    turn_rate: 2.0,
    body_w: 100.0,
    body_h: 70.0,
    safe_margin: 105.0,
    top_safe_margin: 185.0,
};

/// Physics system for turning and moving tanks
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply left/right input to a heading; both pressed cancel out
    pub fn turn(angle: f32, input: &TankInput, stats: &TankStats) -> f32 {
        let mut angle = angle;
        if input.left {
            angle = (angle - stats.turn_rate).rem_euclid(360.0);
        }
        if input.right {
            angle = (angle + stats.turn_rate).rem_euclid(360.0);
        }
        angle
    }

    /// Candidate sprite origin after one step of forward/backward travel.
    /// Returns `None` when the input requests no movement. The candidate
    /// center is clamped inside the safe margins.
    pub fn propose_move(
        x: f32,
        y: f32,
        angle: f32,
        input: &TankInput,
        stats: &TankStats,
    ) -> Option<(f32, f32)> {
        if !input.forward && !input.backward {
            return None;
        }

        // Forward wins if both are held
        let dir = if input.forward { 1.0 } else { -1.0 };
        let rad = angle.to_radians();
        let nx = x + rad.cos() * stats.speed * dir;
        let ny = y + rad.sin() * stats.speed * dir;

        let cx = (nx + TANK_W / 2.0).clamp(stats.safe_margin, ARENA_W - stats.safe_margin);
        let cy = (ny + TANK_H / 2.0).clamp(stats.top_safe_margin, ARENA_H - stats.safe_margin);

        Some((cx - TANK_W / 2.0, cy - TANK_H / 2.0))
    }

    /// Collision body for a tank whose sprite origin is (`x`, `y`)
    pub fn body_rect(x: f32, y: f32, stats: &TankStats) -> Rect {
        Rect::centered(x + TANK_W / 2.0, y + TANK_H / 2.0, stats.body_w, stats.body_h)
    }

    /// True if `body` overlaps any wall or any of the other tanks' bodies
    pub fn is_blocked<'a>(
        body: &Rect,
        walls: &[Rect],
        others: impl IntoIterator<Item = &'a Rect>,
    ) -> bool {
        walls.iter().any(|w| rect_overlap(body, w))
            || others.into_iter().any(|o| rect_overlap(body, o))
    }
}
