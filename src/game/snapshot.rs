//! Snapshot building for network transmission

use std::collections::BTreeMap;
use std::time::Instant;

use crate::ws::protocol::{BulletSnapshot, HitEvent, ServerMsg, TankSnapshot};

use super::arena::Letter;
use super::combat::Bullet;
use super::simulation::Tank;

/// Builds the per-step `game_state` message
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Positions are rounded to whole units and headings to a tenth of a
    /// degree; hit flash is resolved against `now`.
    pub fn build(
        tanks: &BTreeMap<Letter, Tank>,
        bullets: &[Bullet],
        hit_events: Vec<HitEvent>,
        now: Instant,
    ) -> ServerMsg {
        let tanks = tanks
            .iter()
            .map(|(letter, t)| {
                let snapshot = TankSnapshot {
                    x: t.x.round() as i32,
                    y: t.y.round() as i32,
                    angle: round_tenth(t.angle),
                    hits: t.hits,
                    reloading: t.reloading,
                    hit_flash: t.hit_flash_until.is_some_and(|until| now < until),
                    eliminated: t.eliminated,
                };
                (*letter, snapshot)
            })
            .collect();

        let bullets = bullets
            .iter()
            .map(|b| BulletSnapshot {
                id: b.id,
                owner: b.owner,
                x: b.x.round() as i32,
                y: b.y.round() as i32,
                wall_hit: b.wall_hit,
            })
            .collect();

        ServerMsg::GameState {
            tanks,
            bullets,
            hit_events,
        }
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
