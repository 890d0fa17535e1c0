//! Authoritative fixed-step simulation for one match

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::ws::protocol::{HitEvent, ServerMsg};

use super::arena::{spawn_for, Letter, Spawn, TANK_H, TANK_W};
use super::collision::Rect;
use super::combat::{Bullet, CombatSystem, HitResult, WallContact, WeaponStats, WEAPON_STATS};
use super::physics::{PhysicsSystem, TankStats, TANK_STATS};
use super::snapshot::SnapshotBuilder;
use super::TankInput;

/// Tank state (authoritative)
#[derive(Debug, Clone)]
pub struct Tank {
    pub letter: Letter,
    /// Sprite top-left corner
    pub x: f32,
    pub y: f32,
    /// Heading in degrees, always in [0, 360)
    pub angle: f32,
    pub hits: u8,
    pub reloading: bool,
    pub reload_until: Option<Instant>,
    pub hit_flash_until: Option<Instant>,
    /// Once set, never cleared for the rest of the match
    pub eliminated: bool,
    pub input: TankInput,
    pub shot_queued: bool,
}

impl Tank {
    pub fn spawn(letter: Letter, spawn: Spawn) -> Self {
        Self {
            letter,
            x: spawn.x,
            y: spawn.y,
            angle: spawn.angle,
            hits: 0,
            reloading: false,
            reload_until: None,
            hit_flash_until: None,
            eliminated: false,
            input: TankInput::default(),
            shot_queued: false,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + TANK_W / 2.0, self.y + TANK_H / 2.0)
    }
}

/// Match outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Tank(Letter),
    Draw,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Tank(letter) => f.write_str(letter.as_str()),
            Winner::Draw => f.write_str("draw"),
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything one step produced for the room to deliver
#[derive(Debug)]
pub struct StepReport {
    /// The `game_state` message for this step
    pub snapshot: ServerMsg,
    /// Tanks eliminated during this step, in letter order
    pub eliminated: Vec<Letter>,
    /// Set once the match is decided
    pub outcome: Option<Winner>,
}

/// The simulation state owned by a playing or finished room
pub struct Simulation {
    pub tanks: BTreeMap<Letter, Tank>,
    pub bullets: Vec<Bullet>,
    pub walls: Vec<Rect>,
    pub tank_stats: TankStats,
    pub weapon_stats: WeaponStats,
    next_bullet_id: u64,
}

impl Simulation {
    /// Spawn one tank per configured letter at its fixed pose
    pub fn new(letters: &[Letter], walls: Vec<Rect>) -> Self {
        let tanks = letters
            .iter()
            .map(|&letter| (letter, Tank::spawn(letter, spawn_for(letter))))
            .collect();

        Self {
            tanks,
            bullets: Vec::new(),
            walls,
            tank_stats: TANK_STATS,
            weapon_stats: WEAPON_STATS,
            next_bullet_id: 0,
        }
    }

    /// Replace a tank's controller state; ignored for eliminated or unknown tanks.
    /// Takes effect on the next step.
    pub fn set_input(&mut self, letter: Letter, input: TankInput) -> bool {
        match self.tanks.get_mut(&letter) {
            Some(tank) if !tank.eliminated => {
                tank.input = input;
                true
            }
            _ => false,
        }
    }

    pub fn alive(&self) -> impl Iterator<Item = Letter> + '_ {
        self.tanks.values().filter(|t| !t.eliminated).map(|t| t.letter)
    }

    /// Run a single simulation step
    pub fn step(&mut self, now: Instant) -> StepReport {
        self.update_tanks(now);
        let hits = self.update_bullets();
        let (hit_events, eliminated) = self.apply_hits(&hits, now);
        let outcome = self.check_win_condition();

        let snapshot = SnapshotBuilder::build(&self.tanks, &self.bullets, hit_events, now);
        for bullet in &mut self.bullets {
            bullet.wall_hit = false;
        }

        StepReport {
            snapshot,
            eliminated,
            outcome,
        }
    }

    /// Turn, move and fire every live tank in letter order
    fn update_tanks(&mut self, now: Instant) {
        let letters: Vec<Letter> = self.tanks.keys().copied().collect();

        for letter in letters {
            let others: Vec<Rect> = self
                .tanks
                .values()
                .filter(|o| o.letter != letter && !o.eliminated)
                .map(|o| PhysicsSystem::body_rect(o.x, o.y, &self.tank_stats))
                .collect();

            let Some(tank) = self.tanks.get_mut(&letter) else {
                continue;
            };
            if tank.eliminated {
                continue;
            }

            let input = tank.input;
            tank.angle = PhysicsSystem::turn(tank.angle, &input, &self.tank_stats);

            if let Some((nx, ny)) =
                PhysicsSystem::propose_move(tank.x, tank.y, tank.angle, &input, &self.tank_stats)
            {
                let body = PhysicsSystem::body_rect(nx, ny, &self.tank_stats);
                // No sliding: a blocked move is dropped entirely
                if !PhysicsSystem::is_blocked(&body, &self.walls, &others) {
                    tank.x = nx;
                    tank.y = ny;
                }
            }

            if input.shoot && CombatSystem::can_fire(tank.reloading) && !tank.shot_queued {
                tank.shot_queued = true;
            }
            if tank.shot_queued {
                tank.shot_queued = false;
                tank.reloading = true;
                tank.reload_until = Some(CombatSystem::reload_deadline(now, &self.weapon_stats));

                let (cx, cy) = tank.center();
                let bullet = Bullet::fire(
                    self.next_bullet_id,
                    letter,
                    cx,
                    cy,
                    tank.angle,
                    &self.weapon_stats,
                );
                self.next_bullet_id += 1;
                self.bullets.push(bullet);
            }

            if tank.reloading && tank.reload_until.is_some_and(|until| now >= until) {
                tank.reloading = false;
                tank.reload_until = None;
            }
        }
    }

    /// Advance bullets in spawn order, bounce them, and collect hits.
    /// Bullets that left the arena, were spent on a wall or struck a tank
    /// are removed before returning.
    fn update_bullets(&mut self) -> Vec<HitResult> {
        let stats = self.weapon_stats;
        let mut removed: HashSet<u64> = HashSet::new();
        let mut hits = Vec::new();

        for bullet in &mut self.bullets {
            if removed.contains(&bullet.id) {
                continue;
            }

            bullet.advance(&stats);
            if bullet.out_of_bounds() {
                removed.insert(bullet.id);
                continue;
            }

            if CombatSystem::resolve_walls(bullet, &self.walls, &stats) == WallContact::Spent {
                removed.insert(bullet.id);
                continue;
            }

            bullet.age += 1;

            let struck = self.tanks.values().filter(|t| !t.eliminated).find(|t| {
                let (cx, cy) = t.center();
                bullet.hits_tank(t.letter, cx, cy, &stats)
            });

            if let Some(target) = struck {
                hits.push(HitResult {
                    shooter: bullet.owner,
                    target: target.letter,
                });
                removed.insert(bullet.id);
            }
        }

        self.bullets.retain(|b| !removed.contains(&b.id));
        hits
    }

    /// Apply registered hits; returns the hit events and newly eliminated tanks
    fn apply_hits(&mut self, hits: &[HitResult], now: Instant) -> (Vec<HitEvent>, Vec<Letter>) {
        let mut events = Vec::new();
        let mut eliminated = Vec::new();

        for hit in hits {
            let Some(tank) = self.tanks.get_mut(&hit.target) else {
                continue;
            };
            // A second hit in the same step on a freshly eliminated tank is void
            if tank.eliminated {
                continue;
            }

            tank.hits += 1;
            tank.hit_flash_until = Some(CombatSystem::hit_flash_deadline(now, &self.weapon_stats));
            events.push(HitEvent {
                tank: hit.target,
                shooter: hit.shooter,
                hits: tank.hits,
            });

            if tank.hits >= self.weapon_stats.max_hits {
                tank.eliminated = true;
                tank.input = TankInput::default();
                eliminated.push(hit.target);
            }
        }

        eliminated.sort();
        (events, eliminated)
    }

    /// One survivor wins; none left is a draw
    fn check_win_condition(&self) -> Option<Winner> {
        let mut alive = self.alive();
        match (alive.next(), alive.next()) {
            (None, _) => Some(Winner::Draw),
            (Some(letter), None) => Some(Winner::Tank(letter)),
            _ => None,
        }
    }
}
