//! Combat system - bullets, wall bounces, reloads and hit detection

use std::time::{Duration, Instant};

use super::arena::{Letter, ARENA_H, ARENA_W, TANK_W};
use super::collision::{circle_circle, circle_rect, Rect};

/// Weapon and damage constants
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Bullet travel per step
    pub bullet_speed: f32,
    /// Bullet collision radius
    pub bullet_radius: f32,
    /// Wall bounces a bullet survives; the next wall contact destroys it
    pub max_bounces: u8,
    /// Steps during which a bullet cannot hit the tank that fired it
    pub owner_immunity_steps: u32,
    /// Distance from tank center to the bullet spawn point
    pub muzzle_clearance: f32,
    /// Radius of the tank hit circle, tighter than the sprite
    pub hit_radius: f32,
    /// Cooldown after firing
    pub reload: Duration,
    /// How long a struck tank flashes
    pub hit_flash: Duration,
    /// Hits that eliminate a tank
    pub max_hits: u8,
}

pub const WEAPON_STATS: WeaponStats = WeaponStats {
    bullet_speed: 20.0,
    bullet_radius: 7.0,
    max_bounces: 5,
    owner_immunity_steps: 20,
    muzzle_clearance: TANK_W / 2.0 + 30.0,
    hit_radius: 38.0,
    reload: Duration::from_millis(5000),
    hit_flash: Duration::from_millis(400),
    max_hits: 10,
};

/// Active bullet in the arena
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: u64,
    pub owner: Letter,
    pub x: f32,
    pub y: f32,
    /// Heading in degrees
    pub angle: f32,
    pub bounces: u8,
    /// Steps survived since spawn
    pub age: u32,
    /// Set on the step the bullet reflected off a wall, cleared after broadcast
    pub wall_hit: bool,
}

impl Bullet {
    /// Spawn a bullet ahead of a tank centered at (`cx`, `cy`)
    pub fn fire(id: u64, owner: Letter, cx: f32, cy: f32, angle: f32, stats: &WeaponStats) -> Self {
        let rad = angle.to_radians();
        Self {
            id,
            owner,
            x: cx + rad.cos() * stats.muzzle_clearance,
            y: cy + rad.sin() * stats.muzzle_clearance,
            angle,
            bounces: 0,
            age: 0,
            wall_hit: false,
        }
    }

    /// Move one step along the current heading
    pub fn advance(&mut self, stats: &WeaponStats) {
        let rad = self.angle.to_radians();
        self.x += rad.cos() * stats.bullet_speed;
        self.y += rad.sin() * stats.bullet_speed;
    }

    pub fn out_of_bounds(&self) -> bool {
        self.x < 0.0 || self.x > ARENA_W || self.y < 0.0 || self.y > ARENA_H
    }

    /// Whether this bullet may strike `target` centered at (`cx`, `cy`)
    pub fn hits_tank(&self, target: Letter, cx: f32, cy: f32, stats: &WeaponStats) -> bool {
        if target == self.owner && self.age < stats.owner_immunity_steps {
            return false;
        }
        circle_circle(self.x, self.y, stats.bullet_radius, cx, cy, stats.hit_radius)
    }
}

/// Outcome of testing a bullet against the wall layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallContact {
    /// No wall touched
    Clear,
    /// Reflected off a wall
    Bounced,
    /// Touched a wall with no bounces left
    Spent,
}

/// Combat system for bullets and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Resolve the first wall the bullet touches, reflecting it about the
    /// axis of smaller penetration and stepping it once along the new heading
    pub fn resolve_walls(bullet: &mut Bullet, walls: &[Rect], stats: &WeaponStats) -> WallContact {
        let r = stats.bullet_radius;
        let Some(wall) = walls.iter().find(|w| circle_rect(bullet.x, bullet.y, r, w)) else {
            return WallContact::Clear;
        };

        if bullet.bounces >= stats.max_bounces {
            return WallContact::Spent;
        }

        bullet.angle = Self::reflect(bullet, wall, stats);
        bullet.bounces += 1;
        bullet.advance(stats);
        bullet.wall_hit = true;
        WallContact::Bounced
    }

    /// Heading after bouncing off `wall`
    pub fn reflect(bullet: &Bullet, wall: &Rect, stats: &WeaponStats) -> f32 {
        let r = stats.bullet_radius;
        let overlap_left = (bullet.x + r) - wall.x;
        let overlap_right = wall.right() - (bullet.x - r);
        let overlap_top = (bullet.y + r) - wall.y;
        let overlap_bottom = wall.bottom() - (bullet.y - r);

        let horizontal = overlap_left.min(overlap_right);
        let vertical = overlap_top.min(overlap_bottom);

        if horizontal < vertical {
            (180.0 - bullet.angle).rem_euclid(360.0)
        } else {
            (360.0 - bullet.angle).rem_euclid(360.0)
        }
    }

    /// Check if a tank can fire
    pub fn can_fire(reloading: bool) -> bool {
        !reloading
    }

    /// Deadline for a reload started at `now`
    pub fn reload_deadline(now: Instant, stats: &WeaponStats) -> Instant {
        now + stats.reload
    }

    /// Deadline for the flash of a hit registered at `now`
    pub fn hit_flash_deadline(now: Instant, stats: &WeaponStats) -> Instant {
        now + stats.hit_flash
    }
}

/// A hit registered during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitResult {
    pub shooter: Letter,
    pub target: Letter,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullet_at(x: f32, y: f32, angle: f32) -> Bullet {
        Bullet {
            id: 1,
            owner: Letter::A,
            x,
            y,
            angle,
            bounces: 0,
            age: 0,
            wall_hit: false,
        }
    }

    #[test]
    fn fire_spawns_clear_of_own_body() {
        let b = Bullet::fire(0, Letter::A, 500.0, 500.0, 0.0, &WEAPON_STATS);
        assert!((b.x - (500.0 + 86.5 + 30.0)).abs() < 1e-3);
        assert!(!b.hits_tank(Letter::B, 500.0, 500.0, &WEAPON_STATS));
    }

    #[test]
    fn horizontal_hit_flips_about_vertical_axis() {
        let wall = Rect::new(100.0, 100.0, 100.0, 100.0);
        let mut b = bullet_at(96.0, 150.0, 30.0);
        assert_eq!(
            CombatSystem::resolve_walls(&mut b, &[wall], &WEAPON_STATS),
            WallContact::Bounced
        );
        assert!((b.angle - 150.0).abs() < 1e-3);
        assert_eq!(b.bounces, 1);
        assert!(b.wall_hit);
    }

    #[test]
    fn vertical_hit_flips_about_horizontal_axis() {
        let wall = Rect::new(100.0, 100.0, 100.0, 100.0);
        let b = bullet_at(150.0, 96.0, 60.0);
        assert!((CombatSystem::reflect(&b, &wall, &WEAPON_STATS) - 300.0).abs() < 1e-3);
    }

    #[test]
    fn capped_bullet_is_spent_not_reflected() {
        let wall = Rect::new(100.0, 100.0, 100.0, 100.0);
        let mut b = bullet_at(96.0, 150.0, 0.0);
        b.bounces = WEAPON_STATS.max_bounces;
        assert_eq!(
            CombatSystem::resolve_walls(&mut b, &[wall], &WEAPON_STATS),
            WallContact::Spent
        );
        assert_eq!(b.angle, 0.0);
        assert_eq!(b.bounces, WEAPON_STATS.max_bounces);
    }

    #[test]
    fn owner_is_immune_while_bullet_is_young() {
        let mut b = bullet_at(300.0, 300.0, 0.0);
        b.age = WEAPON_STATS.owner_immunity_steps - 1;
        assert!(!b.hits_tank(Letter::A, 300.0, 300.0, &WEAPON_STATS));
        assert!(b.hits_tank(Letter::B, 300.0, 300.0, &WEAPON_STATS));
        b.age = WEAPON_STATS.owner_immunity_steps;
        assert!(b.hits_tank(Letter::A, 300.0, 300.0, &WEAPON_STATS));
    }

    #[test]
    fn leaving_the_arena_is_detected() {
        assert!(bullet_at(-0.5, 10.0, 0.0).out_of_bounds());
        assert!(bullet_at(10.0, ARENA_H + 1.0, 0.0).out_of_bounds());
        assert!(!bullet_at(ARENA_W, ARENA_H, 0.0).out_of_bounds());
    }
}
