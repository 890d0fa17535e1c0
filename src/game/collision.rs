//! Geometry predicates shared by tank movement and bullet resolution

use serde::Serialize;

/// Axis-aligned rectangle anchored at its top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle of size `w`x`h` centered on (`cx`, `cy`)
    pub fn centered(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

/// Strict overlap: rectangles that only share an edge do not collide
pub fn rect_overlap(a: &Rect, b: &Rect) -> bool {
    a.x < b.right() && a.right() > b.x && a.y < b.bottom() && a.bottom() > b.y
}

/// Circle vs rectangle using the nearest point of the rectangle to the center
pub fn circle_rect(cx: f32, cy: f32, radius: f32, rect: &Rect) -> bool {
    let near_x = cx.clamp(rect.x, rect.right());
    let near_y = cy.clamp(rect.y, rect.bottom());
    let dx = cx - near_x;
    let dy = cy - near_y;
    dx * dx + dy * dy < radius * radius
}

/// Circle vs circle
pub fn circle_circle(ax: f32, ay: f32, ar: f32, bx: f32, by: f32, br: f32) -> bool {
    let dx = ax - bx;
    let dy = ay - by;
    let reach = ar + br;
    dx * dx + dy * dy < reach * reach
}
