//! The vector and rectangle math the broadphase runs on.
//!
//! Rectangles are position + size with y growing upward; edges are
//! closed, so rectangles that merely touch still intersect. That is the
//! contract the spatial queries are written against.

use core::ops::{Add, AddAssign, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn min(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.max(other.x), self.y.max(other.y))
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub position: Vec2,
    pub size: Vec2,
}

/// The four equal subdivisions of a rectangle, split at its center.
#[derive(Debug, Clone, Copy)]
pub struct Quadrants {
    pub top_left: Rect,
    pub top_right: Rect,
    pub bottom_right: Rect,
    pub bottom_left: Rect,
}

impl Rect {
    pub const fn new(position: Vec2, size: Vec2) -> Self {
        Self { position, size }
    }

    pub fn from_extents(min: Vec2, max: Vec2) -> Self {
        Self::new(min, max - min)
    }

    pub fn min(self) -> Vec2 {
        self.position
    }

    pub fn max(self) -> Vec2 {
        self.position + self.size
    }

    pub fn center(self) -> Vec2 {
        self.position + self.size * 0.5
    }

    /// Closed-edge overlap test: touching counts.
    pub fn intersects(self, other: Rect) -> bool {
        let a_min = self.min();
        let a_max = self.max();
        let b_min = other.min();
        let b_max = other.max();

        a_min.x <= b_max.x && b_min.x <= a_max.x && a_min.y <= b_max.y && b_min.y <= a_max.y
    }

    /// Whether `other` lies entirely inside this rectangle (closed edges).
    pub fn contains_rect(self, other: Rect) -> bool {
        let a_min = self.min();
        let a_max = self.max();
        let b_min = other.min();
        let b_max = other.max();

        a_min.x <= b_min.x && b_max.x <= a_max.x && a_min.y <= b_min.y && b_max.y <= a_max.y
    }

    pub fn quadrants(self) -> Quadrants {
        let half = self.size * 0.5;
        let center = self.position + half;

        Quadrants {
            top_left: Rect::new(Vec2::new(self.position.x, center.y), half),
            top_right: Rect::new(center, half),
            bottom_right: Rect::new(Vec2::new(center.x, self.position.y), half),
            bottom_left: Rect::new(self.position, half),
        }
    }

    /// Bounding box of this rectangle swept along `motion`.
    pub fn swept_by(self, motion: Vec2) -> Rect {
        let moved = Rect::new(self.position + motion, self.size);
        let min = self.min().min(moved.min());
        let max = self.max().max(moved.max());

        Rect::from_extents(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::{Rect, Vec2};

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::new(Vec2::new(x, y), Vec2::new(w, h))
    }

    #[test]
    fn touching_edges_intersect() {
        assert!(rect(0.0, 0.0, 10.0, 10.0).intersects(rect(10.0, 0.0, 5.0, 5.0)));
        assert!(!rect(0.0, 0.0, 10.0, 10.0).intersects(rect(10.1, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn quadrants_tile_the_rectangle() {
        let r = rect(0.0, 0.0, 100.0, 100.0);
        let q = r.quadrants();

        assert_eq!(q.bottom_left, rect(0.0, 0.0, 50.0, 50.0));
        assert_eq!(q.bottom_right, rect(50.0, 0.0, 50.0, 50.0));
        assert_eq!(q.top_left, rect(0.0, 50.0, 50.0, 50.0));
        assert_eq!(q.top_right, rect(50.0, 50.0, 50.0, 50.0));

        for quadrant in [q.top_left, q.top_right, q.bottom_right, q.bottom_left] {
            assert!(r.contains_rect(quadrant));
        }
    }

    #[test]
    fn swept_covers_start_and_end() {
        let swept = rect(10.0, 10.0, 4.0, 4.0).swept_by(Vec2::new(-6.0, 8.0));

        assert!(swept.contains_rect(rect(10.0, 10.0, 4.0, 4.0)));
        assert!(swept.contains_rect(rect(4.0, 18.0, 4.0, 4.0)));
    }
}
