use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(self, dx: f32, dy: f32) -> Vec2 {
        Vec2 {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(self) -> f32 {
        self.y + self.height
    }

    pub fn origin(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn contains(self, point: Vec2) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }
}

/// Clamps `start` so that `[start, start + extent]` stays inside `[min, max]`.
/// When the extent does not fit, the span is pinned to `min`.
pub fn clamp_span(start: f32, extent: f32, min: f32, max: f32) -> f32 {
    if extent >= max - min {
        return min;
    }
    start.max(min).min(max - extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_is_half_open() {
        let rect = Rect::new(10.0, 10.0, 20.0, 5.0);
        assert!(rect.contains(Vec2::new(10.0, 10.0)));
        assert!(rect.contains(Vec2::new(29.9, 14.9)));
        assert!(!rect.contains(Vec2::new(30.0, 12.0)));
        assert!(!rect.contains(Vec2::new(15.0, 15.0)));
    }

    #[test]
    fn clamp_span_keeps_extent_inside_bounds() {
        assert_eq!(clamp_span(-5.0, 10.0, 0.0, 100.0), 0.0);
        assert_eq!(clamp_span(95.0, 10.0, 0.0, 100.0), 90.0);
        assert_eq!(clamp_span(40.0, 10.0, 0.0, 100.0), 40.0);
    }

    #[test]
    fn clamp_span_pins_oversized_extent_to_min() {
        assert_eq!(clamp_span(30.0, 150.0, 0.0, 100.0), 0.0);
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Vec2::new(100.0, 100.0);
        let b = Vec2::new(103.0, 104.0);
        assert!((a.distance(b) - 5.0).abs() < f32::EPSILON);
    }
}
