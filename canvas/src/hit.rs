//! Eraser hit-testing against committed strokes.
//!
//! All geometry here is in image space. A stroke is hit when its centre line
//! passes within `radius + stroke.width / 2` of the probe point, so thick
//! strokes are as easy to erase as they look.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::consts::MIN_ERASER_RADIUS;
use crate::layer::Stroke;
use crate::view::Point;

/// Eraser reach for the current pen width, in image pixels.
#[must_use]
pub fn eraser_radius(pen_width: f64) -> f64 {
    (pen_width * 2.0).max(MIN_ERASER_RADIUS)
}

/// Distance from `p` to the closed segment `a`–`b`.
#[must_use]
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * dx, a.y + t * dy);
    (p.x - proj.x).hypot(p.y - proj.y)
}

/// Shortest distance from `p` to the stroke's centre line.
#[must_use]
pub fn distance_to_stroke(p: Point, stroke: &Stroke) -> f64 {
    let points = stroke.points();
    if let [only] = points {
        return (p.x - only.x).hypot(p.y - only.y);
    }
    points
        .windows(2)
        .map(|w| distance_to_segment(p, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Whether an eraser of `radius` centred at `p` touches the stroke.
#[must_use]
pub fn stroke_hit(p: Point, stroke: &Stroke, radius: f64) -> bool {
    let reach = radius + stroke.width() / 2.0;
    let (min, max) = stroke.bounds();
    if p.x < min.x - reach || p.x > max.x + reach || p.y < min.y - reach || p.y > max.y + reach {
        return false;
    }
    distance_to_stroke(p, stroke) <= reach
}
