//! Movement integration and timer decay

use super::participant::{Direction, ARENA_HALF};

/// Physics system for advancing positions and countdowns
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance a position along a direction for one step.
    /// Returns (new_x, new_y), clamped to the arena.
    pub fn integrate(x: f32, y: f32, direction: Direction, speed: f32, dt: f32) -> (f32, f32) {
        let (ux, uy) = direction.unit_vector();
        let new_x = (x + ux * speed * dt).clamp(-ARENA_HALF, ARENA_HALF);
        let new_y = (y + uy * speed * dt).clamp(-ARENA_HALF, ARENA_HALF);
        (new_x, new_y)
    }

    /// Count a timer down towards zero, never below
    pub fn decay(remaining: f32, dt: f32) -> f32 {
        (remaining - dt).max(0.0)
    }

    /// Whether a countdown finished during this step
    pub fn expired(before: f32, after: f32) -> bool {
        before > 0.0 && after <= 0.0
    }

    /// Check if a point lies within a radius of another
    pub fn within_range(x1: f32, y1: f32, x2: f32, y2: f32, range: f32) -> bool {
        let dx = x2 - x1;
        let dy = y2 - y1;
        dx * dx + dy * dy <= range * range
    }
}
