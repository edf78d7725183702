//! World geometry and movement constraints

/// Playfield dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
    /// Border no player may enter
    pub wall_thickness: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 1200.0,
            wall_thickness: 50.0,
        }
    }
}

impl WorldBounds {
    /// True if the point lies inside the world rectangle, walls included
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    /// True if a player may stand at the point
    pub fn is_walkable(&self, x: f64, y: f64) -> bool {
        let wall = self.wall_thickness;
        (wall..=self.width - wall).contains(&x) && (wall..=self.height - wall).contains(&y)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Geometry helpers shared by movement and hit detection
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Check whether a point lies within `radius` of a center
    pub fn within_radius(px: f64, py: f64, cx: f64, cy: f64, radius: f64) -> bool {
        Self::distance_sq(px, py, cx, cy) <= radius * radius
    }

    pub fn distance_sq(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        let dx = x2 - x1;
        let dy = y2 - y1;
        dx * dx + dy * dy
    }

    /// Normalize a direction, None when it is too short to carry one
    pub fn normalize(dx: f64, dy: f64) -> Option<(f64, f64)> {
        let len = dx.hypot(dy);
        if len < 1e-6 {
            return None;
        }
        Some((dx / len, dy / len))
    }
}
