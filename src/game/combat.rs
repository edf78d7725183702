//! Combat system - ray marching hit detection and damage

use super::physics::{PhysicsSystem, WorldBounds};

/// Ray and hitbox parameters
#[derive(Debug, Clone, Copy)]
pub struct RayParams {
    /// Distance between samples along the ray
    pub step: f64,
    /// Maximum range
    pub max_range: f64,
    /// Hider hitbox radius
    pub player_radius: f64,
    /// Concealment object hitbox radius
    pub object_radius: f64,
}

impl Default for RayParams {
    fn default() -> Self {
        Self {
            step: 8.0,
            max_range: 1200.0,
            player_radius: 24.0,
            object_radius: 22.0,
        }
    }
}

/// Damage dealt to a hider by a direct hit
pub const HIT_DAMAGE: u8 = 50;

/// Health the seeker loses for shooting a decoy
pub const WRONG_SHOT_PENALTY: u8 = 10;

/// A hider the ray may hit
#[derive(Debug, Clone)]
pub struct PlayerTarget {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// A concealment object the ray may hit
#[derive(Debug, Clone)]
pub struct ObjectTarget {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// What the ray stopped on
#[derive(Debug, Clone, PartialEq)]
pub enum RayHit {
    Player { id: String },
    Object { id: String },
    None,
}

/// Result of a single raycast
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastResult {
    pub hit: RayHit,
    /// Sample point of the hit, or the exit/range point on a miss
    pub end_x: f64,
    pub end_y: f64,
}

/// Combat system for hit resolution and damage
pub struct CombatSystem;

impl CombatSystem {
    /// March along a unit direction and report the first collision.
    ///
    /// Players are tested before objects at every sample, so a hider wins any
    /// tie with a decoy at the same step. Within one category the closest
    /// target to the sample point wins, then the lowest id.
    pub fn raycast(
        origin_x: f64,
        origin_y: f64,
        dir_x: f64,
        dir_y: f64,
        players: &[PlayerTarget],
        objects: &[ObjectTarget],
        world: &WorldBounds,
        params: &RayParams,
    ) -> RaycastResult {
        let mut t = 0.0;
        while t <= params.max_range {
            let px = origin_x + dir_x * t;
            let py = origin_y + dir_y * t;

            if !world.contains(px, py) {
                return RaycastResult {
                    hit: RayHit::None,
                    end_x: px,
                    end_y: py,
                };
            }

            let player = Self::closest(
                players.iter().map(|p| (p.id.as_str(), p.x, p.y)),
                px,
                py,
                params.player_radius,
            );
            if let Some(id) = player {
                return RaycastResult {
                    hit: RayHit::Player { id: id.to_string() },
                    end_x: px,
                    end_y: py,
                };
            }

            let object = Self::closest(
                objects.iter().map(|o| (o.id.as_str(), o.x, o.y)),
                px,
                py,
                params.object_radius,
            );
            if let Some(id) = object {
                return RaycastResult {
                    hit: RayHit::Object { id: id.to_string() },
                    end_x: px,
                    end_y: py,
                };
            }

            t += params.step;
        }

        RaycastResult {
            hit: RayHit::None,
            end_x: origin_x + dir_x * params.max_range,
            end_y: origin_y + dir_y * params.max_range,
        }
    }

    fn closest<'a>(
        targets: impl Iterator<Item = (&'a str, f64, f64)>,
        px: f64,
        py: f64,
        radius: f64,
    ) -> Option<&'a str> {
        targets
            .filter(|(_, x, y)| PhysicsSystem::within_radius(px, py, *x, *y, radius))
            .map(|(id, x, y)| (id, PhysicsSystem::distance_sq(px, py, x, y)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(id, _)| id)
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u8, damage: u8) -> (u8, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, x: f64, y: f64) -> PlayerTarget {
        PlayerTarget {
            id: id.into(),
            x,
            y,
        }
    }

    fn object(id: &str, x: f64, y: f64) -> ObjectTarget {
        ObjectTarget {
            id: id.into(),
            x,
            y,
        }
    }

    fn cast(players: &[PlayerTarget], objects: &[ObjectTarget], dir: (f64, f64)) -> RaycastResult {
        CombatSystem::raycast(
            1000.0,
            600.0,
            dir.0,
            dir.1,
            players,
            objects,
            &WorldBounds::default(),
            &RayParams::default(),
        )
    }

    #[test]
    fn player_wins_tie_with_object_at_same_step() {
        // Both centered on the ray at the same distance
        let result = cast(
            &[player("H", 1200.0, 600.0)],
            &[object("OBJ_0", 1200.0, 600.0)],
            (1.0, 0.0),
        );
        assert_eq!(result.hit, RayHit::Player { id: "H".into() });
    }

    #[test]
    fn player_reached_at_the_same_sample_as_object_wins() {
        // Object edge (r=22) is reached at t=184, player edge (r=24) at t=184 too
        let result = cast(
            &[player("H", 1208.0, 600.0)],
            &[object("OBJ_0", 1206.0, 600.0)],
            (1.0, 0.0),
        );
        assert_eq!(result.hit, RayHit::Player { id: "H".into() });
        assert_eq!(result.end_x, 1184.0);
    }

    #[test]
    fn nearer_object_blocks_farther_player() {
        let result = cast(
            &[player("H", 1400.0, 600.0)],
            &[object("OBJ_0", 1200.0, 600.0)],
            (1.0, 0.0),
        );
        assert_eq!(result.hit, RayHit::Object { id: "OBJ_0".into() });
        assert!(result.end_x < 1200.0);
    }

    #[test]
    fn miss_reports_world_exit_point() {
        let result = cast(&[], &[], (1.0, 0.0));
        assert_eq!(result.hit, RayHit::None);
        // Exits at x > 2000 on the first sample past the edge
        assert!(result.end_x > 2000.0 && result.end_x <= 2008.0);
        assert_eq!(result.end_y, 600.0);
    }

    #[test]
    fn miss_inside_world_reports_range_point() {
        let big = WorldBounds {
            width: 10_000.0,
            height: 10_000.0,
            wall_thickness: 50.0,
        };
        let result = CombatSystem::raycast(
            5000.0,
            5000.0,
            0.0,
            1.0,
            &[],
            &[],
            &big,
            &RayParams::default(),
        );
        assert_eq!(result.hit, RayHit::None);
        assert_eq!((result.end_x, result.end_y), (5000.0, 6200.0));
    }

    #[test]
    fn target_beyond_range_is_not_hit() {
        let big = WorldBounds {
            width: 10_000.0,
            height: 10_000.0,
            wall_thickness: 50.0,
        };
        let result = CombatSystem::raycast(
            0.0,
            5000.0,
            1.0,
            0.0,
            &[player("H", 1300.0, 5000.0)],
            &[],
            &big,
            &RayParams::default(),
        );
        assert_eq!(result.hit, RayHit::None);
    }

    #[test]
    fn equidistant_players_resolve_by_id() {
        // Mirrored about the ray, so both qualify at the same sample
        let result = cast(
            &[player("B", 1210.0, 610.0), player("A", 1210.0, 590.0)],
            &[],
            (1.0, 0.0),
        );
        assert_eq!(result.hit, RayHit::Player { id: "A".into() });
    }

    #[test]
    fn damage_saturates_at_zero() {
        assert_eq!(CombatSystem::apply_damage(100, HIT_DAMAGE), (50, false));
        assert_eq!(CombatSystem::apply_damage(50, HIT_DAMAGE), (0, true));
        assert_eq!(CombatSystem::apply_damage(5, WRONG_SHOT_PENALTY), (0, true));
    }
}
