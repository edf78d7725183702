//! Grid-based stochastic placement of concealment objects

use rand::Rng;

use super::physics::WorldBounds;
use super::registry::ConcealmentObject;

/// Grid layout and densities for one placement pass
#[derive(Debug, Clone, Copy)]
pub struct PlacementGrid {
    pub columns: u32,
    pub rows: u32,
    /// Inset from every cell edge
    pub margin: f64,
    /// Chance a cell receives its first object
    pub first_chance: f64,
    /// Independent chance a cell receives a second object
    pub second_chance: f64,
    /// Hard ceiling across the whole map
    pub max_objects: usize,
}

impl Default for PlacementGrid {
    fn default() -> Self {
        Self {
            columns: 8,
            rows: 5,
            margin: 80.0,
            first_chance: 0.6,
            second_chance: 0.2,
            max_objects: 45,
        }
    }
}

impl PlacementGrid {
    /// Scatter objects drawn from `pool` over the world, one cell at a time.
    ///
    /// Ids are `OBJ_<n>` in placement order. Cells whose inner rectangle is
    /// empty after the margin are skipped.
    pub fn generate<R: Rng>(
        &self,
        world: &WorldBounds,
        pool: &[&str],
        rng: &mut R,
    ) -> Vec<ConcealmentObject> {
        let mut objects = Vec::new();
        if pool.is_empty() || self.columns == 0 || self.rows == 0 {
            return objects;
        }

        let cell_w = world.width / self.columns as f64;
        let cell_h = world.height / self.rows as f64;

        'grid: for row in 0..self.rows {
            for col in 0..self.columns {
                let min_x = col as f64 * cell_w + self.margin;
                let min_y = row as f64 * cell_h + self.margin;
                let max_x = (col + 1) as f64 * cell_w - self.margin;
                let max_y = (row + 1) as f64 * cell_h - self.margin;
                if max_x <= min_x || max_y <= min_y {
                    continue;
                }

                for chance in [self.first_chance, self.second_chance] {
                    if objects.len() >= self.max_objects {
                        break 'grid;
                    }
                    if !rng.gen_bool(chance.clamp(0.0, 1.0)) {
                        continue;
                    }
                    let kind = pool[rng.gen_range(0..pool.len())];
                    objects.push(ConcealmentObject {
                        id: format!("OBJ_{}", objects.len()),
                        kind: kind.to_string(),
                        x: rng.gen_range(min_x..max_x),
                        y: rng.gen_range(min_y..max_y),
                    });
                }
            }
        }

        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::theme::Theme;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn objects_stay_inside_cell_margins() {
        let world = WorldBounds::default();
        let grid = PlacementGrid::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..50 {
            let objects = grid.generate(&world, Theme::City.object_pool(), &mut rng);
            assert!(objects.len() <= grid.max_objects);
            for o in &objects {
                let cell_w = world.width / grid.columns as f64;
                let cell_h = world.height / grid.rows as f64;
                let in_cell_x = o.x - (o.x / cell_w).floor() * cell_w;
                let in_cell_y = o.y - (o.y / cell_h).floor() * cell_h;
                assert!(in_cell_x >= grid.margin && in_cell_x < cell_w - grid.margin);
                assert!(in_cell_y >= grid.margin && in_cell_y < cell_h - grid.margin);
                assert!(Theme::City.object_pool().contains(&o.kind.as_str()));
            }
        }
    }

    #[test]
    fn ceiling_caps_dense_grids() {
        let grid = PlacementGrid {
            columns: 10,
            rows: 6,
            margin: 10.0,
            first_chance: 1.0,
            second_chance: 1.0,
            max_objects: 45,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let objects = grid.generate(&WorldBounds::default(), &["BOX"], &mut rng);
        assert_eq!(objects.len(), 45);
        assert_eq!(objects[0].id, "OBJ_0");
        assert_eq!(objects[44].id, "OBJ_44");
    }

    #[test]
    fn empty_pool_places_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let objects = PlacementGrid::default().generate(&WorldBounds::default(), &[], &mut rng);
        assert!(objects.is_empty());
    }

    #[test]
    fn oversized_margin_skips_cells() {
        let grid = PlacementGrid {
            margin: 200.0,
            first_chance: 1.0,
            ..PlacementGrid::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        // 250 x 240 cells minus 200 on every side leave nothing to sample from
        assert!(grid.generate(&WorldBounds::default(), &["BOX"], &mut rng).is_empty());
    }
}
