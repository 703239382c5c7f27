//! Randomized path carving and reward shaping.
//!
//! Carving starts from an occupied cell and walks in random directions,
//! only entering cells whose occupied degree stays below
//! `max_cell_neighbors`. Before each step a subpath may branch off the
//! current cursor with the same remaining length. Branches are kept on an
//! explicit worklist capped at `max_branch_depth` frames.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::grid::{Direction, Grid, Pos, Tile};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardShaping {
    /// Keep carved rewards, only the solution gets `max_reward`.
    Uniform,
    InverseDistance,
    NormalizedEuclidean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub max_length: usize,
    pub subpath_probability: f64,
    pub max_cell_neighbors: usize,
    pub max_branch_depth: usize,
    pub min_reward: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            max_length: 100,
            subpath_probability: 0.5,
            max_cell_neighbors: 2,
            max_branch_depth: 256,
            min_reward: 0.0,
        }
    }
}

/// What a carving run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub start: Pos,
    /// Newly carved cells in creation order (the start is not included).
    pub carved: Vec<Pos>,
    pub branches: usize,
    /// Branches not spawned because the worklist was at `max_branch_depth`.
    pub suppressed_branches: usize,
    pub max_depth: usize,
}

#[derive(Debug, Copy, Clone)]
struct Frame {
    cursor: Pos,
    remaining: usize,
    branched: bool,
}

impl Frame {
    fn new(cursor: Pos, remaining: usize) -> Self {
        Frame { cursor, remaining, branched: false }
    }
}

pub struct MapGenerator {
    settings: GeneratorSettings,
}

impl MapGenerator {
    pub fn new(settings: GeneratorSettings) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.subpath_probability) {
            return Err(Error::invalid(format!(
                "subpath probability must be in [0, 1], got {}",
                settings.subpath_probability
            )));
        }
        if settings.max_branch_depth == 0 {
            return Err(Error::invalid("max branch depth must be at least 1"));
        }
        if settings.max_cell_neighbors == 0 {
            return Err(Error::invalid("max cell neighbors must be at least 1"));
        }
        Ok(MapGenerator { settings })
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Marks `start` as occupied and carves `max_length` cells from it.
    pub fn generate_map<R: Rng + ?Sized>(
        &self,
        grid: &mut Grid,
        start: Pos,
        rng: &mut R,
    ) -> Result<Generation> {
        if !grid.is_empty(start)? {
            return Err(Error::AlreadyOccupied(start));
        }
        grid.mark_occupied(start)?;

        let generation = self.generate_path(grid, start, self.settings.max_length, rng)?;
        info!(
            %start,
            carved = generation.carved.len(),
            branches = generation.branches,
            suppressed = generation.suppressed_branches,
            max_depth = generation.max_depth,
            "map generated"
        );
        Ok(generation)
    }

    /// Carves from an already occupied cell.
    pub fn generate_path<R: Rng + ?Sized>(
        &self,
        grid: &mut Grid,
        from: Pos,
        max_length: usize,
        rng: &mut R,
    ) -> Result<Generation> {
        if grid.is_empty(from)? {
            return Err(Error::invalid(format!(
                "path must start from an occupied cell, {} is empty",
                from
            )));
        }

        let mut generation = Generation { start: from, max_depth: 1, ..Generation::default() };
        let mut stack = vec![Frame::new(from, max_length)];

        while let Some(top) = stack.len().checked_sub(1) {
            let Frame { cursor, remaining, branched } = stack[top];
            if remaining == 0 {
                stack.pop();
                continue;
            }

            if !branched {
                stack[top].branched = true;
                if rng.gen::<f64>() < self.settings.subpath_probability {
                    if stack.len() < self.settings.max_branch_depth {
                        stack.push(Frame::new(cursor, remaining));
                        generation.branches += 1;
                        generation.max_depth = generation.max_depth.max(stack.len());
                        continue;
                    }
                    generation.suppressed_branches += 1;
                    debug!(%cursor, depth = stack.len(), "branch suppressed at depth cap");
                }
            }

            match self.carve_step(grid, cursor, rng) {
                Some(tile) => {
                    generation.carved.push(tile.pos);
                    stack[top] = Frame::new(tile.pos, remaining - 1);
                }
                None => {
                    stack.pop();
                }
            }
        }

        Ok(generation)
    }

    /// Tries the free in-bounds directions around `cursor` in random order and
    /// carves the first one that keeps the new cell's degree under the limit.
    fn carve_step<R: Rng + ?Sized>(
        &self,
        grid: &mut Grid,
        cursor: Pos,
        rng: &mut R,
    ) -> Option<Tile> {
        let mut candidates: Vec<(Direction, Pos)> = grid
            .get_neighbors(cursor, false)
            .absent()
            .filter_map(|d| grid.get_position_following_direction(cursor, d).map(|p| (d, p)))
            .collect();

        while !candidates.is_empty() {
            let (direction, target) = candidates.remove(rng.gen_range(0..candidates.len()));
            if grid.get_neighbors(target, false).count() >= self.settings.max_cell_neighbors {
                continue;
            }
            return match grid.add_on(cursor, direction) {
                Ok(tile) => Some(tile),
                Err(err) => {
                    debug!(%cursor, ?direction, %err, "carving stopped");
                    None
                }
            };
        }
        None
    }

    pub fn apply_rewards(
        &self,
        grid: &mut Grid,
        solution: Pos,
        shaping: RewardShaping,
    ) -> Result<()> {
        match shaping {
            RewardShaping::Uniform => grid.set_reward(solution, grid.max_reward()),
            RewardShaping::InverseDistance => {
                self.generate_inverse_distance_rewards(grid, solution)
            }
            RewardShaping::NormalizedEuclidean => self.generate_euclidean_rewards(grid, solution),
        }
    }

    /// `max_reward / d` in grid units, rounded to cents. Empty cells keep their reward.
    pub fn generate_inverse_distance_rewards(&self, grid: &mut Grid, solution: Pos) -> Result<()> {
        let max_reward = grid.max_reward();
        let rewards: Vec<(Pos, f64)> = grid
            .occupied_tiles()
            .map(|tile| {
                let reward = if tile.pos == solution {
                    max_reward
                } else {
                    round_cents(max_reward / tile.pos.distance(solution))
                };
                (tile.pos, reward)
            })
            .collect();

        for (pos, reward) in rewards {
            grid.set_reward(pos, reward)?;
        }
        Ok(())
    }

    /// Pixel-space distance to the solution normalized by the grid's screen
    /// diagonal. Dead ends other than the solution get `-max_reward`.
    pub fn generate_euclidean_rewards(&self, grid: &mut Grid, solution: Pos) -> Result<()> {
        let max_reward = grid.max_reward();
        let tile_size = f64::from(grid.tile_size());
        let screen_height = grid.rows() as f64 * tile_size;
        let screen_width = grid.cols() as f64 * tile_size;
        let diagonal = (screen_height * screen_height + screen_width * screen_width).sqrt();

        let rewards: Vec<(Pos, f64)> = grid
            .occupied_tiles()
            .map(|tile| {
                let reward = if tile.pos == solution {
                    max_reward
                } else if grid.is_terminal(tile.pos) {
                    -max_reward
                } else {
                    let normalized = tile.pos.distance(solution) * tile_size / diagonal;
                    ((1.0 - normalized) * max_reward)
                        .max(self.settings.min_reward)
                        .min(max_reward)
                };
                (tile.pos, reward)
            })
            .collect();

        for (pos, reward) in rewards {
            grid.set_reward(pos, reward)?;
        }
        Ok(())
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_cents(3.333_333), 3.33);
        assert_eq!(round_cents(7.071_067), 7.07);
    }

    #[test]
    fn zero_length_carves_nothing() {
        let mut grid = Grid::new(4, 4, 16, 10.0).unwrap();
        let settings = GeneratorSettings { max_length: 0, ..Default::default() };
        let generator = MapGenerator::new(settings).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let generation = generator.generate_map(&mut grid, Pos::new(0, 0), &mut rng).unwrap();
        assert!(generation.carved.is_empty());
        assert_eq!(grid.occupied_tiles().count(), 1);
    }

    #[test]
    fn depth_cap_of_one_never_branches() {
        let mut grid = Grid::new(10, 10, 16, 10.0).unwrap();
        let settings = GeneratorSettings {
            subpath_probability: 1.0,
            max_branch_depth: 1,
            ..Default::default()
        };
        let generator = MapGenerator::new(settings).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let generation = generator.generate_map(&mut grid, Pos::new(5, 5), &mut rng).unwrap();
        assert_eq!(generation.branches, 0);
        assert_eq!(generation.max_depth, 1);
        assert!(generation.suppressed_branches > 0);
    }

    #[test]
    fn generation_trace_starts_at_the_carving_origin() {
        assert_eq!(Generation::default().start, Pos::new(0, 0));

        let mut grid = Grid::new(6, 6, 16, 10.0).unwrap();
        let generator = MapGenerator::new(GeneratorSettings::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let generation = generator.generate_map(&mut grid, Pos::new(3, 2), &mut rng).unwrap();
        assert_eq!(generation.start, Pos::new(3, 2));
        assert!(generation.max_depth >= 1);
    }

    #[test]
    fn rejects_probability_outside_unit_interval() {
        let settings = GeneratorSettings { subpath_probability: 1.5, ..Default::default() };
        assert!(matches!(MapGenerator::new(settings), Err(Error::InvalidConfiguration(_))));
    }
}
