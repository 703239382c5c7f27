use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub row: i32,
    pub col: i32,
}

impl Pos {
    pub const fn new(row: i32, col: i32) -> Self {
        Pos { row, col }
    }

    /// Raw offset, no bounds check. `None` when a coordinate leaves `i32`.
    pub fn offset(self, direction: Direction) -> Option<Pos> {
        let (d_row, d_col) = direction.into_vector();
        Some(Pos::new(self.row.checked_add(d_row)?, self.col.checked_add(d_col)?))
    }

    /// Euclidean distance in grid units.
    pub fn distance(self, other: Pos) -> f64 {
        let d_row = f64::from(other.row) - f64::from(self.row);
        let d_col = f64::from(other.col) - f64::from(self.col);
        (d_row * d_row + d_col * d_col).sqrt()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// Action
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    pub const CARDINAL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
    ];

    /// (row, col) delta
    pub fn into_vector(self) -> (i32, i32) {
        match self {
            Direction::Up        => (-1,  0),
            Direction::Down      => ( 1,  0),
            Direction::Left      => ( 0, -1),
            Direction::Right     => ( 0,  1),
            Direction::UpLeft    => (-1, -1),
            Direction::UpRight   => (-1,  1),
            Direction::DownLeft  => ( 1, -1),
            Direction::DownRight => ( 1,  1),
        }
    }

    /// The movement set used by agents: 4-connected.
    pub fn actions() -> Vec<Direction> {
        Direction::CARDINAL.to_vec()
    }

    fn set(diagonal: bool) -> &'static [Direction] {
        if diagonal {
            &Direction::ALL
        } else {
            &Direction::CARDINAL
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Tile {
    pub pos: Pos,
    pub occupied: bool,
    pub reward: f64,
}

impl Tile {
    pub fn empty(pos: Pos) -> Self {
        Tile { pos, occupied: false, reward: 0.0 }
    }

    pub fn occupied(pos: Pos, reward: f64) -> Self {
        Tile { pos, occupied: true, reward }
    }
}

/// Neighbor slots of a position. A slot holds a position only when the
/// stepped cell is inside the grid *and* occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    slots: Vec<(Direction, Option<Pos>)>,
}

impl Neighbors {
    pub fn get(&self, direction: Direction) -> Option<Pos> {
        self.slots
            .iter()
            .find(|(d, _)| *d == direction)
            .and_then(|(_, pos)| *pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Direction, Option<Pos>)> {
        self.slots.iter()
    }

    pub fn present(&self) -> impl Iterator<Item = (Direction, Pos)> + '_ {
        self.slots.iter().filter_map(|(d, p)| p.map(|p| (*d, p)))
    }

    pub fn absent(&self) -> impl Iterator<Item = Direction> + '_ {
        self.slots.iter().filter(|(_, p)| p.is_none()).map(|(d, _)| *d)
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|(_, p)| p.is_some()).count()
    }

    /// Directions leading onto occupied tiles.
    pub fn directions(&self) -> Vec<Direction> {
        self.present().map(|(d, _)| d).collect()
    }
}

/// Fixed-size lattice of tiles stored row-major.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    tile_size: u32,
    max_reward: f64,
    tiles: Vec<Tile>,
    solution: Option<Pos>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize, tile_size: u32, max_reward: f64) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::invalid(format!(
                "grid size must be non-zero, got {}x{}",
                rows, cols
            )));
        }
        if rows > i32::MAX as usize || cols > i32::MAX as usize {
            return Err(Error::invalid(format!("grid size {}x{} is too large", rows, cols)));
        }
        let tiles = (0..rows * cols)
            .map(|i| Tile::empty(Pos::new((i / cols) as i32, (i % cols) as i32)))
            .collect();
        Ok(Grid { rows, cols, tile_size, max_reward, tiles, solution: None })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn max_reward(&self) -> f64 {
        self.max_reward
    }

    pub fn solution(&self) -> Option<Pos> {
        self.solution
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        if self.is_out_of_bounds(pos) {
            None
        } else {
            Some(pos.row as usize * self.cols + pos.col as usize)
        }
    }

    fn out_of_bounds(&self, pos: Pos) -> Error {
        Error::OutOfBounds { pos, rows: self.rows, cols: self.cols }
    }

    pub fn is_out_of_bounds(&self, pos: Pos) -> bool {
        pos.row < 0 || pos.col < 0 || pos.row as usize >= self.rows || pos.col as usize >= self.cols
    }

    pub fn get_tile(&self, pos: Pos) -> Option<&Tile> {
        self.index(pos).map(|i| &self.tiles[i])
    }

    pub fn set_tile(&mut self, pos: Pos, tile: Tile) -> Result<()> {
        let i = self.index(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        self.tiles[i] = Tile { pos, ..tile };
        Ok(())
    }

    pub fn set_reward(&mut self, pos: Pos, reward: f64) -> Result<()> {
        let i = self.index(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        self.tiles[i].reward = reward;
        Ok(())
    }

    pub fn mark_occupied(&mut self, pos: Pos) -> Result<()> {
        let i = self.index(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        self.tiles[i].occupied = true;
        Ok(())
    }

    /// Fails with `OutOfBounds` for coordinates outside the grid.
    pub fn is_empty(&self, pos: Pos) -> Result<bool> {
        self.get_tile(pos)
            .map(|tile| !tile.occupied)
            .ok_or_else(|| self.out_of_bounds(pos))
    }

    fn is_occupied(&self, pos: Pos) -> bool {
        self.get_tile(pos).map_or(false, |tile| tile.occupied)
    }

    pub fn get_position_following_direction(&self, pos: Pos, direction: Direction) -> Option<Pos> {
        pos.offset(direction).filter(|&next| !self.is_out_of_bounds(next))
    }

    pub fn get_neighbors(&self, pos: Pos, diagonal: bool) -> Neighbors {
        let slots = Direction::set(diagonal)
            .iter()
            .map(|&direction| {
                let next = pos.offset(direction).filter(|&next| self.is_occupied(next));
                (direction, next)
            })
            .collect();
        Neighbors { slots }
    }

    /// Carves the cell next to `from` in `direction`, copying the reward of `from`.
    pub fn add_on(&mut self, from: Pos, direction: Direction) -> Result<Tile> {
        let reward = self.get_tile(from).ok_or_else(|| self.out_of_bounds(from))?.reward;
        let target = match from.offset(direction) {
            Some(target) if !self.is_out_of_bounds(target) => target,
            Some(target) => return Err(self.out_of_bounds(target)),
            None => return Err(self.out_of_bounds(from)),
        };
        if self.is_occupied(target) {
            return Err(Error::AlreadyOccupied(target));
        }
        let tile = Tile::occupied(target, reward);
        self.set_tile(target, tile)?;
        Ok(tile)
    }

    pub fn is_terminal(&self, pos: Pos) -> bool {
        !self.is_out_of_bounds(pos) && self.get_neighbors(pos, false).count() == 1
    }

    /// Occupied tiles with exactly one occupied neighbor, row-major.
    pub fn terminal_cells(&self) -> Vec<Pos> {
        self.occupied_tiles()
            .filter(|tile| self.is_terminal(tile.pos))
            .map(|tile| tile.pos)
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tile> {
        self.tiles.iter()
    }

    pub fn occupied_tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().filter(|tile| tile.occupied)
    }

    pub fn center(&self) -> Pos {
        Pos::new((self.rows / 2) as i32, (self.cols / 2) as i32)
    }

    /// Picks the goal among occupied cells (or only terminal ones) and gives it `max_reward`.
    pub fn generate_random_solution<R: Rng + ?Sized>(
        &mut self,
        only_terminal: bool,
        rng: &mut R,
    ) -> Result<Tile> {
        let candidates: Vec<Pos> = if only_terminal {
            self.terminal_cells()
        } else {
            self.occupied_tiles().map(|tile| tile.pos).collect()
        };
        let pos = *candidates.choose(rng).ok_or_else(|| {
            Error::invalid(if only_terminal {
                "no terminal cells to place a solution on"
            } else {
                "no occupied cells to place a solution on"
            })
        })?;

        let tile = Tile::occupied(pos, self.max_reward);
        self.set_tile(pos, tile)?;
        self.solution = Some(pos);
        debug!(%pos, candidates = candidates.len(), only_terminal, "solution chosen");
        Ok(tile)
    }

    /// Pins the solution to a known occupied cell.
    pub fn set_solution(&mut self, pos: Pos) -> Result<()> {
        if self.is_empty(pos)? {
            return Err(Error::invalid(format!("solution {} must be an occupied cell", pos)));
        }
        self.set_reward(pos, self.max_reward)?;
        self.solution = Some(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index_is_row_major() {
        let grid = Grid::new(3, 4, 32, 10.0).unwrap();
        let tiles: Vec<Pos> = grid.iter().map(|t| t.pos).collect();
        assert_eq!(tiles[0], Pos::new(0, 0));
        assert_eq!(tiles[5], Pos::new(1, 1));
        assert_eq!(tiles[11], Pos::new(2, 3));
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        assert!(matches!(Grid::new(0, 5, 32, 10.0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn diagonal_neighbors_have_eight_slots() {
        let grid = Grid::new(3, 3, 32, 10.0).unwrap();
        assert_eq!(grid.get_neighbors(Pos::new(1, 1), true).iter().count(), 8);
        assert_eq!(grid.get_neighbors(Pos::new(1, 1), false).iter().count(), 4);
    }
}
