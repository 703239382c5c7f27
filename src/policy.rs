use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::agent::QLearningAgent;
use crate::grid::{Direction, Grid, Pos};

/// Epsilon-greedy exploration rate with multiplicative decay.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonGreedy {
    rate: f64,
    decay: f64,
    min_rate: f64,
}

impl EpsilonGreedy {
    pub fn new(rate: f64, decay: f64, min_rate: f64) -> Self {
        EpsilonGreedy { rate, decay, min_rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub fn explore<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() < self.rate
    }

    pub fn decay(&mut self) {
        self.rate = (self.rate * self.decay).max(self.min_rate);
    }

    pub fn reset(&mut self) {
        self.rate = 1.0;
    }
}

/// Every action of `valid` whose value equals the maximum.
pub fn greedy_actions<F>(valid: &[Direction], value: F) -> Vec<Direction>
where
    F: Fn(Direction) -> f64,
{
    let best = match valid.iter().map(|&a| OrderedFloat(value(a))).max() {
        Some(best) => best,
        None => return Vec::new(),
    };
    valid
        .iter()
        .copied()
        .filter(|&a| OrderedFloat(value(a)) == best)
        .collect()
}

// Represents deterministic policy
#[derive(Debug, Clone, Default)]
pub struct DetPolicy {
    pub policy: HashMap<Pos, Direction>,
}

impl DetPolicy {
    /// Best valid action for every occupied cell. Ties go to the first
    /// direction in `Direction::CARDINAL` order.
    pub fn from_agent(agent: &QLearningAgent, grid: &Grid) -> Self {
        let mut policy = HashMap::new();
        for tile in grid.occupied_tiles() {
            let valid = grid.get_neighbors(tile.pos, false).directions();
            let best = greedy_actions(&valid, |a| {
                agent.q_value(tile.pos, a).unwrap_or(f64::NEG_INFINITY)
            });
            if let Some(&action) = best.first() {
                policy.insert(tile.pos, action);
            }
        }
        DetPolicy { policy }
    }

    pub fn action(&self, pos: Pos) -> Option<Direction> {
        self.policy.get(&pos).copied()
    }

    /// Follows the policy from `start`; returns the visited cells if `goal`
    /// is reached within `max_steps`.
    pub fn rollout(
        &self,
        grid: &Grid,
        start: Pos,
        goal: Pos,
        max_steps: usize,
    ) -> Option<Vec<Pos>> {
        let mut path = vec![start];
        let mut current = start;
        for _ in 0..max_steps {
            if current == goal {
                break;
            }
            let action = self.action(current)?;
            current = grid.get_position_following_direction(current, action)?;
            path.push(current);
        }
        if current == goal {
            Some(path)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_actions_keeps_all_ties() {
        let valid = [Direction::Up, Direction::Left, Direction::Right];
        let best = greedy_actions(&valid, |a| match a {
            Direction::Left => 1.0,
            _ => 3.0,
        });
        assert_eq!(best, vec![Direction::Up, Direction::Right]);
    }

    #[test]
    fn greedy_actions_of_nothing_is_empty() {
        assert!(greedy_actions(&[], |_| 0.0).is_empty());
    }

    #[test]
    fn decay_stops_at_floor() {
        let mut eps = EpsilonGreedy::new(0.02, 0.5, 0.015);
        eps.decay();
        assert_eq!(eps.rate(), 0.015);
        eps.reset();
        assert_eq!(eps.rate(), 1.0);
    }
}
