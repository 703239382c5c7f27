use ndarray::{s, Array3};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::grid::{Direction, Pos};
use crate::policy::{greedy_actions, EpsilonGreedy};

/// Something that picks moves on a grid and learns from transitions.
pub trait Agent {
    /// Picks one of `valid_actions`. Fails when there is nothing to pick.
    fn act(
        &mut self,
        state: Pos,
        valid_actions: &[Direction],
        rng: &mut dyn RngCore,
    ) -> Result<Direction>;

    fn learn(&mut self, state: Pos, action: Direction, reward: f64, next_state: Pos) -> Result<()>;

    /// Called at the start of every episode.
    fn reset(&mut self);

    fn exploration_rate(&self) -> f64;
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn act(
        &mut self,
        state: Pos,
        valid_actions: &[Direction],
        rng: &mut dyn RngCore,
    ) -> Result<Direction> {
        (**self).act(state, valid_actions, rng)
    }

    fn learn(&mut self, state: Pos, action: Direction, reward: f64, next_state: Pos) -> Result<()> {
        (**self).learn(state, action, reward, next_state)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn exploration_rate(&self) -> f64 {
        (**self).exploration_rate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentParams {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    pub exploration_decay: f64,
    pub min_exploration_rate: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        AgentParams {
            learning_rate: 0.1,
            discount_factor: 0.9,
            exploration_rate: 1.0,
            exploration_decay: 0.99,
            min_exploration_rate: 0.01,
        }
    }
}

impl AgentParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(Error::invalid(format!(
                "learning rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(Error::invalid(format!(
                "discount factor must be in [0, 1], got {}",
                self.discount_factor
            )));
        }
        if !(self.exploration_decay > 0.0 && self.exploration_decay <= 1.0) {
            return Err(Error::invalid(format!(
                "exploration decay must be in (0, 1], got {}",
                self.exploration_decay
            )));
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.min_exploration_rate) || !unit.contains(&self.exploration_rate) {
            return Err(Error::invalid("exploration rates must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Tabular Q-learning over `(row, col, action)`.
///
/// Exploration decays on every `learn` call, not per episode, and `reset`
/// only restores the exploration rate to 1.0: the table carries over
/// between episodes.
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    actions: Vec<Direction>,
    q_table: Array3<f64>,
    learning_rate: f64,
    discount_factor: f64,
    exploration: EpsilonGreedy,
}

impl QLearningAgent {
    pub fn new(
        actions: Vec<Direction>,
        state_space: (usize, usize),
        params: AgentParams,
    ) -> Result<Self> {
        params.validate()?;
        if actions.is_empty() {
            return Err(Error::invalid("action space must not be empty"));
        }
        let (rows, cols) = state_space;
        if rows == 0 || cols == 0 {
            return Err(Error::invalid(format!(
                "state space must be non-zero, got {}x{}",
                rows, cols
            )));
        }
        Ok(QLearningAgent {
            q_table: Array3::zeros((rows, cols, actions.len())),
            actions,
            learning_rate: params.learning_rate,
            discount_factor: params.discount_factor,
            exploration: EpsilonGreedy::new(
                params.exploration_rate,
                params.exploration_decay,
                params.min_exploration_rate,
            ),
        })
    }

    pub fn actions(&self) -> &[Direction] {
        &self.actions
    }

    pub fn q_table(&self) -> &Array3<f64> {
        &self.q_table
    }

    pub fn set_exploration_rate(&mut self, rate: f64) {
        self.exploration.set_rate(rate);
    }

    fn state_index(&self, state: Pos) -> Option<(usize, usize)> {
        let (rows, cols, _) = self.q_table.dim();
        if state.row < 0
            || state.col < 0
            || state.row as usize >= rows
            || state.col as usize >= cols
        {
            None
        } else {
            Some((state.row as usize, state.col as usize))
        }
    }

    fn action_index(&self, action: Direction) -> Option<usize> {
        self.actions.iter().position(|&a| a == action)
    }

    fn checked_state(&self, state: Pos) -> Result<(usize, usize)> {
        let (rows, cols, _) = self.q_table.dim();
        self.state_index(state).ok_or(Error::OutOfBounds { pos: state, rows, cols })
    }

    fn checked_action(&self, action: Direction) -> Result<usize> {
        self.action_index(action).ok_or_else(|| {
            Error::invalid(format!("action {:?} is not in the action space", action))
        })
    }

    pub fn q_value(&self, state: Pos, action: Direction) -> Option<f64> {
        let (row, col) = self.state_index(state)?;
        let a = self.action_index(action)?;
        Some(self.q_table[[row, col, a]])
    }

    pub fn set_q_value(&mut self, state: Pos, action: Direction, value: f64) -> Result<()> {
        let (row, col) = self.checked_state(state)?;
        let a = self.checked_action(action)?;
        self.q_table[[row, col, a]] = value;
        Ok(())
    }

    /// Best value over all actions of `state`, `None` outside the table.
    pub fn max_q(&self, state: Pos) -> Option<f64> {
        let (row, col) = self.state_index(state)?;
        self.q_table
            .slice(s![row, col, ..])
            .iter()
            .map(|&q| OrderedFloat(q))
            .max()
            .map(OrderedFloat::into_inner)
    }
}

impl Agent for QLearningAgent {
    fn act(
        &mut self,
        state: Pos,
        valid_actions: &[Direction],
        rng: &mut dyn RngCore,
    ) -> Result<Direction> {
        if valid_actions.is_empty() {
            return Err(Error::NoValidDirections(state));
        }
        self.checked_state(state)?;

        let candidates = if self.exploration.explore(&mut *rng) {
            valid_actions.to_vec()
        } else {
            greedy_actions(valid_actions, |a| self.q_value(state, a).unwrap_or(f64::NEG_INFINITY))
        };
        candidates
            .choose(rng)
            .copied()
            .ok_or(Error::NoValidDirections(state))
    }

    fn learn(&mut self, state: Pos, action: Direction, reward: f64, next_state: Pos) -> Result<()> {
        let (row, col) = self.checked_state(state)?;
        let a = self.checked_action(action)?;

        // States off the table have no future value.
        let max_future = self.max_q(next_state).unwrap_or(0.0);
        let current = self.q_table[[row, col, a]];
        let td_error = reward + self.discount_factor * max_future - current;
        self.q_table[[row, col, a]] = current + self.learning_rate * td_error;

        self.exploration.decay();
        Ok(())
    }

    fn reset(&mut self) {
        self.exploration.reset();
    }

    fn exploration_rate(&self) -> f64 {
        self.exploration.rate()
    }
}

/// Uniform choice among valid moves. Learns nothing.
#[derive(Debug, Clone, Default)]
pub struct RandomAgent;

impl Agent for RandomAgent {
    fn act(
        &mut self,
        state: Pos,
        valid_actions: &[Direction],
        rng: &mut dyn RngCore,
    ) -> Result<Direction> {
        valid_actions
            .choose(rng)
            .copied()
            .ok_or(Error::NoValidDirections(state))
    }

    fn learn(
        &mut self,
        _state: Pos,
        _action: Direction,
        _reward: f64,
        _next_state: Pos,
    ) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn exploration_rate(&self) -> f64 {
        1.0
    }
}
