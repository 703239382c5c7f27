use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{error, info, trace, warn};

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::grid::{Direction, Grid, Pos};
use crate::report::EpisodeSummary;

/// Reward for a move that ends outside the grid or on an empty tile.
pub const INVALID_ACTION_PENALTY: f64 = -100.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Running,
    /// Goal reached.
    Done,
    /// Step budget exhausted.
    Truncated,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transition {
    pub step: usize,
    pub from: Pos,
    pub action: Direction,
    pub reward: f64,
    pub to: Pos,
    pub status: EpisodeStatus,
}

/// Sink for training progress. Both hooks default to doing nothing.
pub trait TrainingObserver {
    fn on_step(&mut self, _transition: &Transition) {}

    fn on_episode(&mut self, _summary: &EpisodeSummary) {}
}

impl TrainingObserver for () {}

impl<T: TrainingObserver + ?Sized> TrainingObserver for &mut T {
    fn on_step(&mut self, transition: &Transition) {
        (**self).on_step(transition)
    }

    fn on_episode(&mut self, summary: &EpisodeSummary) {
        (**self).on_episode(summary)
    }
}

impl<A: TrainingObserver, B: TrainingObserver> TrainingObserver for (A, B) {
    fn on_step(&mut self, transition: &Transition) {
        self.0.on_step(transition);
        self.1.on_step(transition);
    }

    fn on_episode(&mut self, summary: &EpisodeSummary) {
        self.0.on_episode(summary);
        self.1.on_episode(summary);
    }
}

/// Logs episode outcomes at info and, optionally, every transition at trace.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    pub log_steps: bool,
}

impl TracingObserver {
    pub fn new(log_steps: bool) -> Self {
        TracingObserver { log_steps }
    }
}

impl TrainingObserver for TracingObserver {
    fn on_step(&mut self, t: &Transition) {
        if self.log_steps {
            trace!(
                step = t.step,
                from = %t.from,
                action = ?t.action,
                reward = t.reward,
                to = %t.to,
                "step"
            );
        }
    }

    fn on_episode(&mut self, s: &EpisodeSummary) {
        match s.outcome {
            EpisodeStatus::Done => info!(
                episode = s.episode,
                steps = s.steps,
                reward = s.total_reward,
                "agent reached the solution"
            ),
            _ => info!(
                episode = s.episode,
                steps = s.steps,
                reward = s.total_reward,
                "max steps reached without finding the solution"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSettings {
    pub start: Pos,
    pub max_steps: usize,
    pub episodes: usize,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        EnvironmentSettings {
            start: Pos::new(0, 0),
            max_steps: 1_000,
            episodes: 1_000,
        }
    }
}

/// Drives an agent over a generated grid, episode after episode.
pub struct Environment<A: Agent> {
    grid: Grid,
    agent: A,
    rng: StdRng,
    settings: EnvironmentSettings,
    solution: Pos,
    position: Pos,
    current_step: usize,
    episode_reward: f64,
    status: EpisodeStatus,
}

impl<A: Agent> Environment<A> {
    /// The grid must already carry a solution and `settings.start` must be occupied.
    pub fn new(grid: Grid, agent: A, rng: StdRng, settings: EnvironmentSettings) -> Result<Self> {
        let solution = grid
            .solution()
            .ok_or_else(|| Error::invalid("grid has no solution cell"))?;
        if grid.is_empty(settings.start)? {
            return Err(Error::invalid(format!("start {} is not an occupied cell", settings.start)));
        }
        if settings.max_steps == 0 || settings.episodes == 0 {
            return Err(Error::invalid("episodes and max steps must be at least 1"));
        }
        let start = settings.start;
        let mut env = Environment {
            grid,
            agent,
            rng,
            settings,
            solution,
            position: start,
            current_step: 0,
            episode_reward: 0.0,
            status: EpisodeStatus::Running,
        };
        env.reset_position();
        Ok(env)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut A {
        &mut self.agent
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    pub fn settings(&self) -> &EnvironmentSettings {
        &self.settings
    }

    pub fn position(&self) -> Pos {
        self.position
    }

    pub fn solution(&self) -> Pos {
        self.solution
    }

    pub fn status(&self) -> EpisodeStatus {
        self.status
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    fn reset_position(&mut self) {
        self.position = self.settings.start;
        self.current_step = 0;
        self.episode_reward = 0.0;
        self.status = if self.position == self.solution {
            EpisodeStatus::Done
        } else {
            EpisodeStatus::Running
        };
    }

    /// Resets the agent's exploration and puts it back on the start cell.
    pub fn reset_episode(&mut self) {
        self.agent.reset();
        self.reset_position();
    }

    /// One move of the agent followed by one learning update.
    ///
    /// Fails with `NoValidDirections` when the agent stands on a cell with no
    /// occupied neighbor, which a carved map never produces.
    pub fn step(&mut self) -> Result<Transition> {
        let from = self.position;
        let valid_actions = self.grid.get_neighbors(from, false).directions();
        if valid_actions.is_empty() {
            error!(pos = %from, "no valid actions available");
            return Err(Error::NoValidDirections(from));
        }

        let action = self.agent.act(from, &valid_actions, &mut self.rng)?;
        // A move past the coordinate range leaves the agent where it is.
        let next = from.offset(action).unwrap_or(from);
        let reward = match self.grid.get_tile(next) {
            Some(tile) if tile.occupied && next != from => tile.reward,
            _ => {
                warn!(%from, ?action, to = %next, "invalid move penalized");
                INVALID_ACTION_PENALTY
            }
        };

        self.agent.learn(from, action, reward, next)?;

        self.position = next;
        self.current_step += 1;
        self.episode_reward += reward;
        self.status = if next == self.solution {
            EpisodeStatus::Done
        } else if self.current_step >= self.settings.max_steps {
            EpisodeStatus::Truncated
        } else {
            EpisodeStatus::Running
        };

        Ok(Transition {
            step: self.current_step,
            from,
            action,
            reward,
            to: next,
            status: self.status,
        })
    }

    pub fn run_episode<O: TrainingObserver + ?Sized>(
        &mut self,
        episode: usize,
        observer: &mut O,
    ) -> Result<EpisodeSummary> {
        self.reset_episode();
        while self.status == EpisodeStatus::Running {
            let transition = self.step()?;
            observer.on_step(&transition);
        }

        let summary = EpisodeSummary {
            episode,
            outcome: self.status,
            steps: self.current_step,
            total_reward: self.episode_reward,
            final_exploration_rate: self.agent.exploration_rate(),
        };
        observer.on_episode(&summary);
        Ok(summary)
    }

    /// Runs every configured episode. The first error aborts the run.
    pub fn run<O: TrainingObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> Result<Vec<EpisodeSummary>> {
        (0..self.settings.episodes)
            .map(|episode| self.run_episode(episode, &mut *observer))
            .collect()
    }
}
