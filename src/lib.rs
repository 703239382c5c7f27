//! Procedural path/maze generation with a tabular Q-learning agent that
//! learns to walk the generated map.

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod grid;
pub mod map_generator;
pub mod policy;
pub mod report;

pub use agent::{Agent, AgentParams, QLearningAgent, RandomAgent};
pub use config::Config;
pub use environment::{
    Environment, EnvironmentSettings, EpisodeStatus, TracingObserver, TrainingObserver, Transition,
    INVALID_ACTION_PENALTY,
};
pub use error::{Error, Result};
pub use grid::{Direction, Grid, Neighbors, Pos, Tile};
pub use map_generator::{GeneratorSettings, Generation, MapGenerator, RewardShaping};
pub use policy::{DetPolicy, EpsilonGreedy};
pub use report::{EpisodeSummary, TrainingReport};
