use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::agent::AgentParams;
use crate::environment::EnvironmentSettings;
use crate::error::{Error, Result};
use crate::grid::Pos;
use crate::map_generator::{GeneratorSettings, RewardShaping};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Absent means a fresh random seed every run.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_cols")]
    pub cols: usize,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_subpath_probability")]
    pub subpath_probability: f64,
    #[serde(default = "default_max_cell_neighbors")]
    pub max_cell_neighbors: usize,
    #[serde(default = "default_max_branch_depth")]
    pub max_branch_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_max_reward")]
    pub max_reward: f64,
    #[serde(default)]
    pub min_reward: f64,
    #[serde(default = "default_shaping")]
    pub shaping: RewardShaping,
    #[serde(default)]
    pub only_terminal_solution: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    #[serde(default = "default_exploration_rate")]
    pub exploration_rate: f64,
    #[serde(default = "default_exploration_decay")]
    pub exploration_decay: f64,
    #[serde(default = "default_min_exploration_rate")]
    pub min_exploration_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_episodes")]
    pub episodes: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_start")]
    pub start: Pos,
    #[serde(default)]
    pub report_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub log_steps: bool,
}

// Default values
fn default_rows() -> usize { 20 }
fn default_cols() -> usize { 20 }
fn default_tile_size() -> u32 { 64 }
fn default_max_length() -> usize { 100 }
fn default_subpath_probability() -> f64 { 0.5 }
fn default_max_cell_neighbors() -> usize { 2 }
fn default_max_branch_depth() -> usize { 256 }
fn default_max_reward() -> f64 { 10.0 }
fn default_shaping() -> RewardShaping { RewardShaping::NormalizedEuclidean }
fn default_learning_rate() -> f64 { 0.1 }
fn default_discount_factor() -> f64 { 0.9 }
fn default_exploration_rate() -> f64 { 1.0 }
fn default_exploration_decay() -> f64 { 0.99 }
fn default_min_exploration_rate() -> f64 { 0.01 }
fn default_episodes() -> usize { 1_000 }
fn default_max_steps() -> usize { 1_000 }
fn default_start() -> Pos { Pos::new(0, 0) }
fn default_level() -> String { "info".to_string() }

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            tile_size: default_tile_size(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            subpath_probability: default_subpath_probability(),
            max_cell_neighbors: default_max_cell_neighbors(),
            max_branch_depth: default_max_branch_depth(),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            max_reward: default_max_reward(),
            min_reward: 0.0,
            shaping: default_shaping(),
            only_terminal_solution: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            exploration_rate: default_exploration_rate(),
            exploration_decay: default_exploration_decay(),
            min_exploration_rate: default_min_exploration_rate(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: default_episodes(),
            max_steps: default_max_steps(),
            start: default_start(),
            report_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_steps: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            grid: GridConfig::default(),
            generator: GeneratorConfig::default(),
            rewards: RewardsConfig::default(),
            agent: AgentConfig::default(),
            training: TrainingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates `path`. `Ok(None)` when the file does not exist.
    ///
    /// Does not log, so it can run before a subscriber is installed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::ConfigRead { path: path.to_path_buf(), source }),
        }
    }

    /// Load configuration from file, or use defaults if the file doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path)? {
            Some(config) => {
                info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            None => {
                warn!(path = %path.display(), "no config file found, using default configuration");
                Ok(Config::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid.rows == 0 || self.grid.cols == 0 {
            return Err(Error::invalid("grid rows and cols must be at least 1"));
        }
        if self.grid.tile_size == 0 {
            return Err(Error::invalid("tile size must be at least 1"));
        }
        let start = self.training.start;
        if start.row < 0
            || start.col < 0
            || start.row as usize >= self.grid.rows
            || start.col as usize >= self.grid.cols
        {
            return Err(Error::OutOfBounds {
                pos: start,
                rows: self.grid.rows,
                cols: self.grid.cols,
            });
        }
        if self.rewards.min_reward >= self.rewards.max_reward {
            return Err(Error::invalid(format!(
                "min reward {} must be below max reward {}",
                self.rewards.min_reward, self.rewards.max_reward
            )));
        }
        if self.training.episodes == 0 || self.training.max_steps == 0 {
            return Err(Error::invalid("episodes and max steps must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.generator.subpath_probability) {
            return Err(Error::invalid("subpath probability must be in [0, 1]"));
        }
        if self.generator.max_branch_depth == 0 || self.generator.max_cell_neighbors == 0 {
            return Err(Error::invalid(
                "max branch depth and max cell neighbors must be at least 1",
            ));
        }
        self.agent_params().validate()
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            max_length: self.generator.max_length,
            subpath_probability: self.generator.subpath_probability,
            max_cell_neighbors: self.generator.max_cell_neighbors,
            max_branch_depth: self.generator.max_branch_depth,
            min_reward: self.rewards.min_reward,
        }
    }

    pub fn agent_params(&self) -> AgentParams {
        AgentParams {
            learning_rate: self.agent.learning_rate,
            discount_factor: self.agent.discount_factor,
            exploration_rate: self.agent.exploration_rate,
            exploration_decay: self.agent.exploration_decay,
            min_exploration_rate: self.agent.min_exploration_rate,
        }
    }

    pub fn environment_settings(&self) -> EnvironmentSettings {
        EnvironmentSettings {
            start: self.training.start,
            max_steps: self.training.max_steps,
            episodes: self.training.episodes,
        }
    }
}
