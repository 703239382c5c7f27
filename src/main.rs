use std::env;
use std::process;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn, Level};

use qmaze::{
    Config, DetPolicy, Direction, Environment, Grid, MapGenerator, QLearningAgent, Result,
    TracingObserver, TrainingReport,
};

fn run(config: &Config) -> Result<()> {
    // One stream for generation and training.
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut grid = Grid::new(
        config.grid.rows,
        config.grid.cols,
        config.grid.tile_size,
        config.rewards.max_reward,
    )?;
    let generator = MapGenerator::new(config.generator_settings())?;
    let start = config.training.start;

    // The generator overwrites the grid
    generator.generate_map(&mut grid, start, &mut rng)?;
    let solution = grid.generate_random_solution(config.rewards.only_terminal_solution, &mut rng)?;
    generator.apply_rewards(&mut grid, solution.pos, config.rewards.shaping)?;
    info!(solution = %solution.pos, shaping = ?config.rewards.shaping, "solution placed");

    let agent = QLearningAgent::new(Direction::actions(), grid.size(), config.agent_params())?;
    let mut env = Environment::new(grid, agent, rng, config.environment_settings())?;

    let mut report = TrainingReport::default();
    env.run(&mut (TracingObserver::new(config.logging.log_steps), &mut report))?;
    info!(
        episodes = report.episodes().len(),
        successes = report.successes(),
        success_rate = report.success_rate(),
        "training finished"
    );

    let policy = DetPolicy::from_agent(env.agent(), env.grid());
    match policy.rollout(env.grid(), start, env.solution(), config.training.max_steps) {
        Some(path) => info!(steps = path.len() - 1, "greedy policy reaches the solution"),
        None => warn!("greedy policy does not reach the solution"),
    }

    if let Some(path) = &config.training.report_path {
        report.save_csv(path)?;
    }
    Ok(())
}

fn main() {
    let path = env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    // Parsed before logging is up; outcomes are reported once it is.
    let loaded = Config::load(&path);

    let level = match &loaded {
        Ok(Some(config)) => config.logging.level.parse::<Level>().unwrap_or(Level::INFO),
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = loaded.map(|config| match config {
        Some(config) => {
            info!(%path, "loaded configuration");
            config
        }
        None => {
            warn!(%path, "no config file found, using default configuration");
            Config::default()
        }
    });

    let result = config.and_then(|config| run(&config));
    if let Err(err) = result {
        error!(%err, "aborted");
        process::exit(1);
    }
}
