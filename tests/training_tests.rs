use qmaze::{
    Agent, AgentParams, DetPolicy, Direction, Environment, EnvironmentSettings, EpisodeStatus,
    Error, GeneratorSettings, Grid, MapGenerator, Pos, QLearningAgent, RandomAgent, Result,
    RewardShaping, Tile, TrainingReport, INVALID_ACTION_PENALTY,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// 3x3 grid with the middle row carved; the goal is the right end.
fn line_grid() -> Grid {
    let mut grid = Grid::new(3, 3, 32, 10.0).unwrap();
    for col in 0..3 {
        let pos = Pos::new(1, col);
        grid.set_tile(pos, Tile::occupied(pos, -1.0)).unwrap();
    }
    grid.set_solution(Pos::new(1, 2)).unwrap();
    grid
}

fn settings(start: Pos, max_steps: usize, episodes: usize) -> EnvironmentSettings {
    EnvironmentSettings { start, max_steps, episodes }
}

fn build<A: Agent>(
    grid: Grid,
    agent: A,
    seed: u64,
    settings: EnvironmentSettings,
) -> Result<Environment<A>> {
    Environment::new(grid, agent, StdRng::seed_from_u64(seed), settings)
}

fn q_agent(grid: &Grid) -> QLearningAgent {
    let params = AgentParams { min_exploration_rate: 0.0, ..AgentParams::default() };
    QLearningAgent::new(Direction::actions(), grid.size(), params).unwrap()
}

#[test]
fn trained_agent_walks_the_line_in_two_steps() {
    let grid = line_grid();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 41, settings(Pos::new(1, 0), 100, 200)).unwrap();

    let summaries = env.run(&mut ()).unwrap();
    assert_eq!(summaries.len(), 200);
    assert!(summaries.last().unwrap().reached_goal());

    let middle = Pos::new(1, 1);
    let right = env.agent().q_value(middle, Direction::Right).unwrap();
    let left = env.agent().q_value(middle, Direction::Left).unwrap();
    assert!(right > left, "right {} should beat left {}", right, left);

    env.reset_episode();
    env.agent_mut().set_exploration_rate(0.0);
    let first = env.step().unwrap();
    assert_eq!((first.from, first.action, first.to), (Pos::new(1, 0), Direction::Right, middle));
    assert_eq!(first.status, EpisodeStatus::Running);
    let second = env.step().unwrap();
    assert_eq!(second.action, Direction::Right);
    assert_eq!(second.reward, 10.0);
    assert_eq!(env.status(), EpisodeStatus::Done);
    assert_eq!(env.current_step(), 2);

    let policy = DetPolicy::from_agent(env.agent(), env.grid());
    let path = policy.rollout(env.grid(), Pos::new(1, 0), env.solution(), 10).unwrap();
    assert_eq!(path, vec![Pos::new(1, 0), middle, Pos::new(1, 2)]);
}

#[test]
fn episode_reward_improves_over_sliding_windows() {
    let grid = line_grid();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 41, settings(Pos::new(1, 0), 100, 200)).unwrap();

    let mut report = TrainingReport::default();
    env.run(&mut report).unwrap();

    let averages = report.moving_average_reward(20);
    assert_eq!(averages.len(), 181);
    let first = averages[0];
    let last = averages[averages.len() - 1];
    assert!(last >= first, "last window {} fell below first window {}", last, first);
}

#[test]
fn episodes_reset_exploration_but_keep_learning() {
    let grid = line_grid();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 2, settings(Pos::new(1, 0), 100, 1)).unwrap();

    let first = env.run_episode(0, &mut ()).unwrap();
    assert!(first.final_exploration_rate < 1.0);
    let table = env.agent().q_table().clone();
    assert!(table.iter().any(|&q| q != 0.0));

    env.reset_episode();
    assert_eq!(env.agent().exploration_rate(), 1.0);
    assert_eq!(env.agent().q_table(), &table);
    assert_eq!(env.position(), Pos::new(1, 0));
    assert_eq!(env.current_step(), 0);
}

#[test]
fn step_budget_truncates_the_episode() {
    let grid = line_grid();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 0, settings(Pos::new(1, 0), 1, 3)).unwrap();

    let summaries = env.run(&mut ()).unwrap();
    for summary in &summaries {
        assert_eq!(summary.outcome, EpisodeStatus::Truncated);
        assert_eq!(summary.steps, 1);
        assert_eq!(summary.total_reward, -1.0);
    }
}

#[test]
fn starting_on_the_solution_finishes_immediately() {
    let mut grid = Grid::new(2, 2, 32, 10.0).unwrap();
    grid.mark_occupied(Pos::new(0, 0)).unwrap();
    grid.set_solution(Pos::new(0, 0)).unwrap();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 0, settings(Pos::new(0, 0), 10, 2)).unwrap();

    let summaries = env.run(&mut ()).unwrap();
    assert!(summaries.iter().all(|s| s.reached_goal() && s.steps == 0));
}

#[test]
fn isolated_position_aborts_the_run() {
    let mut grid = Grid::new(3, 3, 32, 10.0).unwrap();
    grid.mark_occupied(Pos::new(0, 0)).unwrap();
    grid.mark_occupied(Pos::new(2, 2)).unwrap();
    grid.set_solution(Pos::new(2, 2)).unwrap();
    let agent = q_agent(&grid);
    let mut env = build(grid, agent, 0, settings(Pos::new(0, 0), 10, 5)).unwrap();

    assert!(matches!(env.run(&mut ()), Err(Error::NoValidDirections(p)) if p == Pos::new(0, 0)));
}

/// Ignores the valid set and always walks up.
struct StubbornAgent {
    rewards: Vec<f64>,
}

impl Agent for StubbornAgent {
    fn act(
        &mut self,
        _state: Pos,
        _valid: &[Direction],
        _rng: &mut dyn RngCore,
    ) -> Result<Direction> {
        Ok(Direction::Up)
    }

    fn learn(
        &mut self,
        _state: Pos,
        _action: Direction,
        reward: f64,
        _next_state: Pos,
    ) -> Result<()> {
        self.rewards.push(reward);
        Ok(())
    }

    fn reset(&mut self) {}

    fn exploration_rate(&self) -> f64 {
        0.0
    }
}

#[test]
fn moves_onto_empty_tiles_are_penalized() {
    let grid = line_grid();
    let agent = StubbornAgent { rewards: Vec::new() };
    let mut env = build(grid, agent, 0, settings(Pos::new(1, 1), 10, 1)).unwrap();

    let transition = env.step().unwrap();
    assert_eq!(transition.to, Pos::new(0, 1));
    assert_eq!(transition.reward, INVALID_ACTION_PENALTY);
    assert_eq!(env.agent().rewards, vec![INVALID_ACTION_PENALTY]);
    assert_eq!(env.position(), Pos::new(0, 1));
}

#[test]
fn environment_requires_an_occupied_start_and_a_solution() {
    let mut grid = line_grid();
    assert!(matches!(
        build(grid.clone(), RandomAgent, 0, settings(Pos::new(0, 0), 10, 1)),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        build(grid.clone(), RandomAgent, 0, settings(Pos::new(7, 0), 10, 1)),
        Err(Error::OutOfBounds { .. })
    ));

    let unsolved = Grid::new(3, 3, 32, 10.0).unwrap();
    assert!(build(unsolved, RandomAgent, 0, settings(Pos::new(0, 0), 10, 1)).is_err());

    grid.mark_occupied(Pos::new(0, 0)).unwrap();
    assert!(build(grid, RandomAgent, 0, settings(Pos::new(0, 0), 0, 1)).is_err());
}

#[test]
fn generated_map_trains_end_to_end() {
    let mut rng = StdRng::seed_from_u64(41);
    let mut grid = Grid::new(10, 10, 64, 10.0).unwrap();
    let generator = MapGenerator::new(GeneratorSettings {
        max_length: 40,
        subpath_probability: 0.5,
        ..GeneratorSettings::default()
    })
    .unwrap();
    let start = Pos::new(0, 0);
    generator.generate_map(&mut grid, start, &mut rng).unwrap();
    let solution = grid.generate_random_solution(false, &mut rng).unwrap();
    generator
        .apply_rewards(&mut grid, solution.pos, RewardShaping::NormalizedEuclidean)
        .unwrap();

    let agent =
        QLearningAgent::new(Direction::actions(), grid.size(), AgentParams::default()).unwrap();
    let mut env = Environment::new(grid, agent, rng, settings(start, 300, 30)).unwrap();

    let mut report = TrainingReport::default();
    let summaries = env.run(&mut report).unwrap();
    assert_eq!(report.episodes(), summaries.as_slice());
    for summary in &summaries {
        assert!(summary.steps <= 300);
        match summary.outcome {
            EpisodeStatus::Done => {}
            EpisodeStatus::Truncated => assert_eq!(summary.steps, 300),
            EpisodeStatus::Running => panic!("episode {} left running", summary.episode),
        }
    }

    // the agent never leaves the carved path
    let grid = env.grid();
    assert!(!grid.is_empty(env.position()).unwrap());
}

#[test]
fn random_agent_drives_the_same_loop() {
    let grid = line_grid();
    let agent: Box<dyn Agent> = Box::new(RandomAgent);
    let mut env = build(grid, agent, 5, settings(Pos::new(1, 0), 500, 10)).unwrap();
    let summaries = env.run(&mut ()).unwrap();
    assert_eq!(summaries.len(), 10);
    assert!(summaries.iter().all(|s| s.final_exploration_rate == 1.0));
}
