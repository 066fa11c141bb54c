use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rand::{SeedableRng, rngs::StdRng};
use search_world_core::{
    Position,
    agent::{Agent, AgentStatus, MazeAgent, PathPlanner, TaskOrder},
    local::{AnnealingConfig, HillClimbing, SimulatedAnnealing},
    map::{ParsedMap, TerrainGrid, load_map_from_string},
    maze::MazeConfig,
    queens::{GaConfig, GaOutcome, QueensGa},
    search::{Algorithm, search},
    simulation::{MazeSimulation, RunState, TaskSimulation, run_agent},
    tasks::{TaskGrid, TaskGridConfig},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Seed for every random choice; drawn at random when omitted
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Stop a run after this many ticks
    #[arg(long, global = true, default_value_t = 100_000)]
    max_ticks: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Robot visiting tasks on a grid with obstacles
    Tasks {
        #[arg(short, long, default_value_t = Algorithm::AStar)]
        algorithm: Algorithm,
        #[arg(long, default_value_t = 16)]
        size: usize,
        #[arg(long, default_value_t = 5)]
        tasks: usize,
        #[arg(long, default_value_t = 0.2)]
        obstacle_ratio: f64,
        /// Visit the nearest remaining task first instead of list order
        #[arg(long)]
        nearest: bool,
        /// Only place tasks reachable from the start
        #[arg(long)]
        reachable: bool,
        /// Text map with S and T markers, used instead of a random grid
        #[arg(short, long, value_name = "MAP_FILE")]
        map: Option<PathBuf>,
    },
    /// Solver walking a generated maze
    Maze {
        #[arg(short, long, default_value_t = Algorithm::AStar)]
        algorithm: Algorithm,
        #[arg(long, default_value_t = 21)]
        width: usize,
        #[arg(long, default_value_t = 21)]
        height: usize,
        #[arg(long, default_value_t = 0.75)]
        complexity: f64,
        #[arg(long, default_value_t = 0.75)]
        density: f64,
        /// Text map with S and G markers, used instead of a generated maze
        #[arg(short, long, value_name = "MAP_FILE")]
        map: Option<PathBuf>,
    },
    /// Genetic algorithm for the eight queens puzzle
    Queens {
        #[arg(long, default_value_t = 1000)]
        max_generations: usize,
        #[arg(long, default_value_t = 100)]
        population: usize,
        #[arg(long, default_value_t = 0.1)]
        mutation_rate: f64,
        /// Seconds to pause between generations
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
    },
    /// Hill climbing or simulated annealing from start to goal
    Local {
        #[arg(long, value_enum, default_value_t = Method::Hill)]
        method: Method,
        #[arg(long, default_value_t = 10)]
        size: usize,
        #[arg(long, default_value_t = 0.2)]
        obstacle_ratio: f64,
        /// Text map with S and G markers, used instead of a random grid
        #[arg(short, long, value_name = "MAP_FILE")]
        map: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Method {
    Hill,
    Anneal,
}

#[derive(Serialize, Debug)]
struct TaskSummary {
    seed: u64,
    algorithm: Algorithm,
    order: TaskOrder,
    state: RunState,
    ticks: usize,
    path_length: usize,
    tasks: Vec<Position>,
    completed: Vec<Position>,
}

#[derive(Serialize, Debug)]
struct MazeSummary {
    seed: u64,
    algorithm: Algorithm,
    width: usize,
    height: usize,
    state: RunState,
    ticks: usize,
    path_length: usize,
}

#[derive(Serialize, Debug)]
struct QueensSummary {
    seed: u64,
    outcome: GaOutcome,
}

#[derive(Serialize, Debug)]
struct LocalSummary {
    seed: u64,
    method: Method,
    start: Position,
    goal: Position,
    status: AgentStatus,
    final_position: Position,
    steps: usize,
    /// Shortest path length in cells, if the goal is reachable at all.
    optimal_length: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let seed = args.seed.unwrap_or_else(rand::random);
    log::info!("using seed {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    match args.command {
        Command::Tasks {
            algorithm,
            size,
            tasks,
            obstacle_ratio,
            nearest,
            reachable,
            map,
        } => {
            let order = if nearest {
                TaskOrder::NearestFirst
            } else {
                TaskOrder::Sequential
            };
            let mut sim = match map {
                Some(path) => TaskSimulation::from_map(read_map(&path)?, algorithm, order)?,
                None => {
                    let config = TaskGridConfig::square(size)
                        .with_tasks(tasks)
                        .with_obstacle_ratio(obstacle_ratio)
                        .with_require_reachable(reachable);
                    TaskSimulation::new(config, algorithm, order, &mut rng)
                        .context("Failed to generate task grid")?
                }
            };

            sim.start();
            while sim.state() == RunState::Running && sim.ticks() < args.max_ticks {
                sim.tick();
            }

            let summary = TaskSummary {
                seed,
                algorithm,
                order,
                state: sim.state(),
                ticks: sim.ticks(),
                path_length: sim.path_length(),
                tasks: sim.agent().tasks().to_vec(),
                completed: sim.completed_tasks().to_vec(),
            };
            if args.json {
                print_json(&summary)?;
            } else {
                println!("{}", sim.grid());
                for task in &summary.completed {
                    let number = sim.task_number(*task).unwrap_or_default();
                    println!("task {number} at {task} completed");
                }
                println!(
                    "{algorithm} ({order:?}): {:?} after {} ticks, {}/{} tasks, path length {}",
                    summary.state,
                    summary.ticks,
                    summary.completed.len(),
                    summary.tasks.len(),
                    summary.path_length
                );
            }
        }
        Command::Maze {
            algorithm,
            width,
            height,
            complexity,
            density,
            map,
        } => {
            let mut sim = match map {
                Some(path) => MazeSimulation::from_map(read_map(&path)?, algorithm)?,
                None => {
                    let config = MazeConfig::new(width, height)
                        .with_complexity(complexity)
                        .with_density(density);
                    MazeSimulation::new(config, algorithm, &mut rng)
                        .context("Failed to generate maze")?
                }
            };

            sim.start();
            while sim.state() == RunState::Running && sim.ticks() < args.max_ticks {
                sim.tick();
            }

            let summary = MazeSummary {
                seed,
                algorithm,
                width: sim.grid().width(),
                height: sim.grid().height(),
                state: sim.state(),
                ticks: sim.ticks(),
                path_length: sim.path_length(),
            };
            if args.json {
                print_json(&summary)?;
            } else {
                println!("{}", sim.grid());
                println!(
                    "{algorithm}: {:?} after {} ticks, path length {}",
                    summary.state, summary.ticks, summary.path_length
                );
            }
        }
        Command::Queens {
            max_generations,
            population,
            mutation_rate,
            delay,
        } => {
            if !(delay.is_finite() && delay >= 0.0) {
                bail!("Delay must be a non-negative number of seconds, got {delay}");
            }
            let config = GaConfig::default()
                .with_population_size(population)
                .with_mutation_rate(mutation_rate)
                .with_max_generations(max_generations);
            let mut ga = QueensGa::new(config, &mut rng).context("Invalid GA configuration")?;

            let outcome = if delay > 0.0 {
                let pause = Duration::from_secs_f64(delay);
                ga.run_with(|report| {
                    log::info!(
                        "generation {}: best fitness {} (mean {:.2})",
                        report.generation,
                        report.best_fitness,
                        report.mean_fitness
                    );
                    thread::sleep(pause);
                })
            } else {
                ga.run()
            };

            if args.json {
                print_json(&QueensSummary { seed, outcome })?;
            } else {
                match outcome {
                    GaOutcome::Solved {
                        generation,
                        solution,
                    } => println!("solved in generation {generation}: {solution:?}"),
                    GaOutcome::Exhausted {
                        generations,
                        best,
                        best_fitness,
                    } => println!(
                        "no solution after {generations} generations, best {best:?} with fitness {best_fitness}"
                    ),
                }
            }
        }
        Command::Local {
            method,
            size,
            obstacle_ratio,
            map,
        } => {
            let parsed = match map {
                Some(path) => read_map(&path)?,
                None => random_local_map(size, obstacle_ratio, &mut rng)?,
            };
            let start = parsed.start.context("Map has no start marker")?;
            let goal = parsed.goal.context("Map has no goal marker")?;
            let grid = Arc::new(parsed.grid);

            let optimal_length =
                search(Algorithm::Bfs, start, goal, &grid, &Default::default()).map(|p| p.len());
            let (status, final_position, steps) = match method {
                Method::Hill => walk(start, goal, &grid, HillClimbing, args.max_ticks)?,
                Method::Anneal => {
                    let planner = SimulatedAnnealing::new(
                        AnnealingConfig::default(),
                        StdRng::seed_from_u64(seed),
                    )?;
                    walk(start, goal, &grid, planner, args.max_ticks)?
                }
            };

            let summary = LocalSummary {
                seed,
                method,
                start,
                goal,
                status,
                final_position,
                steps,
                optimal_length,
            };
            if args.json {
                print_json(&summary)?;
            } else {
                println!("{grid}");
                println!(
                    "{method:?}: {status:?} at {final_position} after {steps} steps (shortest path {})",
                    optimal_length.map_or("none".to_string(), |len| (len - 1).to_string())
                );
            }
        }
    }

    Ok(())
}

fn read_map(path: &Path) -> Result<ParsedMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read map file {}", path.display()))?;
    load_map_from_string(&text).with_context(|| format!("Failed to parse map {}", path.display()))
}

/// Random grid with the start in the top-left corner and a single reachable
/// goal drawn like a task.
fn random_local_map(size: usize, obstacle_ratio: f64, rng: &mut StdRng) -> Result<ParsedMap> {
    let config = TaskGridConfig::square(size)
        .with_tasks(1)
        .with_obstacle_ratio(obstacle_ratio)
        .with_require_reachable(true);
    let task_grid = TaskGrid::generate(&config, rng).context("Failed to generate grid")?;
    let start = task_grid.start();
    let (grid, tasks) = task_grid.into_parts();
    let Some(goal) = tasks.first().copied() else {
        bail!("Generated grid has no goal");
    };
    Ok(ParsedMap {
        grid,
        start: Some(start),
        goal: Some(goal),
        tasks: Vec::new(),
    })
}

fn walk<P: PathPlanner>(
    start: Position,
    goal: Position,
    grid: &Arc<TerrainGrid>,
    planner: P,
    max_ticks: usize,
) -> Result<(AgentStatus, Position, usize)> {
    let mut agent = MazeAgent::new(start, goal, Arc::clone(grid), planner)?;
    agent.find_path();
    let steps = run_agent(&mut agent, max_ticks);
    Ok((agent.status(), agent.position(), steps))
}

fn print_json<T: Serialize>(summary: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to encode summary")?;
    println!("{json}");
    Ok(())
}
