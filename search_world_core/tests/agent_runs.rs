use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use search_world_core::{
    Position,
    agent::{Agent, AgentStatus, MazeAgent, RobotAgent, TaskOrder},
    local::HillClimbing,
    map::load_map_from_string,
    maze::{Maze, MazeConfig},
    search::Algorithm,
    simulation::{RunState, TaskSimulation, run_agent},
    tasks::{TaskGrid, TaskGridConfig},
};

fn reachable_task_grid(config: &TaskGridConfig) -> TaskGrid {
    (0..100)
        .find_map(|seed| TaskGrid::generate(config, &mut StdRng::seed_from_u64(seed)).ok())
        .expect("no seed produced a task grid")
}

fn assert_unit_steps(steps: &[Position]) {
    for window in steps.windows(2) {
        assert!(window[0].is_adjacent(&window[1]), "{} -> {}", window[0], window[1]);
    }
}

#[test]
fn sequential_robot_completes_generated_tasks_in_order() {
    let config = TaskGridConfig::default().with_require_reachable(true);
    let task_grid = reachable_task_grid(&config);
    let tasks = task_grid.tasks().to_vec();
    let (grid, _) = task_grid.into_parts();

    let mut agent = RobotAgent::new(
        Position::new(0, 0),
        tasks.clone(),
        Arc::new(grid),
        Algorithm::AStar,
        TaskOrder::Sequential,
    )
    .unwrap();
    assert!(agent.find_initial_path());
    run_agent(&mut agent, 10_000);

    assert_eq!(agent.status(), AgentStatus::Done);
    assert_eq!(agent.completed_tasks(), tasks.as_slice());
    assert_eq!(agent.completed_tasks().len(), 5);
    assert_eq!(agent.path_traveled()[0], Position::new(0, 0));
    assert_unit_steps(agent.path_traveled());
    for position in agent.path_traveled() {
        assert!(agent.grid().is_free(*position));
    }
}

#[test]
fn every_algorithm_finishes_a_reachable_task_simulation() {
    let config = TaskGridConfig::square(12)
        .with_tasks(4)
        .with_require_reachable(true);
    for algorithm in Algorithm::ALL {
        for order in [TaskOrder::Sequential, TaskOrder::NearestFirst] {
            let mut rng = StdRng::seed_from_u64(3);
            let mut sim = match TaskSimulation::new(config, algorithm, order, &mut rng) {
                Ok(sim) => sim,
                Err(_) => continue,
            };
            sim.start();
            let mut ticks = 0;
            while sim.state() == RunState::Running && ticks < 5_000 {
                sim.tick();
                ticks += 1;
            }
            assert!(sim.is_finished(), "{algorithm} with {order:?} did not finish");
            assert_eq!(sim.completed_tasks().len(), 4);
            assert_eq!(sim.path_length(), sim.ticks() + 1);
        }
    }
}

#[test]
fn optimal_planners_travel_the_same_distance() {
    let config = TaskGridConfig::default().with_require_reachable(true);
    let task_grid = reachable_task_grid(&config);
    let grid = Arc::new(task_grid.grid().clone());

    let lengths: Vec<usize> = [Algorithm::Bfs, Algorithm::Ucs, Algorithm::AStar]
        .into_iter()
        .map(|algorithm| {
            let mut agent = RobotAgent::new(
                task_grid.start(),
                task_grid.tasks().to_vec(),
                Arc::clone(&grid),
                algorithm,
                TaskOrder::Sequential,
            )
            .unwrap();
            agent.find_initial_path();
            run_agent(&mut agent, 10_000);
            assert_eq!(agent.status(), AgentStatus::Done);
            agent.path_traveled().len()
        })
        .collect();

    assert_eq!(lengths[0], lengths[1]);
    assert_eq!(lengths[1], lengths[2]);
}

#[test]
fn maze_agent_solves_generated_maze_with_each_algorithm() {
    let mut rng = StdRng::seed_from_u64(42);
    let maze = Maze::generate(&MazeConfig::new(25, 19), &mut rng).unwrap();
    let grid = Arc::new(maze.grid().clone());

    for algorithm in Algorithm::ALL {
        let mut agent = MazeAgent::new(maze.start(), maze.goal(), Arc::clone(&grid), algorithm)
            .unwrap();
        assert!(agent.find_path(), "{algorithm} found no path");
        let planned = agent.path_length();
        let ticks = run_agent(&mut agent, 10_000);

        assert_eq!(agent.status(), AgentStatus::Done);
        assert_eq!(agent.position(), Position::new(23, 18));
        assert_eq!(ticks + 1, planned);
        assert_unit_steps(agent.path_traveled());
    }
}

#[test]
fn bundled_task_map_completes_in_list_order() {
    let parsed = load_map_from_string(include_str!("../../maps/tasks01.txt")).unwrap();
    let tasks = parsed.tasks.clone();
    assert_eq!(tasks.len(), 5);

    let mut sim = TaskSimulation::from_map(parsed, Algorithm::Bfs, TaskOrder::Sequential).unwrap();
    assert_eq!(sim.start(), RunState::Running);
    while sim.state() == RunState::Running {
        sim.tick();
    }
    assert!(sim.is_finished());
    assert_eq!(sim.completed_tasks(), tasks.as_slice());
    assert_eq!(sim.task_number(tasks[4]), Some(5));
}

#[test]
fn detour_map_defeats_hill_climbing_but_not_a_star() {
    let parsed = load_map_from_string(include_str!("../../maps/detour01.txt")).unwrap();
    let (start, goal) = (parsed.start.unwrap(), parsed.goal.unwrap());
    let grid = Arc::new(parsed.grid);

    let mut solver = MazeAgent::new(start, goal, Arc::clone(&grid), Algorithm::AStar).unwrap();
    assert!(solver.find_path());
    assert_eq!(solver.path_length(), 25);
    run_agent(&mut solver, 100);
    assert_eq!(solver.status(), AgentStatus::Done);

    let mut climber = MazeAgent::new(start, goal, grid, HillClimbing).unwrap();
    climber.find_path();
    assert_eq!(run_agent(&mut climber, 100), 0);
    assert_eq!(climber.status(), AgentStatus::Idle);
    assert_eq!(climber.position(), start);
}
