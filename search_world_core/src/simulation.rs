//! Headless tick drivers for the task robot and the maze solver.
//!
//! A simulation owns its environment and agent. `reset` rebuilds both,
//! `start` plans the first path and `tick` advances the agent one cell.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    agent::{Agent, AgentError, AgentStatus, MazeAgent, RobotAgent, StepOutcome, TaskOrder},
    map::{ParsedMap, TerrainGrid},
    maze::{Maze, MazeConfig, MazeConfigError},
    search::Algorithm,
    tasks::{GenerateError, TaskGrid, TaskGridConfig},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Maze(#[from] MazeConfigError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("Map has no {0} marker")]
    MissingMarker(&'static str),
}

/// Where a simulation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Environment built, nothing planned yet.
    Ready,
    Running,
    /// Planning failed or the agent stalled short of its goal.
    NoPath,
    Finished,
}

/// Ticks `agent` until it stops moving or `max_ticks` is hit. Returns the
/// number of ticks taken.
pub fn run_agent<A: Agent>(agent: &mut A, max_ticks: usize) -> usize {
    let mut ticks = 0;
    while ticks < max_ticks {
        match agent.move_step() {
            StepOutcome::Done | StepOutcome::Idle => break,
            StepOutcome::Moved(_) | StepOutcome::Reached(_) => ticks += 1,
        }
    }
    ticks
}

/// State after a tick, given the agent's status.
fn state_after(status: AgentStatus) -> RunState {
    match status {
        AgentStatus::Done => RunState::Finished,
        AgentStatus::Moving => RunState::Running,
        AgentStatus::Idle => RunState::NoPath,
    }
}

#[derive(Debug, Clone)]
enum TaskSource {
    Generated(TaskGridConfig),
    Fixed {
        grid: Arc<TerrainGrid>,
        start: Position,
        tasks: Vec<Position>,
    },
}

/// The multi-task robot on a random or loaded grid.
#[derive(Debug)]
pub struct TaskSimulation {
    source: TaskSource,
    algorithm: Algorithm,
    order: TaskOrder,
    agent: RobotAgent<Algorithm>,
    state: RunState,
    ticks: usize,
}

impl TaskSimulation {
    /// Generates a task grid from `config` and places a robot on its start.
    pub fn new<R: Rng>(
        config: TaskGridConfig,
        algorithm: Algorithm,
        order: TaskOrder,
        rng: &mut R,
    ) -> Result<Self, SimulationError> {
        let agent = build_robot(&TaskSource::Generated(config), algorithm, order, rng)?;
        Ok(TaskSimulation {
            source: TaskSource::Generated(config),
            algorithm,
            order,
            agent,
            state: RunState::Ready,
            ticks: 0,
        })
    }

    /// Uses a loaded map: its `S` marker and its `T` markers in reading order.
    pub fn from_map(
        parsed: ParsedMap,
        algorithm: Algorithm,
        order: TaskOrder,
    ) -> Result<Self, SimulationError> {
        let start = parsed.start.ok_or(SimulationError::MissingMarker("start"))?;
        let grid = Arc::new(parsed.grid);
        let agent = RobotAgent::new(
            start,
            parsed.tasks.clone(),
            Arc::clone(&grid),
            algorithm,
            order,
        )?;
        let source = TaskSource::Fixed {
            grid,
            start,
            tasks: parsed.tasks,
        };
        Ok(TaskSimulation {
            source,
            algorithm,
            order,
            agent,
            state: RunState::Ready,
            ticks: 0,
        })
    }

    /// Rebuilds the robot; a generated grid is drawn afresh from `rng`.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) -> Result<(), SimulationError> {
        self.agent = build_robot(&self.source, self.algorithm, self.order, rng)?;
        self.state = RunState::Ready;
        self.ticks = 0;
        Ok(())
    }

    /// Plans the first path. Does nothing unless the simulation is ready.
    pub fn start(&mut self) -> RunState {
        if self.state != RunState::Ready {
            return self.state;
        }
        self.agent.find_initial_path();
        self.state = state_after(self.agent.status());
        if self.state == RunState::NoPath {
            log::warn!("robot could not plan a path from {}", self.agent.position());
        }
        self.state
    }

    /// Advances the robot one cell while running.
    pub fn tick(&mut self) -> StepOutcome {
        if self.state != RunState::Running {
            return match self.state {
                RunState::Finished => StepOutcome::Done,
                _ => StepOutcome::Idle,
            };
        }
        let outcome = self.agent.move_step();
        self.ticks += 1;
        self.state = state_after(self.agent.status());
        if self.state == RunState::NoPath {
            log::warn!(
                "robot stalled at {} with {}/{} tasks done",
                self.agent.position(),
                self.agent.completed_tasks().len(),
                self.agent.tasks().len()
            );
        }
        outcome
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn path_length(&self) -> usize {
        self.agent.path_length()
    }

    pub fn completed_tasks(&self) -> &[Position] {
        self.agent.completed_tasks()
    }

    /// 1-based index of `pos` in the task list.
    pub fn task_number(&self, pos: Position) -> Option<usize> {
        self.agent
            .tasks()
            .iter()
            .position(|task| *task == pos)
            .map(|index| index + 1)
    }

    pub fn agent(&self) -> &RobotAgent<Algorithm> {
        &self.agent
    }

    pub fn grid(&self) -> &TerrainGrid {
        self.agent.grid()
    }
}

fn build_robot<R: Rng>(
    source: &TaskSource,
    algorithm: Algorithm,
    order: TaskOrder,
    rng: &mut R,
) -> Result<RobotAgent<Algorithm>, SimulationError> {
    let agent = match source {
        TaskSource::Generated(config) => {
            let task_grid = TaskGrid::generate(config, rng)?;
            let start = task_grid.start();
            let (grid, tasks) = task_grid.into_parts();
            RobotAgent::new(start, tasks, Arc::new(grid), algorithm, order)?
        }
        TaskSource::Fixed { grid, start, tasks } => {
            RobotAgent::new(*start, tasks.clone(), Arc::clone(grid), algorithm, order)?
        }
    };
    Ok(agent)
}

#[derive(Debug, Clone)]
enum MazeSource {
    Generated(MazeConfig),
    Fixed {
        grid: Arc<TerrainGrid>,
        start: Position,
        goal: Position,
    },
}

/// A solver walking a generated or loaded maze from entrance to exit.
#[derive(Debug)]
pub struct MazeSimulation {
    source: MazeSource,
    algorithm: Algorithm,
    agent: MazeAgent<Algorithm>,
    state: RunState,
    ticks: usize,
}

impl MazeSimulation {
    pub fn new<R: Rng>(
        config: MazeConfig,
        algorithm: Algorithm,
        rng: &mut R,
    ) -> Result<Self, SimulationError> {
        let source = MazeSource::Generated(config);
        let agent = build_solver(&source, algorithm, rng)?;
        Ok(MazeSimulation {
            source,
            algorithm,
            agent,
            state: RunState::Ready,
            ticks: 0,
        })
    }

    /// Uses a loaded map with `S` and `G` markers.
    pub fn from_map(parsed: ParsedMap, algorithm: Algorithm) -> Result<Self, SimulationError> {
        let start = parsed.start.ok_or(SimulationError::MissingMarker("start"))?;
        let goal = parsed.goal.ok_or(SimulationError::MissingMarker("goal"))?;
        let grid = Arc::new(parsed.grid);
        let agent = MazeAgent::new(start, goal, Arc::clone(&grid), algorithm)?;
        let source = MazeSource::Fixed { grid, start, goal };
        Ok(MazeSimulation {
            source,
            algorithm,
            agent,
            state: RunState::Ready,
            ticks: 0,
        })
    }

    /// Rebuilds the solver; a generated maze is carved afresh from `rng`.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) -> Result<(), SimulationError> {
        self.agent = build_solver(&self.source, self.algorithm, rng)?;
        self.state = RunState::Ready;
        self.ticks = 0;
        Ok(())
    }

    pub fn start(&mut self) -> RunState {
        if self.state != RunState::Ready {
            return self.state;
        }
        self.agent.find_path();
        self.state = state_after(self.agent.status());
        if self.state == RunState::NoPath {
            log::warn!(
                "no path through the maze from {} to {}",
                self.agent.position(),
                self.agent.goal()
            );
        }
        self.state
    }

    pub fn tick(&mut self) -> StepOutcome {
        if self.state != RunState::Running {
            return match self.state {
                RunState::Finished => StepOutcome::Done,
                _ => StepOutcome::Idle,
            };
        }
        let outcome = self.agent.move_step();
        self.ticks += 1;
        self.state = state_after(self.agent.status());
        outcome
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn path_length(&self) -> usize {
        self.agent.path_length()
    }

    pub fn agent(&self) -> &MazeAgent<Algorithm> {
        &self.agent
    }

    pub fn grid(&self) -> &TerrainGrid {
        self.agent.grid()
    }
}

fn build_solver<R: Rng>(
    source: &MazeSource,
    algorithm: Algorithm,
    rng: &mut R,
) -> Result<MazeAgent<Algorithm>, SimulationError> {
    let agent = match source {
        MazeSource::Generated(config) => {
            let maze = Maze::generate(config, rng)?;
            let (start, goal) = (maze.start(), maze.goal());
            MazeAgent::new(start, goal, Arc::new(maze.into_grid()), algorithm)?
        }
        MazeSource::Fixed { grid, start, goal } => {
            MazeAgent::new(*start, *goal, Arc::clone(grid), algorithm)?
        }
    };
    Ok(agent)
}
