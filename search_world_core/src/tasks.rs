//! Random obstacle and task placement for the multi-task robot.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{BlockedSet, CellType, Grid, TerrainGrid},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerateError {
    #[error("Grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("Start position {0} lies outside the grid")]
    StartOutOfBounds(Position),
    #[error("Obstacle ratio {0} must lie in [0, 1)")]
    ObstacleRatio(f64),
    #[error(
        "Infeasible density: placed {placed} of {requested} {what} after {attempts} attempts"
    )]
    InfeasibleDensity {
        what: &'static str,
        requested: usize,
        placed: usize,
        attempts: usize,
    },
}

/// Parameters for a random task grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskGridConfig {
    pub width: usize,
    pub height: usize,
    pub num_tasks: usize,
    /// Fraction of all cells turned into obstacles.
    pub obstacle_ratio: f64,
    pub start: Position,
    /// Upper bound on random draws per placement phase.
    pub max_attempts: usize,
    /// Only place tasks on cells connected to the start.
    pub require_reachable: bool,
}

impl Default for TaskGridConfig {
    fn default() -> Self {
        TaskGridConfig {
            width: 16,
            height: 16,
            num_tasks: 5,
            obstacle_ratio: 0.2,
            start: Position::new(0, 0),
            max_attempts: 10_000,
            require_reachable: false,
        }
    }
}

impl TaskGridConfig {
    /// Square grid of side `size` with default settings otherwise.
    pub fn square(size: usize) -> Self {
        TaskGridConfig {
            width: size,
            height: size,
            ..Default::default()
        }
    }

    pub fn with_tasks(mut self, num_tasks: usize) -> Self {
        self.num_tasks = num_tasks;
        self
    }

    pub fn with_obstacle_ratio(mut self, ratio: f64) -> Self {
        self.obstacle_ratio = ratio;
        self
    }

    pub fn with_start(mut self, start: Position) -> Self {
        self.start = start;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_require_reachable(mut self, require: bool) -> Self {
        self.require_reachable = require;
        self
    }

    /// Number of obstacle cells the generator places.
    pub fn obstacle_count(&self) -> usize {
        ((self.width * self.height) as f64 * self.obstacle_ratio) as usize
    }

    pub fn validate(&self) -> Result<(), GenerateError> {
        if self.width == 0 || self.height == 0 {
            return Err(GenerateError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.start.x >= self.width || self.start.y >= self.height {
            return Err(GenerateError::StartOutOfBounds(self.start));
        }
        if !(0.0..1.0).contains(&self.obstacle_ratio) {
            return Err(GenerateError::ObstacleRatio(self.obstacle_ratio));
        }
        Ok(())
    }
}

/// A grid with obstacles and an ordered task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGrid {
    grid: TerrainGrid,
    start: Position,
    obstacles: Vec<Position>,
    tasks: Vec<Position>,
}

impl TaskGrid {
    /// Places obstacles, then tasks, by rejection sampling.
    ///
    /// Each phase gives up after `max_attempts` draws, or immediately when
    /// fewer candidate cells exist than it needs to fill.
    pub fn generate<R: Rng>(config: &TaskGridConfig, rng: &mut R) -> Result<TaskGrid, GenerateError> {
        config.validate()?;
        let mut grid = Grid::open(config.width, config.height);
        let start = config.start;

        let obstacle_target = config.obstacle_count();
        let obstacles = sample_cells(
            "obstacles",
            obstacle_target,
            grid.len() - 1,
            config,
            rng,
            |pos, _| grid.is_free(pos) && pos != start,
        )?;
        for &pos in &obstacles {
            grid[pos] = CellType::Blocked;
        }

        let reachable: Option<HashSet<Position>> = config
            .require_reachable
            .then(|| grid.reachable_from(start, &BlockedSet::new()));
        let candidates = match &reachable {
            Some(reached) => reached.len() - 1,
            None => grid.len() - obstacles.len() - 1,
        };

        let tasks = sample_cells("tasks", config.num_tasks, candidates, config, rng, |pos, placed| {
            grid.is_free(pos)
                && pos != start
                && !placed.contains(&pos)
                && reachable.as_ref().is_none_or(|reached| reached.contains(&pos))
        })?;

        log::info!(
            "generated {}x{} task grid: {} obstacles, {} tasks",
            config.width,
            config.height,
            obstacles.len(),
            tasks.len()
        );
        Ok(TaskGrid {
            grid,
            start,
            obstacles,
            tasks,
        })
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn obstacles(&self) -> &[Position] {
        &self.obstacles
    }

    /// Tasks in placement order.
    pub fn tasks(&self) -> &[Position] {
        &self.tasks
    }

    pub fn into_parts(self) -> (TerrainGrid, Vec<Position>) {
        (self.grid, self.tasks)
    }
}

/// Draws `requested` distinct cells accepted by `accept`, which also sees the
/// cells placed so far.
fn sample_cells<R, F>(
    what: &'static str,
    requested: usize,
    candidates: usize,
    config: &TaskGridConfig,
    rng: &mut R,
    accept: F,
) -> Result<Vec<Position>, GenerateError>
where
    R: Rng,
    F: Fn(Position, &HashSet<Position>) -> bool,
{
    let infeasible = |placed: usize, attempts: usize| GenerateError::InfeasibleDensity {
        what,
        requested,
        placed,
        attempts,
    };
    if requested > candidates {
        return Err(infeasible(0, 0));
    }

    let mut placed = Vec::with_capacity(requested);
    let mut seen = HashSet::with_capacity(requested);
    let mut attempts = 0;
    while placed.len() < requested {
        if attempts >= config.max_attempts {
            log::warn!("gave up placing {what} after {attempts} attempts");
            return Err(infeasible(placed.len(), attempts));
        }
        attempts += 1;
        let pos = Position::new(
            rng.random_range(0..config.width),
            rng.random_range(0..config.height),
        );
        if !seen.contains(&pos) && accept(pos, &seen) {
            seen.insert(pos);
            placed.push(pos);
        }
    }
    Ok(placed)
}
