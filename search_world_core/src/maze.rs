//! Procedural maze generation.
//!
//! Passages live on odd coordinates and the walls between them on the cells
//! in between. A randomised depth-first carve from (1, 1) produces a perfect
//! maze; a second pass then walks random odd cells to open extra passages.

use rand::{Rng, seq::IndexedRandom, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{CellType, Grid, TerrainGrid},
};

/// Smallest accepted width or height: one ring of wall around a 3x3 interior.
pub const MIN_MAZE_SIZE: usize = 5;

/// Entrance cell on the top edge.
const ENTRANCE: Position = Position::new(1, 0);

/// Carving directions: north, south, east, west.
const DIRECTIONS: [(isize, isize); 4] = [(0, -1), (0, 1), (1, 0), (-1, 0)];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MazeConfigError {
    #[error("Maze dimensions {width}x{height} are below the minimum of 5x5")]
    TooSmall { width: usize, height: usize },
    #[error("{name} {value} must lie in [0, 1]")]
    OutOfRange { name: &'static str, value: f64 },
}

/// Maze dimensions and the knobs of the extra-passage pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MazeConfig {
    pub width: usize,
    pub height: usize,
    /// Scales the length of each extra-passage walk.
    pub complexity: f64,
    /// Scales the number of extra-passage walks.
    pub density: f64,
}

impl Default for MazeConfig {
    fn default() -> Self {
        MazeConfig {
            width: 21,
            height: 21,
            complexity: 0.75,
            density: 0.75,
        }
    }
}

impl MazeConfig {
    pub fn new(width: usize, height: usize) -> Self {
        MazeConfig {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Rounds even dimensions up to the next odd value.
    pub fn normalized(self) -> Self {
        let odd = |n: usize| if n % 2 == 0 { n + 1 } else { n };
        let normalized = MazeConfig {
            width: odd(self.width),
            height: odd(self.height),
            ..self
        };
        if normalized.width != self.width || normalized.height != self.height {
            log::warn!(
                "maze dimensions {}x{} rounded up to {}x{}",
                self.width,
                self.height,
                normalized.width,
                normalized.height
            );
        }
        normalized
    }

    pub fn validate(&self) -> Result<(), MazeConfigError> {
        if self.width < MIN_MAZE_SIZE || self.height < MIN_MAZE_SIZE {
            return Err(MazeConfigError::TooSmall {
                width: self.width,
                height: self.height,
            });
        }
        for (name, value) in [("complexity", self.complexity), ("density", self.density)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MazeConfigError::OutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// Number of steps each extra-passage walk takes.
    pub fn walk_length(&self) -> usize {
        (self.complexity * (5 * (self.width + self.height)) as f64) as usize
    }

    /// Number of extra-passage walks.
    pub fn walk_count(&self) -> usize {
        (self.density * ((self.width / 2) * (self.height / 2)) as f64) as usize
    }
}

/// A generated maze with its entrance on the top edge and exit on the bottom edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maze {
    grid: TerrainGrid,
    config: MazeConfig,
}

impl Maze {
    /// Generates a maze. Even dimensions are rounded up to odd ones first.
    pub fn generate<R: Rng>(config: &MazeConfig, rng: &mut R) -> Result<Maze, MazeConfigError> {
        let config = config.normalized();
        config.validate()?;

        let mut grid = carve_passages(config.width, config.height, rng);
        grid[ENTRANCE] = CellType::Free;
        grid[exit(&config)] = CellType::Free;
        add_additional_paths(&mut grid, &config, rng);

        log::info!(
            "generated {}x{} maze with {} open cells",
            config.width,
            config.height,
            grid.len() - grid.blocked_count()
        );
        Ok(Maze { grid, config })
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    pub fn into_grid(self) -> TerrainGrid {
        self.grid
    }

    /// The normalised configuration the maze was built from.
    pub fn config(&self) -> &MazeConfig {
        &self.config
    }

    /// Entrance cell on the top edge, where a solver starts.
    pub fn start(&self) -> Position {
        ENTRANCE
    }

    /// Exit cell on the bottom edge, a solver's goal.
    pub fn goal(&self) -> Position {
        exit(&self.config)
    }
}

fn exit(config: &MazeConfig) -> Position {
    Position::new(config.width - 2, config.height - 1)
}

fn shuffled_directions<R: Rng>(rng: &mut R) -> [(isize, isize); 4] {
    let mut directions = DIRECTIONS;
    directions.shuffle(rng);
    directions
}

/// Randomised depth-first carve from (1, 1) over cells two apart, with an
/// explicit stack in place of recursion.
fn carve_passages<R: Rng>(width: usize, height: usize, rng: &mut R) -> TerrainGrid {
    let mut grid = Grid::walled(width, height);
    let mut visited = Grid::filled(width, height, false);

    let origin = Position::new(1, 1);
    visited[origin] = true;
    grid[origin] = CellType::Free;
    let mut stack = vec![(origin, shuffled_directions(rng), 0usize)];

    while let Some((cell, directions, next)) = stack.last_mut() {
        let Some(&(dx, dy)) = directions.get(*next) else {
            stack.pop();
            continue;
        };
        *next += 1;
        let cell = *cell;

        let (Some(target), Some(wall)) = (cell.offset(2 * dx, 2 * dy), cell.offset(dx, dy)) else {
            continue;
        };
        if !grid.contains(target) || visited[target] {
            continue;
        }

        grid[wall] = CellType::Free;
        grid[target] = CellType::Free;
        visited[target] = true;
        stack.push((target, shuffled_directions(rng), 0));
    }

    grid
}

/// From random odd cells, walks up to [`MazeConfig::walk_length`] steps onto
/// odd cells that are still walls, opening each one along with the wall it
/// crossed. A complete carve leaves no odd cell walled, so on a grid from
/// [`carve_passages`] this only consumes random draws and opens nothing.
fn add_additional_paths<R: Rng>(grid: &mut TerrainGrid, config: &MazeConfig, rng: &mut R) {
    let (width, height) = (config.width, config.height);
    let walk_length = config.walk_length();
    let mut opened = 0usize;

    for _ in 0..config.walk_count() {
        let mut x = rng.random_range(0..(width - 1) / 2) * 2 + 1;
        let mut y = rng.random_range(0..(height - 1) / 2) * 2 + 1;
        grid[Position::new(x, y)] = CellType::Free;

        for _ in 0..walk_length {
            let mut neighbors = Vec::with_capacity(4);
            if x > 1 {
                neighbors.push((x - 2, y));
            }
            if x < width - 2 {
                neighbors.push((x + 2, y));
            }
            if y > 1 {
                neighbors.push((x, y - 2));
            }
            if y < height - 2 {
                neighbors.push((x, y + 2));
            }
            let Some(&(nx, ny)) = neighbors.choose(rng) else {
                break;
            };
            let next = Position::new(nx, ny);
            if grid[next] == CellType::Blocked {
                grid[next] = CellType::Free;
                grid[Position::new((x + nx) / 2, (y + ny) / 2)] = CellType::Free;
                opened += 1;
                x = nx;
                y = ny;
            }
        }
    }

    log::debug!("extra-passage pass opened {opened} cells");
}
