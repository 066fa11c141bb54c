use std::collections::HashSet;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// Errors raised while reading a text map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapParseError {
    #[error("Map string is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map symbol '{symbol}' at position ({x}, {y})")]
    UnknownSymbol { symbol: char, x: usize, y: usize },
    #[error("Multiple '{0}' markers found")]
    DuplicateMarker(char),
}

/// Static state of a single cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Free,
    Blocked,
}

/// Positions treated as impassable for a single search call, on top of the
/// grid's own blocked cells.
pub type BlockedSet = HashSet<Position>;

/// The terrain every search and agent operates on.
pub type TerrainGrid = Grid<CellType>;

/// Neighbour offsets in expansion order: left, right, up, down.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Dimensions are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, every cell set to `value`.
    pub fn filled(width: usize, height: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_generator(width, height, |_, _| value.clone())
    }

    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator function `f` takes `(x, y)` coordinates and returns the
    /// value for that cell, visiting cells in row-major order.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Grid {
            width,
            height,
            cells,
        }
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Converts (x, y) coordinates to a flat vector index.
    ///
    /// Returns `None` if the coordinates are out of bounds.
    #[inline]
    fn coords_to_index(&self, x: usize, y: usize) -> Option<usize> {
        if self.is_valid(x, y) {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Checks if the given coordinates are within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Same as [`Grid::is_valid`] for a [`Position`].
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        self.is_valid(position.x, position.y)
    }

    /// Gets an immutable reference to the cell at the given coordinates.
    ///
    /// Returns `None` if the coordinates are out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        let index = self.coords_to_index(x, y)?;
        self.cells.get(index)
    }

    /// Sets the value of the cell at the given coordinates.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the coordinates are invalid.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> Result<(), GridError> {
        let index = self.coords_to_index(x, y).ok_or(GridError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }

    fn out_of_bounds(&self, x: usize, y: usize) -> ! {
        panic!(
            "Grid index ({}, {}) out of bounds for grid size ({}, {})",
            x, y, self.width, self.height
        )
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        match self.coords_to_index(index.x, index.y) {
            Some(idx) => &self.cells[idx],
            None => self.out_of_bounds(index.x, index.y),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: Position) -> &mut Self::Output {
        match self.coords_to_index(index.x, index.y) {
            Some(idx) => &mut self.cells[idx],
            None => self.out_of_bounds(index.x, index.y),
        }
    }
}

impl Grid<CellType> {
    /// Creates a grid where every cell is free.
    pub fn open(width: usize, height: usize) -> Self {
        Self::filled(width, height, CellType::Free)
    }

    /// Creates a grid where every cell is blocked.
    pub fn walled(width: usize, height: usize) -> Self {
        Self::filled(width, height, CellType::Blocked)
    }

    /// True if `position` is inside the grid and not blocked.
    #[inline]
    pub fn is_free(&self, position: Position) -> bool {
        matches!(self.get(position.x, position.y), Some(CellType::Free))
    }

    /// True if `position` is free in the grid and not listed in `blocked`.
    #[inline]
    pub fn is_passable(&self, position: Position, blocked: &BlockedSet) -> bool {
        self.is_free(position) && !blocked.contains(&position)
    }

    /// Passable 4-connected neighbours of `position`, in [`NEIGHBOR_OFFSETS`] order.
    pub fn open_neighbors<'a>(
        &'a self,
        position: Position,
        blocked: &'a BlockedSet,
    ) -> impl Iterator<Item = Position> + 'a {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(move |&(dx, dy)| position.offset(dx, dy))
            .filter(move |neighbor| self.is_passable(*neighbor, blocked))
    }

    /// Every cell 4-connected to `origin` through passable cells, `origin`
    /// included when it is passable itself.
    pub fn reachable_from(&self, origin: Position, blocked: &BlockedSet) -> HashSet<Position> {
        let mut reached = HashSet::new();
        if !self.is_passable(origin, blocked) {
            return reached;
        }
        reached.insert(origin);
        let mut frontier = vec![origin];
        while let Some(current) = frontier.pop() {
            for neighbor in self.open_neighbors(current, blocked) {
                if reached.insert(neighbor) {
                    frontier.push(neighbor);
                }
            }
        }
        reached
    }

    /// Number of blocked cells.
    pub fn blocked_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| **cell == CellType::Blocked)
            .count()
    }
}

/// Writes the grid using the text map alphabet (`.` free, `#` blocked).
impl fmt::Display for Grid<CellType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.width.max(1)) {
            for cell in row {
                let symbol = match cell {
                    CellType::Free => '.',
                    CellType::Blocked => '#',
                };
                write!(f, "{symbol}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Result of reading a text map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMap {
    pub grid: TerrainGrid,
    pub start: Option<Position>,
    pub goal: Option<Position>,
    /// Task markers in reading order.
    pub tasks: Vec<Position>,
}

/// Loads a terrain grid from its text representation.
///
/// Each non-empty line is one row. Symbols: `.` free, `#` blocked, `S` start,
/// `G` goal, `T` task. Markers sit on free cells.
pub fn load_map_from_string(map_string: &str) -> Result<ParsedMap, MapParseError> {
    let rows: Vec<Vec<char>> = map_string
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().collect())
        .collect();

    let width = rows.first().map(Vec::len).ok_or(MapParseError::Empty)?;
    for (row, symbols) in rows.iter().enumerate() {
        if symbols.len() != width {
            return Err(MapParseError::InconsistentWidth {
                row,
                expected: width,
                found: symbols.len(),
            });
        }
    }

    let mut grid = Grid::open(width, rows.len());
    let mut start = None;
    let mut goal = None;
    let mut tasks = Vec::new();

    for (y, symbols) in rows.iter().enumerate() {
        for (x, &symbol) in symbols.iter().enumerate() {
            let pos = Position { x, y };
            match symbol {
                '.' => {}
                '#' => grid[pos] = CellType::Blocked,
                'S' => {
                    if start.replace(pos).is_some() {
                        return Err(MapParseError::DuplicateMarker('S'));
                    }
                }
                'G' => {
                    if goal.replace(pos).is_some() {
                        return Err(MapParseError::DuplicateMarker('G'));
                    }
                }
                'T' => tasks.push(pos),
                unknown => {
                    return Err(MapParseError::UnknownSymbol {
                        symbol: unknown,
                        x,
                        y,
                    });
                }
            }
        }
    }

    Ok(ParsedMap {
        grid,
        start,
        goal,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_out_of_bounds_is_an_error() {
        let mut grid = Grid::open(3, 2);
        assert_eq!(
            grid.set(3, 0, CellType::Blocked),
            Err(GridError::OutOfBounds {
                x: 3,
                y: 0,
                width: 3,
                height: 2
            })
        );
        assert!(grid.set(2, 1, CellType::Blocked).is_ok());
        assert_eq!(grid[Position::new(2, 1)], CellType::Blocked);
        assert_eq!(grid.blocked_count(), 1);
    }

    #[test]
    fn neighbors_follow_left_right_up_down_order() {
        let grid = Grid::open(3, 3);
        let blocked = BlockedSet::new();
        let neighbors: Vec<_> = grid.open_neighbors(Position::new(1, 1), &blocked).collect();
        assert_eq!(
            neighbors,
            vec![
                Position::new(0, 1),
                Position::new(2, 1),
                Position::new(1, 0),
                Position::new(1, 2),
            ]
        );
    }

    #[test]
    fn neighbors_skip_walls_blocked_set_and_edges() {
        let parsed = load_map_from_string(
            "
            .#.
            ...
            ",
        )
        .unwrap();
        let blocked: BlockedSet = [Position::new(0, 1)].into_iter().collect();
        let neighbors: Vec<_> = parsed
            .grid
            .open_neighbors(Position::new(0, 0), &blocked)
            .collect();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn flood_fill_stops_at_walls() {
        let parsed = load_map_from_string(
            "
            ..#..
            ..#..
            ",
        )
        .unwrap();
        let reached = parsed
            .grid
            .reachable_from(Position::new(0, 0), &BlockedSet::new());
        assert_eq!(reached.len(), 4);
        assert!(!reached.contains(&Position::new(3, 0)));
        assert!(
            parsed
                .grid
                .reachable_from(Position::new(2, 0), &BlockedSet::new())
                .is_empty()
        );
    }

    #[test]
    fn parses_markers() {
        let parsed = load_map_from_string(
            "
            S.T
            ##.
            T.G
            ",
        )
        .unwrap();
        assert_eq!(parsed.grid.width(), 3);
        assert_eq!(parsed.grid.height(), 3);
        assert_eq!(parsed.start, Some(Position::new(0, 0)));
        assert_eq!(parsed.goal, Some(Position::new(2, 2)));
        assert_eq!(parsed.tasks, vec![Position::new(2, 0), Position::new(0, 2)]);
        assert!(!parsed.grid.is_free(Position::new(1, 1)));
        assert!(parsed.grid.is_free(Position::new(2, 0)));
    }

    #[test]
    fn rejects_malformed_maps() {
        assert_eq!(load_map_from_string("  \n "), Err(MapParseError::Empty));
        assert_eq!(
            load_map_from_string("...\n.."),
            Err(MapParseError::InconsistentWidth {
                row: 1,
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            load_map_from_string("S.\n.S"),
            Err(MapParseError::DuplicateMarker('S'))
        );
        assert_eq!(
            load_map_from_string("..\n.x"),
            Err(MapParseError::UnknownSymbol {
                symbol: 'x',
                x: 1,
                y: 1
            })
        );
    }

    #[test]
    fn display_matches_map_alphabet() {
        let parsed = load_map_from_string("S.#\n#.G").unwrap();
        assert_eq!(parsed.grid.to_string(), "..#\n#..\n");
    }
}
