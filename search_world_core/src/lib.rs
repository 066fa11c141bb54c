use serde::{Deserialize, Serialize};

pub mod agent;
pub mod local;
pub mod map;
pub mod maze;
pub mod queens;
pub mod search;
pub mod simulation;
pub mod tasks;

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Returns the position shifted by `(dx, dy)`, or `None` if either axis
    /// would underflow.
    #[inline]
    pub fn offset(&self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// Returns true if `other` is exactly one unit step away along one axis.
    pub fn is_adjacent(&self, other: &Position) -> bool {
        manhattan_distance(self, other) == 1
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Position { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Returns manhattan distance between two positions
pub fn manhattan_distance(a: &Position, b: &Position) -> usize {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

/// Ordered sequence of positions from a start (inclusive) to a goal (inclusive).
pub type Path = Vec<Position>;
