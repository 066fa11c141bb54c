//! Uninformed and informed search over a 4-connected terrain grid.
//!
//! Every algorithm shares one contract: given a start, a goal, the static
//! grid and an extra [`BlockedSet`], return a path from start to goal
//! (both inclusive) or report that none exists. Failing to find a path is
//! a normal outcome, never an error.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    Path, Position, manhattan_distance,
    map::{BlockedSet, TerrainGrid},
};

/// Errors reported before a search runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("Unknown algorithm: {0} (expected one of dfs, bfs, ucs, astar)")]
    UnknownAlgorithm(String),
    #[error("{role} position {position} is outside the {width}x{height} grid")]
    OutOfBounds {
        role: &'static str,
        position: Position,
        width: usize,
        height: usize,
    },
}

/// The grid search algorithms available to agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Depth-first: first path found, not necessarily shortest.
    Dfs,
    /// Breadth-first: shortest in step count.
    Bfs,
    /// Uniform-cost: cheapest accumulated cost.
    Ucs,
    /// A* with the Manhattan heuristic.
    AStar,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Dfs,
        Algorithm::Bfs,
        Algorithm::Ucs,
        Algorithm::AStar,
    ];

    /// Short lowercase name, also accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Dfs => "dfs",
            Algorithm::Bfs => "bfs",
            Algorithm::Ucs => "ucs",
            Algorithm::AStar => "astar",
        }
    }

    /// True for the algorithms guaranteed to return a shortest path.
    pub fn is_optimal(&self) -> bool {
        !matches!(self, Algorithm::Dfs)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dfs" => Ok(Algorithm::Dfs),
            "bfs" => Ok(Algorithm::Bfs),
            "ucs" => Ok(Algorithm::Ucs),
            "astar" | "a*" | "a-star" => Ok(Algorithm::AStar),
            _ => Err(SearchError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// How a search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Path),
    NotFound,
    /// The expansion budget ran out before the search space was exhausted.
    BudgetExhausted,
}

impl SearchOutcome {
    pub fn into_path(self) -> Option<Path> {
        match self {
            SearchOutcome::Found(path) => Some(path),
            SearchOutcome::NotFound | SearchOutcome::BudgetExhausted => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }
}

/// Outcome of a search together with how much work it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub algorithm: Algorithm,
    pub outcome: SearchOutcome,
    /// Number of nodes whose neighbours were generated.
    pub expanded: usize,
}

/// A single search query over an immutable grid.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    grid: &'a TerrainGrid,
    blocked: Option<&'a BlockedSet>,
    start: Position,
    goal: Position,
    max_expansions: Option<usize>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(grid: &'a TerrainGrid, start: Position, goal: Position) -> Self {
        SearchRequest {
            grid,
            blocked: None,
            start,
            goal,
            max_expansions: None,
        }
    }

    /// Additional cells to treat as impassable for this query only.
    pub fn with_blocked(mut self, blocked: &'a BlockedSet) -> Self {
        self.blocked = Some(blocked);
        self
    }

    /// Stops the search with [`SearchOutcome::BudgetExhausted`] after `limit`
    /// node expansions.
    pub fn with_max_expansions(mut self, limit: usize) -> Self {
        self.max_expansions = Some(limit);
        self
    }

    /// Checks that start and goal lie inside the grid.
    pub fn validate(&self) -> Result<(), SearchError> {
        for (role, position) in [("start", self.start), ("goal", self.goal)] {
            if !self.grid.contains(position) {
                return Err(SearchError::OutOfBounds {
                    role,
                    position,
                    width: self.grid.width(),
                    height: self.grid.height(),
                });
            }
        }
        Ok(())
    }

    /// Validates the request, then runs it.
    pub fn try_run(&self, algorithm: Algorithm) -> Result<SearchReport, SearchError> {
        self.validate()?;
        Ok(self.run(algorithm))
    }

    /// Runs the search. Out-of-bounds or impassable endpoints yield
    /// [`SearchOutcome::NotFound`].
    pub fn run(&self, algorithm: Algorithm) -> SearchReport {
        let empty = BlockedSet::new();
        let query = Query {
            grid: self.grid,
            blocked: self.blocked.unwrap_or(&empty),
            start: self.start,
            goal: self.goal,
            max_expansions: self.max_expansions,
        };

        let (outcome, expanded) = if !query.endpoints_passable() {
            (SearchOutcome::NotFound, 0)
        } else {
            match algorithm {
                Algorithm::Dfs => depth_first(&query),
                Algorithm::Bfs => breadth_first(&query),
                Algorithm::Ucs => uniform_cost(&query),
                Algorithm::AStar => a_star(&query),
            }
        };

        match &outcome {
            SearchOutcome::Found(path) => log::debug!(
                "{algorithm}: path {} -> {} of {} steps, {expanded} nodes expanded",
                self.start,
                self.goal,
                path.len().saturating_sub(1)
            ),
            SearchOutcome::NotFound => log::debug!(
                "{algorithm}: no path {} -> {}, {expanded} nodes expanded",
                self.start,
                self.goal
            ),
            SearchOutcome::BudgetExhausted => log::debug!(
                "{algorithm}: budget of {expanded} expansions exhausted searching {} -> {}",
                self.start,
                self.goal
            ),
        }

        SearchReport {
            algorithm,
            outcome,
            expanded,
        }
    }
}

/// Finds a path from `start` to `goal` with the given algorithm.
///
/// Returns `None` when the goal is unreachable.
pub fn search(
    algorithm: Algorithm,
    start: Position,
    goal: Position,
    grid: &TerrainGrid,
    blocked: &BlockedSet,
) -> Option<Path> {
    SearchRequest::new(grid, start, goal)
        .with_blocked(blocked)
        .run(algorithm)
        .outcome
        .into_path()
}

struct Query<'a> {
    grid: &'a TerrainGrid,
    blocked: &'a BlockedSet,
    start: Position,
    goal: Position,
    max_expansions: Option<usize>,
}

impl Query<'_> {
    fn endpoints_passable(&self) -> bool {
        self.grid.is_passable(self.start, self.blocked)
            && self.grid.is_passable(self.goal, self.blocked)
    }

    fn neighbors(&self, position: Position) -> impl Iterator<Item = Position> + '_ {
        self.grid.open_neighbors(position, self.blocked)
    }

    fn exhausted(&self, expanded: usize) -> bool {
        self.max_expansions.is_some_and(|limit| expanded >= limit)
    }

    fn found(&self, came_from: &HashMap<Position, Position>) -> SearchOutcome {
        match reconstruct_path(came_from, self.start, self.goal) {
            Some(path) => SearchOutcome::Found(path),
            None => SearchOutcome::NotFound,
        }
    }
}

fn reconstruct_path(
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> Option<Path> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        current = *came_from.get(&current)?;
        path.push(current);
    }
    path.reverse();
    Some(path)
}

fn depth_first(query: &Query) -> (SearchOutcome, usize) {
    let mut stack: Vec<(Position, Option<Position>)> = vec![(query.start, None)];
    let mut visited = HashSet::new();
    let mut came_from = HashMap::new();
    let mut expanded = 0;

    while let Some((vertex, parent)) = stack.pop() {
        if !visited.insert(vertex) {
            continue;
        }
        if let Some(parent) = parent {
            came_from.insert(vertex, parent);
        }
        if vertex == query.goal {
            return (query.found(&came_from), expanded);
        }
        if query.exhausted(expanded) {
            return (SearchOutcome::BudgetExhausted, expanded);
        }
        expanded += 1;

        // Pushed in reverse so the first neighbour is explored first.
        let neighbors: Vec<Position> = query.neighbors(vertex).collect();
        for neighbor in neighbors.into_iter().rev() {
            if !visited.contains(&neighbor) {
                stack.push((neighbor, Some(vertex)));
            }
        }
    }

    (SearchOutcome::NotFound, expanded)
}

fn breadth_first(query: &Query) -> (SearchOutcome, usize) {
    let mut queue = VecDeque::from([query.start]);
    // Marked at enqueue time so each cell is reached by its shortest route.
    let mut visited = HashSet::from([query.start]);
    let mut came_from = HashMap::new();
    let mut expanded = 0;

    while let Some(vertex) = queue.pop_front() {
        if vertex == query.goal {
            return (query.found(&came_from), expanded);
        }
        if query.exhausted(expanded) {
            return (SearchOutcome::BudgetExhausted, expanded);
        }
        expanded += 1;

        for neighbor in query.neighbors(vertex) {
            if visited.insert(neighbor) {
                came_from.insert(neighbor, vertex);
                queue.push_back(neighbor);
            }
        }
    }

    (SearchOutcome::NotFound, expanded)
}

/// Priority queue entry. Lower priority pops first; equal priorities pop in
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: usize,
    sequence: usize,
    cost: usize,
    position: Position,
    parent: Option<Position>,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Frontier {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: usize,
}

impl Frontier {
    fn push(&mut self, priority: usize, cost: usize, position: Position, parent: Option<Position>) {
        self.heap.push(QueueEntry {
            priority,
            sequence: self.next_sequence,
            cost,
            position,
            parent,
        });
        self.next_sequence += 1;
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }
}

fn uniform_cost(query: &Query) -> (SearchOutcome, usize) {
    let mut frontier = Frontier::default();
    // Marked at expansion time; a cell may sit in the queue more than once.
    let mut visited = HashSet::new();
    let mut came_from = HashMap::new();
    let mut expanded = 0;

    frontier.push(0, 0, query.start, None);

    while let Some(entry) = frontier.pop() {
        if !visited.insert(entry.position) {
            continue;
        }
        if let Some(parent) = entry.parent {
            came_from.insert(entry.position, parent);
        }
        if entry.position == query.goal {
            return (query.found(&came_from), expanded);
        }
        if query.exhausted(expanded) {
            return (SearchOutcome::BudgetExhausted, expanded);
        }
        expanded += 1;

        let cost = entry.cost + 1;
        for neighbor in query.neighbors(entry.position) {
            if !visited.contains(&neighbor) {
                frontier.push(cost, cost, neighbor, Some(entry.position));
            }
        }
    }

    (SearchOutcome::NotFound, expanded)
}

fn a_star(query: &Query) -> (SearchOutcome, usize) {
    let mut frontier = Frontier::default();
    let mut came_from = HashMap::new();
    let mut cost_so_far: HashMap<Position, usize> = HashMap::new();
    let mut expanded = 0;

    frontier.push(manhattan_distance(&query.start, &query.goal), 0, query.start, None);
    cost_so_far.insert(query.start, 0);

    while let Some(entry) = frontier.pop() {
        let current = entry.position;
        if cost_so_far
            .get(&current)
            .is_some_and(|&best| entry.cost > best)
        {
            // Superseded by a cheaper route pushed later.
            continue;
        }
        if current == query.goal {
            return (query.found(&came_from), expanded);
        }
        if query.exhausted(expanded) {
            return (SearchOutcome::BudgetExhausted, expanded);
        }
        expanded += 1;

        let new_cost = entry.cost + 1;
        for neighbor in query.neighbors(current) {
            let improves = cost_so_far
                .get(&neighbor)
                .is_none_or(|&known| new_cost < known);
            if improves {
                cost_so_far.insert(neighbor, new_cost);
                came_from.insert(neighbor, current);
                let priority = new_cost + manhattan_distance(&neighbor, &query.goal);
                frontier.push(priority, new_cost, neighbor, Some(current));
            }
        }
    }

    (SearchOutcome::NotFound, expanded)
}
