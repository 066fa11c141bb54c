use std::{collections::VecDeque, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    Path, Position, manhattan_distance,
    map::{BlockedSet, TerrainGrid},
    search::{Algorithm, search},
};

/// Errors detected when an agent is constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Agent needs at least one task")]
    NoTasks,
    #[error("Task {0} appears more than once")]
    DuplicateTask(Position),
    #[error("{role} {position} lies outside the {width}x{height} grid")]
    OutOfBounds {
        role: &'static str,
        position: Position,
        width: usize,
        height: usize,
    },
}

/// Something that can produce a path between two cells of a grid.
///
/// Grid search algorithms always return a path ending at `goal`; local
/// search planners may return a partial walk that stops short of it.
pub trait PathPlanner {
    fn plan(
        &mut self,
        start: Position,
        goal: Position,
        grid: &TerrainGrid,
        blocked: &BlockedSet,
    ) -> Option<Path>;
}

impl PathPlanner for Algorithm {
    fn plan(
        &mut self,
        start: Position,
        goal: Position,
        grid: &TerrainGrid,
        blocked: &BlockedSet,
    ) -> Option<Path> {
        search(*self, start, goal, grid, blocked)
    }
}

/// Lifecycle of an agent. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// No planned steps: not started, or the last plan failed.
    Idle,
    Moving,
    /// Every goal reached.
    Done,
}

/// Result of a single [`Agent::move_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Moved(Position),
    /// Moved onto the current target and marked it completed.
    Reached(Position),
    Idle,
    Done,
}

/// Behaviour shared by the simulated actors a front end ticks.
pub trait Agent {
    fn position(&self) -> Position;

    /// Every cell occupied so far, starting with the start cell.
    fn path_traveled(&self) -> &[Position];

    /// Steps still to take, excluding the current position.
    fn planned_path(&self) -> &VecDeque<Position>;

    fn status(&self) -> AgentStatus;

    /// Consumes one planned step, replanning if a sub-goal was reached.
    fn move_step(&mut self) -> StepOutcome;

    /// Travelled plus remaining cells.
    fn path_length(&self) -> usize {
        self.path_traveled().len() + self.planned_path().len()
    }
}

/// How a [`RobotAgent`] chooses its next task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOrder {
    /// Tasks in list order.
    #[default]
    Sequential,
    /// The uncompleted task with the smallest Manhattan distance, first in
    /// list order on ties.
    NearestFirst,
}

fn check_bounds(
    grid: &TerrainGrid,
    role: &'static str,
    position: Position,
) -> Result<(), AgentError> {
    if grid.contains(position) {
        Ok(())
    } else {
        Err(AgentError::OutOfBounds {
            role,
            position,
            width: grid.width(),
            height: grid.height(),
        })
    }
}

/// Drops the leading cell of `path` when it is the current position.
fn into_steps(path: Path, position: Position) -> VecDeque<Position> {
    let mut steps = VecDeque::from(path);
    if steps.front() == Some(&position) {
        steps.pop_front();
    }
    steps
}

/// A robot visiting a list of task cells one after another.
#[derive(Debug)]
pub struct RobotAgent<P = Algorithm> {
    position: Position,
    tasks: Vec<Position>,
    order: TaskOrder,
    planner: P,
    grid: Arc<TerrainGrid>,
    blocked: BlockedSet,
    path: VecDeque<Position>,
    path_traveled: Vec<Position>,
    completed_tasks: Vec<Position>,
    current_task: Option<Position>,
}

impl<P: PathPlanner> RobotAgent<P> {
    /// Creates an idle robot. Tasks must be non-empty, distinct and inside the grid.
    pub fn new(
        start: Position,
        tasks: Vec<Position>,
        grid: Arc<TerrainGrid>,
        planner: P,
        order: TaskOrder,
    ) -> Result<Self, AgentError> {
        if tasks.is_empty() {
            return Err(AgentError::NoTasks);
        }
        check_bounds(&grid, "start", start)?;
        for (index, task) in tasks.iter().enumerate() {
            check_bounds(&grid, "task", *task)?;
            if tasks[..index].contains(task) {
                return Err(AgentError::DuplicateTask(*task));
            }
        }

        Ok(RobotAgent {
            position: start,
            tasks,
            order,
            planner,
            grid,
            blocked: BlockedSet::new(),
            path: VecDeque::new(),
            path_traveled: vec![start],
            completed_tasks: Vec::new(),
            current_task: None,
        })
    }

    /// Cells to avoid on top of the grid's own obstacles in every plan.
    pub fn with_blocked(mut self, blocked: BlockedSet) -> Self {
        self.blocked = blocked;
        self
    }

    pub fn tasks(&self) -> &[Position] {
        &self.tasks
    }

    /// Tasks in the order they were completed.
    pub fn completed_tasks(&self) -> &[Position] {
        &self.completed_tasks
    }

    /// The task the current plan leads to.
    pub fn current_task(&self) -> Option<Position> {
        self.current_task
    }

    pub fn order(&self) -> TaskOrder {
        self.order
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    pub fn is_done(&self) -> bool {
        self.completed_tasks.len() == self.tasks.len()
    }

    /// The task that would be targeted if a plan were made now.
    pub fn next_target(&self) -> Option<Position> {
        match self.order {
            TaskOrder::Sequential => self.tasks.get(self.completed_tasks.len()).copied(),
            TaskOrder::NearestFirst => self
                .tasks
                .iter()
                .filter(|task| !self.completed_tasks.contains(task))
                .min_by_key(|task| manhattan_distance(&self.position, task))
                .copied(),
        }
    }

    /// Picks the next target and plans a path to it.
    ///
    /// Returns false when every task is done or no path was found; in the
    /// latter case the agent stays idle.
    pub fn find_initial_path(&mut self) -> bool {
        self.plan_next()
    }

    fn plan_next(&mut self) -> bool {
        self.path.clear();
        while let Some(target) = self.next_target() {
            self.current_task = Some(target);
            if target == self.position {
                self.complete(target);
                continue;
            }

            return match self
                .planner
                .plan(self.position, target, &self.grid, &self.blocked)
            {
                Some(path) => {
                    self.path = into_steps(path, self.position);
                    !self.path.is_empty()
                }
                None => {
                    log::warn!("no path from {} to task {target}", self.position);
                    false
                }
            };
        }
        self.current_task = None;
        false
    }

    fn complete(&mut self, task: Position) {
        self.completed_tasks.push(task);
        self.current_task = None;
        self.path.clear();
        log::info!(
            "task {task} completed ({}/{})",
            self.completed_tasks.len(),
            self.tasks.len()
        );
    }

    /// Takes one planned step without replanning.
    pub fn advance(&mut self) -> StepOutcome {
        let Some(next) = self.path.pop_front() else {
            return if self.is_done() {
                StepOutcome::Done
            } else {
                StepOutcome::Idle
            };
        };
        self.position = next;
        self.path_traveled.push(next);

        if self.current_task == Some(next) {
            self.complete(next);
            StepOutcome::Reached(next)
        } else {
            StepOutcome::Moved(next)
        }
    }
}

impl<P: PathPlanner> Agent for RobotAgent<P> {
    fn position(&self) -> Position {
        self.position
    }

    fn path_traveled(&self) -> &[Position] {
        &self.path_traveled
    }

    fn planned_path(&self) -> &VecDeque<Position> {
        &self.path
    }

    fn status(&self) -> AgentStatus {
        if self.is_done() {
            AgentStatus::Done
        } else if self.path.is_empty() {
            AgentStatus::Idle
        } else {
            AgentStatus::Moving
        }
    }

    fn move_step(&mut self) -> StepOutcome {
        let outcome = self.advance();
        if matches!(outcome, StepOutcome::Reached(_)) && !self.is_done() {
            self.plan_next();
        }
        outcome
    }
}

/// A solver walking from a maze entrance to a single goal.
#[derive(Debug)]
pub struct MazeAgent<P = Algorithm> {
    position: Position,
    goal: Position,
    planner: P,
    grid: Arc<TerrainGrid>,
    blocked: BlockedSet,
    path: VecDeque<Position>,
    path_traveled: Vec<Position>,
}

impl<P: PathPlanner> MazeAgent<P> {
    pub fn new(
        start: Position,
        goal: Position,
        grid: Arc<TerrainGrid>,
        planner: P,
    ) -> Result<Self, AgentError> {
        check_bounds(&grid, "start", start)?;
        check_bounds(&grid, "goal", goal)?;
        Ok(MazeAgent {
            position: start,
            goal,
            planner,
            grid,
            blocked: BlockedSet::new(),
            path: VecDeque::new(),
            path_traveled: vec![start],
        })
    }

    /// Cells to avoid on top of the grid's own walls.
    pub fn with_blocked(mut self, blocked: BlockedSet) -> Self {
        self.blocked = blocked;
        self
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    /// Plans from the current position to the goal. Returns false if no path exists.
    pub fn find_path(&mut self) -> bool {
        if self.position == self.goal {
            self.path.clear();
            return true;
        }
        match self
            .planner
            .plan(self.position, self.goal, &self.grid, &self.blocked)
        {
            Some(path) => {
                self.path = into_steps(path, self.position);
                true
            }
            None => {
                log::warn!("no path from {} to goal {}", self.position, self.goal);
                self.path.clear();
                false
            }
        }
    }
}

impl<P: PathPlanner> Agent for MazeAgent<P> {
    fn position(&self) -> Position {
        self.position
    }

    fn path_traveled(&self) -> &[Position] {
        &self.path_traveled
    }

    fn planned_path(&self) -> &VecDeque<Position> {
        &self.path
    }

    fn status(&self) -> AgentStatus {
        if self.position == self.goal {
            AgentStatus::Done
        } else if self.path.is_empty() {
            AgentStatus::Idle
        } else {
            AgentStatus::Moving
        }
    }

    fn move_step(&mut self) -> StepOutcome {
        if self.position == self.goal {
            return StepOutcome::Done;
        }
        let Some(next) = self.path.pop_front() else {
            return StepOutcome::Idle;
        };
        self.position = next;
        self.path_traveled.push(next);
        if next == self.goal {
            log::info!(
                "goal {} reached after {} steps",
                self.goal,
                self.path_traveled.len() - 1
            );
            StepOutcome::Reached(next)
        } else {
            StepOutcome::Moved(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::HillClimbing;
    use crate::map::{Grid, load_map_from_string};

    fn open_grid(size: usize) -> Arc<TerrainGrid> {
        Arc::new(Grid::open(size, size))
    }

    fn run_to_end<A: Agent>(agent: &mut A, max_ticks: usize) {
        for _ in 0..max_ticks {
            if matches!(agent.move_step(), StepOutcome::Done | StepOutcome::Idle) {
                break;
            }
        }
    }

    fn assert_contiguous(steps: &[Position]) {
        for window in steps.windows(2) {
            assert!(
                window[0].is_adjacent(&window[1]),
                "{} -> {} is not a unit step",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn nearest_first_targets_closest_task() {
        let tasks = vec![Position::new(5, 5), Position::new(1, 1)];
        let mut agent = RobotAgent::new(
            Position::new(0, 0),
            tasks,
            open_grid(8),
            Algorithm::AStar,
            TaskOrder::NearestFirst,
        )
        .unwrap();
        assert_eq!(agent.next_target(), Some(Position::new(1, 1)));
        assert!(agent.find_initial_path());
        assert_eq!(agent.current_task(), Some(Position::new(1, 1)));
        assert_eq!(agent.planned_path().len(), 2);
    }

    #[test]
    fn nearest_first_breaks_ties_by_list_order() {
        let tasks = vec![Position::new(0, 2), Position::new(2, 0)];
        let agent = RobotAgent::new(
            Position::new(0, 0),
            tasks,
            open_grid(4),
            Algorithm::Bfs,
            TaskOrder::NearestFirst,
        )
        .unwrap();
        assert_eq!(agent.next_target(), Some(Position::new(0, 2)));
    }

    #[test]
    fn sequential_robot_completes_tasks_in_list_order() {
        let tasks = vec![
            Position::new(6, 6),
            Position::new(1, 0),
            Position::new(3, 5),
        ];
        let mut agent = RobotAgent::new(
            Position::new(0, 0),
            tasks.clone(),
            open_grid(8),
            Algorithm::Bfs,
            TaskOrder::Sequential,
        )
        .unwrap();
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.find_initial_path());
        assert_eq!(agent.status(), AgentStatus::Moving);

        run_to_end(&mut agent, 100);

        assert_eq!(agent.status(), AgentStatus::Done);
        assert_eq!(agent.completed_tasks(), tasks.as_slice());
        assert_eq!(agent.position(), Position::new(3, 5));
        assert_eq!(agent.path_traveled()[0], Position::new(0, 0));
        assert_contiguous(agent.path_traveled());
        // 12 + 11 + 7 unit steps along shortest paths.
        assert_eq!(agent.path_traveled().len(), 31);
        assert_eq!(agent.move_step(), StepOutcome::Done);
    }

    #[test]
    fn nearest_first_robot_visits_greedily() {
        let tasks = vec![
            Position::new(7, 7),
            Position::new(2, 0),
            Position::new(2, 3),
        ];
        let mut agent = RobotAgent::new(
            Position::new(0, 0),
            tasks,
            open_grid(8),
            Algorithm::AStar,
            TaskOrder::NearestFirst,
        )
        .unwrap();
        agent.find_initial_path();
        run_to_end(&mut agent, 100);
        assert_eq!(
            agent.completed_tasks(),
            &[
                Position::new(2, 0),
                Position::new(2, 3),
                Position::new(7, 7)
            ]
        );
    }

    #[test]
    fn advance_marks_completion_without_replanning() {
        let tasks = vec![Position::new(1, 0), Position::new(3, 0)];
        let mut agent = RobotAgent::new(
            Position::new(0, 0),
            tasks,
            open_grid(4),
            Algorithm::Bfs,
            TaskOrder::Sequential,
        )
        .unwrap();
        agent.find_initial_path();
        assert_eq!(agent.advance(), StepOutcome::Reached(Position::new(1, 0)));
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert_eq!(agent.advance(), StepOutcome::Idle);
        assert_eq!(agent.next_target(), Some(Position::new(3, 0)));
    }

    #[test]
    fn unreachable_task_leaves_agent_idle() {
        let parsed = load_map_from_string(
            "
            S..#T
            ...##
            .....
            ",
        )
        .unwrap();
        let mut agent = RobotAgent::new(
            parsed.start.unwrap(),
            parsed.tasks.clone(),
            Arc::new(parsed.grid),
            Algorithm::Ucs,
            TaskOrder::Sequential,
        )
        .unwrap();
        assert!(!agent.find_initial_path());
        assert_eq!(agent.move_step(), StepOutcome::Idle);
        assert_eq!(agent.position(), Position::new(0, 0));
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.completed_tasks().is_empty());
    }

    #[test]
    fn task_on_start_completes_immediately() {
        let tasks = vec![Position::new(0, 0), Position::new(0, 2)];
        let mut agent = RobotAgent::new(
            Position::new(0, 0),
            tasks,
            open_grid(3),
            Algorithm::Bfs,
            TaskOrder::Sequential,
        )
        .unwrap();
        assert!(agent.find_initial_path());
        assert_eq!(agent.completed_tasks(), &[Position::new(0, 0)]);
        assert_eq!(agent.current_task(), Some(Position::new(0, 2)));
    }

    #[test]
    fn construction_validates_inputs() {
        let grid = open_grid(4);
        let start = Position::new(0, 0);
        assert_eq!(
            RobotAgent::new(start, vec![], grid.clone(), Algorithm::Bfs, TaskOrder::Sequential)
                .unwrap_err(),
            AgentError::NoTasks
        );
        assert_eq!(
            RobotAgent::new(
                start,
                vec![Position::new(1, 1), Position::new(1, 1)],
                grid.clone(),
                Algorithm::Bfs,
                TaskOrder::Sequential
            )
            .unwrap_err(),
            AgentError::DuplicateTask(Position::new(1, 1))
        );
        assert_eq!(
            RobotAgent::new(
                start,
                vec![Position::new(4, 1)],
                grid.clone(),
                Algorithm::Bfs,
                TaskOrder::Sequential
            )
            .unwrap_err(),
            AgentError::OutOfBounds {
                role: "task",
                position: Position::new(4, 1),
                width: 4,
                height: 4
            }
        );
        assert!(matches!(
            MazeAgent::new(start, Position::new(9, 9), grid, Algorithm::Bfs),
            Err(AgentError::OutOfBounds { role: "goal", .. })
        ));
    }

    #[test]
    fn maze_agent_walks_to_goal() {
        let parsed = load_map_from_string(
            "
            #S###
            #...#
            ###.#
            #...#
            #G###
            ",
        )
        .unwrap();
        let mut agent = MazeAgent::new(
            parsed.start.unwrap(),
            parsed.goal.unwrap(),
            Arc::new(parsed.grid),
            Algorithm::Dfs,
        )
        .unwrap();
        assert!(agent.find_path());
        assert_eq!(agent.path_length(), 9);

        run_to_end(&mut agent, 20);

        assert_eq!(agent.status(), AgentStatus::Done);
        assert_eq!(agent.position(), Position::new(1, 4));
        assert_eq!(agent.path_traveled().len(), 9);
        assert_contiguous(agent.path_traveled());
        assert_eq!(agent.move_step(), StepOutcome::Done);
    }

    #[test]
    fn maze_agent_without_path_stays_put() {
        let parsed = load_map_from_string("S#G").unwrap();
        let mut agent = MazeAgent::new(
            parsed.start.unwrap(),
            parsed.goal.unwrap(),
            Arc::new(parsed.grid),
            Algorithm::AStar,
        )
        .unwrap();
        assert!(!agent.find_path());
        assert_eq!(agent.move_step(), StepOutcome::Idle);
        assert_eq!(agent.position(), Position::new(0, 0));
    }

    #[test]
    fn maze_agent_routes_around_blocked_cells() {
        let parsed = load_map_from_string(
            "
            S...G
            .###.
            .....
            ",
        )
        .unwrap();
        let (start, goal) = (parsed.start.unwrap(), parsed.goal.unwrap());
        let grid = Arc::new(parsed.grid);

        let mut direct = MazeAgent::new(start, goal, Arc::clone(&grid), Algorithm::Bfs).unwrap();
        assert!(direct.find_path());
        assert_eq!(direct.path_length(), 5);

        let blocked: BlockedSet = [Position::new(2, 0)].into_iter().collect();
        let mut detour = MazeAgent::new(start, goal, Arc::clone(&grid), Algorithm::Bfs)
            .unwrap()
            .with_blocked(blocked);
        assert!(detour.find_path());
        assert_eq!(detour.path_length(), 9);
        run_to_end(&mut detour, 20);
        assert_eq!(detour.status(), AgentStatus::Done);
        assert!(!detour.path_traveled().contains(&Position::new(2, 0)));

        let sealed: BlockedSet = [Position::new(2, 0), Position::new(2, 2)].into_iter().collect();
        let mut stuck = MazeAgent::new(start, goal, grid, Algorithm::AStar)
            .unwrap()
            .with_blocked(sealed);
        assert!(!stuck.find_path());
        assert_eq!(stuck.status(), AgentStatus::Idle);
    }

    #[test]
    fn hill_climbing_robot_halts_at_local_optimum() {
        let parsed = load_map_from_string(
            "
            ..#..
            S.#.T
            .....
            ",
        )
        .unwrap();
        let mut agent = RobotAgent::new(
            parsed.start.unwrap(),
            parsed.tasks.clone(),
            Arc::new(parsed.grid),
            HillClimbing,
            TaskOrder::Sequential,
        )
        .unwrap();
        assert!(agent.find_initial_path());
        run_to_end(&mut agent, 20);
        assert_eq!(agent.position(), Position::new(1, 1));
        assert_eq!(agent.status(), AgentStatus::Idle);
        assert!(agent.completed_tasks().is_empty());
    }
}
