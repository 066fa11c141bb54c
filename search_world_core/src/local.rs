//! Greedy and stochastic local search over the same grid the graph searches use.
//!
//! Neither routine backtracks, so both can fail on grids where a path exists.

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Path, Position,
    agent::PathPlanner,
    manhattan_distance,
    map::{BlockedSet, TerrainGrid},
};

/// Result of a local search walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The walk ended on the goal.
    Reached(Path),
    /// No neighbour improved on the current cell; the walk so far.
    Stuck(Path),
    Failed,
}

impl LocalOutcome {
    /// The walk if it made any progress, reaching the goal or not.
    pub fn into_path(self) -> Option<Path> {
        match self {
            LocalOutcome::Reached(path) | LocalOutcome::Stuck(path) => Some(path),
            LocalOutcome::Failed => None,
        }
    }

    pub fn reached(&self) -> bool {
        matches!(self, LocalOutcome::Reached(_))
    }
}

/// Greedy descent on Manhattan distance to the goal.
///
/// Steps to the passable neighbour closest to the goal (first in neighbour
/// order on ties) and stops as soon as that neighbour is no closer than the
/// current cell.
pub fn hill_climbing(
    start: Position,
    goal: Position,
    grid: &TerrainGrid,
    blocked: &BlockedSet,
) -> LocalOutcome {
    if !grid.is_passable(start, blocked) {
        return LocalOutcome::Failed;
    }

    let mut current = start;
    let mut path = vec![current];

    while current != goal {
        let best = grid
            .open_neighbors(current, blocked)
            .min_by_key(|neighbor| manhattan_distance(neighbor, &goal));

        match best {
            Some(next)
                if manhattan_distance(&next, &goal) < manhattan_distance(&current, &goal) =>
            {
                current = next;
                path.push(current);
            }
            _ => {
                log::debug!("hill climbing stuck at {current}, {} steps taken", path.len() - 1);
                return LocalOutcome::Stuck(path);
            }
        }
    }

    LocalOutcome::Reached(path)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnealingConfigError {
    #[error("Initial temperature {initial} must exceed minimum temperature {min} (> 0)")]
    TemperatureRange { initial: f64, min: f64 },
    #[error("Cooling rate {0} must lie strictly between 0 and 1")]
    CoolingRate(f64),
}

/// Temperature schedule for [`simulated_annealing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnealingConfig {
    pub initial_temperature: f64,
    /// Geometric factor applied after every step.
    pub cooling_rate: f64,
    /// The walk gives up once the temperature falls to this value.
    pub min_temperature: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        AnnealingConfig {
            initial_temperature: 1000.0,
            cooling_rate: 0.99,
            min_temperature: 0.1,
        }
    }
}

impl AnnealingConfig {
    pub fn with_initial_temperature(mut self, temperature: f64) -> Self {
        self.initial_temperature = temperature;
        self
    }

    pub fn with_cooling_rate(mut self, rate: f64) -> Self {
        self.cooling_rate = rate;
        self
    }

    pub fn with_min_temperature(mut self, temperature: f64) -> Self {
        self.min_temperature = temperature;
        self
    }

    pub fn validate(&self) -> Result<(), AnnealingConfigError> {
        if !(self.min_temperature > 0.0 && self.initial_temperature > self.min_temperature) {
            return Err(AnnealingConfigError::TemperatureRange {
                initial: self.initial_temperature,
                min: self.min_temperature,
            });
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(AnnealingConfigError::CoolingRate(self.cooling_rate));
        }
        Ok(())
    }

    /// Number of steps before the temperature drops to the minimum.
    pub fn step_budget(&self) -> usize {
        let steps = (self.min_temperature / self.initial_temperature).ln() / self.cooling_rate.ln();
        steps.ceil().max(0.0) as usize
    }
}

/// Random walk toward the goal that accepts worsening moves with a
/// probability shrinking as the temperature cools.
///
/// Each step picks a uniformly random passable neighbour. Moves that reduce
/// the Manhattan distance are always taken; others are taken with
/// probability `exp(delta / temperature)`. The walk is recorded step by step,
/// revisits included.
pub fn simulated_annealing<R: Rng>(
    start: Position,
    goal: Position,
    grid: &TerrainGrid,
    blocked: &BlockedSet,
    config: &AnnealingConfig,
    rng: &mut R,
) -> Result<LocalOutcome, AnnealingConfigError> {
    config.validate()?;
    if !grid.is_passable(start, blocked) {
        return Ok(LocalOutcome::Failed);
    }

    let mut current = start;
    let mut path = vec![current];
    let mut temperature = config.initial_temperature;

    while current != goal && temperature > config.min_temperature {
        let neighbors: Vec<Position> = grid.open_neighbors(current, blocked).collect();
        let Some(&candidate) = neighbors.choose(rng) else {
            return Ok(LocalOutcome::Failed);
        };

        let delta = manhattan_distance(&current, &goal) as f64
            - manhattan_distance(&candidate, &goal) as f64;
        if delta > 0.0 || (delta / temperature).exp() > rng.random::<f64>() {
            current = candidate;
            path.push(current);
        }
        temperature *= config.cooling_rate;
    }

    if current == goal {
        Ok(LocalOutcome::Reached(path))
    } else {
        log::debug!(
            "simulated annealing cooled to {temperature:.3} at {current} without reaching {goal}"
        );
        Ok(LocalOutcome::Failed)
    }
}

/// [`hill_climbing`] as a planner for agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HillClimbing;

impl PathPlanner for HillClimbing {
    fn plan(
        &mut self,
        start: Position,
        goal: Position,
        grid: &TerrainGrid,
        blocked: &BlockedSet,
    ) -> Option<Path> {
        hill_climbing(start, goal, grid, blocked).into_path()
    }
}

/// [`simulated_annealing`] as a planner, owning its schedule and random source.
#[derive(Debug, Clone)]
pub struct SimulatedAnnealing<R> {
    config: AnnealingConfig,
    rng: R,
}

impl<R: Rng> SimulatedAnnealing<R> {
    pub fn new(config: AnnealingConfig, rng: R) -> Result<Self, AnnealingConfigError> {
        config.validate()?;
        Ok(SimulatedAnnealing { config, rng })
    }

    pub fn config(&self) -> &AnnealingConfig {
        &self.config
    }
}

impl<R: Rng> PathPlanner for SimulatedAnnealing<R> {
    fn plan(
        &mut self,
        start: Position,
        goal: Position,
        grid: &TerrainGrid,
        blocked: &BlockedSet,
    ) -> Option<Path> {
        simulated_annealing(start, goal, grid, blocked, &self.config, &mut self.rng)
            .ok()?
            .into_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Grid, load_map_from_string};
    use rand::{SeedableRng, rngs::StdRng};

    const WALL_IN_THE_WAY: &str = "
        ..#..
        S.#.G
        .....
    ";

    #[test]
    fn hill_climbing_walks_straight_on_open_grid() {
        let grid = Grid::open(6, 6);
        let outcome = hill_climbing(
            Position::new(0, 0),
            Position::new(5, 3),
            &grid,
            &BlockedSet::new(),
        );
        let path = match outcome {
            LocalOutcome::Reached(path) => path,
            other => panic!("expected to reach the goal, got {other:?}"),
        };
        assert_eq!(path.len(), 9);
        assert_eq!(path.last(), Some(&Position::new(5, 3)));
    }

    #[test]
    fn hill_climbing_stops_at_local_optimum() {
        let parsed = load_map_from_string(WALL_IN_THE_WAY).unwrap();
        let outcome = hill_climbing(
            parsed.start.unwrap(),
            parsed.goal.unwrap(),
            &parsed.grid,
            &BlockedSet::new(),
        );
        assert_eq!(
            outcome,
            LocalOutcome::Stuck(vec![Position::new(0, 1), Position::new(1, 1)])
        );
    }

    #[test]
    fn hill_climbing_from_blocked_start_fails() {
        let grid = Grid::open(3, 3);
        let blocked: BlockedSet = [Position::new(0, 0)].into_iter().collect();
        let outcome = hill_climbing(Position::new(0, 0), Position::new(2, 2), &grid, &blocked);
        assert_eq!(outcome, LocalOutcome::Failed);
    }

    #[test]
    fn annealing_reaches_end_of_corridor() {
        let grid = Grid::open(10, 1);
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = simulated_annealing(
            Position::new(0, 0),
            Position::new(9, 0),
            &grid,
            &BlockedSet::new(),
            &AnnealingConfig::default(),
            &mut rng,
        )
        .unwrap();
        let path = match outcome {
            LocalOutcome::Reached(path) => path,
            other => panic!("expected to reach the goal, got {other:?}"),
        };
        assert_eq!(path.first(), Some(&Position::new(0, 0)));
        assert_eq!(path.last(), Some(&Position::new(9, 0)));
        for window in path.windows(2) {
            assert!(window[0].is_adjacent(&window[1]));
        }
    }

    fn has_backward_step(path: &[Position], goal: Position) -> bool {
        path.windows(2)
            .any(|step| manhattan_distance(&step[1], &goal) > manhattan_distance(&step[0], &goal))
    }

    /// Walks that reached the end of a 12-cell corridor, one per seed.
    fn corridor_walks(config: &AnnealingConfig) -> Vec<Path> {
        let grid = Grid::open(12, 1);
        (0..8)
            .filter_map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                simulated_annealing(
                    Position::new(0, 0),
                    Position::new(11, 0),
                    &grid,
                    &BlockedSet::new(),
                    config,
                    &mut rng,
                )
                .unwrap()
                .into_path()
            })
            .collect()
    }

    #[test]
    fn hot_annealing_accepts_moves_away_from_goal() {
        let walks = corridor_walks(&AnnealingConfig::default());
        assert!(!walks.is_empty());
        assert!(
            walks
                .iter()
                .any(|walk| has_backward_step(walk, Position::new(11, 0)))
        );
    }

    #[test]
    fn cold_annealing_only_moves_toward_goal() {
        let cold = AnnealingConfig::default()
            .with_initial_temperature(0.02)
            .with_min_temperature(0.01);
        let walks = corridor_walks(&cold);
        assert!(!walks.is_empty());
        for walk in &walks {
            assert!(!has_backward_step(walk, Position::new(11, 0)), "{walk:?}");
            assert_eq!(walk.len(), 12);
        }
    }

    #[test]
    fn annealing_fails_when_goal_is_sealed_off() {
        let parsed = load_map_from_string(
            "
            S...
            ..##
            ..#G
            ",
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = simulated_annealing(
            parsed.start.unwrap(),
            parsed.goal.unwrap(),
            &parsed.grid,
            &BlockedSet::new(),
            &AnnealingConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome, LocalOutcome::Failed);
    }

    #[test]
    fn annealing_with_no_neighbours_fails() {
        let grid = Grid::open(1, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let outcome = simulated_annealing(
            Position::new(0, 0),
            Position::new(0, 0),
            &grid,
            &BlockedSet::new(),
            &AnnealingConfig::default(),
            &mut rng,
        )
        .unwrap();
        // Already at the goal, so the walk never needs a neighbour.
        assert_eq!(outcome, LocalOutcome::Reached(vec![Position::new(0, 0)]));

        let walled = load_map_from_string("S#\n#G").unwrap();
        let outcome = simulated_annealing(
            walled.start.unwrap(),
            walled.goal.unwrap(),
            &walled.grid,
            &BlockedSet::new(),
            &AnnealingConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome, LocalOutcome::Failed);
    }

    #[test]
    fn annealing_config_validation() {
        assert!(AnnealingConfig::default().validate().is_ok());
        assert_eq!(
            AnnealingConfig::default().with_cooling_rate(1.0).validate(),
            Err(AnnealingConfigError::CoolingRate(1.0))
        );
        assert!(matches!(
            AnnealingConfig::default()
                .with_initial_temperature(0.05)
                .validate(),
            Err(AnnealingConfigError::TemperatureRange { .. })
        ));
        assert!(matches!(
            AnnealingConfig::default().with_min_temperature(0.0).validate(),
            Err(AnnealingConfigError::TemperatureRange { .. })
        ));
    }

    #[test]
    fn annealing_planner_rejects_bad_schedule_and_plans_corridor() {
        assert!(
            SimulatedAnnealing::new(
                AnnealingConfig::default().with_cooling_rate(0.0),
                StdRng::seed_from_u64(0)
            )
            .is_err()
        );

        let mut planner =
            SimulatedAnnealing::new(AnnealingConfig::default(), StdRng::seed_from_u64(11)).unwrap();
        let grid = Grid::open(6, 1);
        let path = planner
            .plan(
                Position::new(0, 0),
                Position::new(5, 0),
                &grid,
                &BlockedSet::new(),
            )
            .unwrap();
        assert_eq!(path.last(), Some(&Position::new(5, 0)));
    }

    #[test]
    fn default_schedule_runs_about_nine_hundred_steps() {
        let budget = AnnealingConfig::default().step_budget();
        assert!((910..=920).contains(&budget), "got {budget}");
    }
}
