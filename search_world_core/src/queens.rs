//! Genetic algorithm for the 8-queens puzzle.
//!
//! An individual stores one row per column, so two queens never share a
//! column by construction. Fitness counts non-attacking pairs: 28 for a
//! board with no conflicts, 0 when every pair attacks.

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

/// Board width and number of queens.
pub const BOARD_SIZE: usize = 8;

/// Number of queen pairs, reached by a conflict-free board.
pub const MAX_FITNESS: u32 = (BOARD_SIZE * (BOARD_SIZE - 1) / 2) as u32;

/// Row of the queen in each column, every value in `0..BOARD_SIZE`.
pub type Individual = [u8; BOARD_SIZE];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GaConfigError {
    #[error("Population size must be at least 1")]
    EmptyPopulation,
    #[error("Survivor count {survivors} must be between 1 and the population size {population}")]
    SurvivorCount { survivors: usize, population: usize },
    #[error("Mutation rate {0} must lie in [0, 1]")]
    MutationRate(f64),
    #[error("Initial population has {found} individuals, expected {expected}")]
    PopulationMismatch { found: usize, expected: usize },
    #[error("Gene {gene} is not a valid row on an 8x8 board")]
    GeneOutOfRange { gene: u8 },
}

/// Parameters of the generation loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaConfig {
    pub population_size: usize,
    /// Individuals kept after ranking; parents are drawn from these.
    /// Equal to `population_size` unless configured otherwise.
    pub survivors: usize,
    /// Probability that a child has one gene reassigned.
    pub mutation_rate: f64,
    pub max_generations: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 100,
            survivors: 100,
            mutation_rate: 0.1,
            max_generations: 1000,
        }
    }
}

impl GaConfig {
    /// Sets the population size. Survivors follow unless set explicitly afterwards.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self.survivors = size;
        self
    }

    pub fn with_survivors(mut self, survivors: usize) -> Self {
        self.survivors = survivors;
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    pub fn with_max_generations(mut self, generations: usize) -> Self {
        self.max_generations = generations;
        self
    }

    pub fn validate(&self) -> Result<(), GaConfigError> {
        if self.population_size == 0 {
            return Err(GaConfigError::EmptyPopulation);
        }
        if self.survivors == 0 || self.survivors > self.population_size {
            return Err(GaConfigError::SurvivorCount {
                survivors: self.survivors,
                population: self.population_size,
            });
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(GaConfigError::MutationRate(self.mutation_rate));
        }
        Ok(())
    }
}

/// Generates an individual with uniformly random queen rows.
pub fn random_individual<R: Rng>(rng: &mut R) -> Individual {
    std::array::from_fn(|_| rng.random_range(0..BOARD_SIZE as u8))
}

/// Number of queen pairs that do not attack each other.
pub fn fitness(individual: &Individual) -> u32 {
    let mut conflicts = 0;
    for i in 0..BOARD_SIZE {
        for j in (i + 1)..BOARD_SIZE {
            let rows_apart = individual[i].abs_diff(individual[j]) as usize;
            if rows_apart == 0 || rows_apart == j - i {
                conflicts += 1;
            }
        }
    }
    MAX_FITNESS - conflicts
}

/// Single-point crossover: genes before a random cut come from `first`,
/// the rest from `second`.
pub fn crossover<R: Rng>(first: &Individual, second: &Individual, rng: &mut R) -> Individual {
    let point = rng.random_range(0..BOARD_SIZE);
    std::array::from_fn(|column| {
        if column < point {
            first[column]
        } else {
            second[column]
        }
    })
}

/// With probability `rate`, moves the queen of one random column to a random row.
///
/// Returns whether a gene was reassigned.
pub fn mutate<R: Rng>(individual: &mut Individual, rate: f64, rng: &mut R) -> bool {
    if rng.random::<f64>() < rate {
        let column = rng.random_range(0..BOARD_SIZE);
        individual[column] = rng.random_range(0..BOARD_SIZE as u8);
        true
    } else {
        false
    }
}

/// Ranks by descending fitness and keeps the best `survivors`.
///
/// The sort is stable, so equally fit individuals keep their relative order.
pub fn select_population(mut population: Vec<Individual>, survivors: usize) -> Vec<Individual> {
    population.sort_by_key(|individual| std::cmp::Reverse(fitness(individual)));
    population.truncate(survivors);
    population
}

/// Snapshot of one generation, taken after ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    pub best: Individual,
    pub best_fitness: u32,
    pub mean_fitness: f64,
}

impl GenerationReport {
    pub fn is_solution(&self) -> bool {
        self.best_fitness == MAX_FITNESS
    }
}

/// How a full run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GaOutcome {
    Solved {
        generation: usize,
        solution: Individual,
    },
    Exhausted {
        generations: usize,
        best: Individual,
        best_fitness: u32,
    },
}

/// Generation loop state, advanced one generation per [`QueensGa::step`].
#[derive(Debug)]
pub struct QueensGa<R> {
    config: GaConfig,
    population: Vec<Individual>,
    generation: usize,
    solved: bool,
    rng: R,
}

impl<R: Rng> QueensGa<R> {
    /// Creates a random initial population.
    pub fn new(config: GaConfig, mut rng: R) -> Result<Self, GaConfigError> {
        config.validate()?;
        let population = (0..config.population_size)
            .map(|_| random_individual(&mut rng))
            .collect();
        Ok(QueensGa {
            config,
            population,
            generation: 0,
            solved: false,
            rng,
        })
    }

    /// Starts from a caller-supplied population.
    pub fn with_population(
        config: GaConfig,
        population: Vec<Individual>,
        rng: R,
    ) -> Result<Self, GaConfigError> {
        config.validate()?;
        if population.len() != config.population_size {
            return Err(GaConfigError::PopulationMismatch {
                found: population.len(),
                expected: config.population_size,
            });
        }
        if let Some(&gene) = population
            .iter()
            .flatten()
            .find(|gene| usize::from(**gene) >= BOARD_SIZE)
        {
            return Err(GaConfigError::GeneOutOfRange { gene });
        }
        Ok(QueensGa {
            config,
            population,
            generation: 0,
            solved: false,
            rng,
        })
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Number of completed breeding rounds.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// True once the run is solved or the generation cap is reached.
    pub fn is_finished(&self) -> bool {
        self.solved || self.generation >= self.config.max_generations
    }

    /// Fittest individual of the current population.
    pub fn best(&self) -> Option<(Individual, u32)> {
        self.population
            .iter()
            .map(|individual| (*individual, fitness(individual)))
            .max_by_key(|&(_, score)| score)
    }

    /// Ranks the population and, unless it already holds a solution, breeds
    /// the next generation from the survivors.
    pub fn step(&mut self) -> GenerationReport {
        let ranked = select_population(std::mem::take(&mut self.population), self.config.survivors);
        let fitnesses: Vec<u32> = ranked.iter().map(fitness).collect();
        let report = GenerationReport {
            generation: self.generation,
            best: ranked[0],
            best_fitness: fitnesses[0],
            mean_fitness: fitnesses.iter().sum::<u32>() as f64 / fitnesses.len() as f64,
        };

        if report.is_solution() {
            log::info!(
                "8-queens solved in generation {}: {:?}",
                report.generation,
                report.best
            );
            self.solved = true;
            self.population = ranked;
            return report;
        }

        let mut next = Vec::with_capacity(self.config.population_size);
        while next.len() < self.config.population_size {
            let (Some(first), Some(second)) =
                (ranked.choose(&mut self.rng), ranked.choose(&mut self.rng))
            else {
                break;
            };
            let mut child = crossover(first, second, &mut self.rng);
            mutate(&mut child, self.config.mutation_rate, &mut self.rng);
            next.push(child);
        }
        self.population = next;
        self.generation += 1;

        log::debug!(
            "generation {}: best fitness {}, mean {:.2}",
            report.generation,
            report.best_fitness,
            report.mean_fitness
        );
        report
    }

    /// Steps until a solution appears or the generation cap is reached.
    pub fn run(&mut self) -> GaOutcome {
        self.run_with(|_| {})
    }

    /// Like [`QueensGa::run`], handing every generation's report to
    /// `on_generation` as it is produced.
    pub fn run_with<F>(&mut self, mut on_generation: F) -> GaOutcome
    where
        F: FnMut(&GenerationReport),
    {
        let mut best: Option<GenerationReport> = None;
        while !self.is_finished() {
            let report = self.step();
            on_generation(&report);
            if report.is_solution() {
                return GaOutcome::Solved {
                    generation: report.generation,
                    solution: report.best,
                };
            }
            if best
                .as_ref()
                .is_none_or(|known| report.best_fitness > known.best_fitness)
            {
                best = Some(report);
            }
        }

        if let Some(report) = best {
            GaOutcome::Exhausted {
                generations: self.generation,
                best: report.best,
                best_fitness: report.best_fitness,
            }
        } else {
            // Finished before any step ran: cap of zero or already solved.
            let (best, best_fitness) = self.best().unwrap_or(([0; BOARD_SIZE], 0));
            if best_fitness == MAX_FITNESS {
                GaOutcome::Solved {
                    generation: self.generation,
                    solution: best,
                }
            } else {
                GaOutcome::Exhausted {
                    generations: self.generation,
                    best,
                    best_fitness,
                }
            }
        }
    }
}
