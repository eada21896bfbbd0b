pub mod diet;
pub mod metrics;

use crate::config::GaConfig;
use crate::data::{Catalog, FoodItem};
use crate::evolution::diet::{Diet, DietKey, NutritionTargets, DISQUALIFIED};
use crate::evolution::metrics::{distinct_items, MetricsRecorder, RunResult};
use log::{debug, info};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Population exhausted: {0}")]
    PopulationExhausted(String),
    #[error("Population collapsed to zero parents at generation {generation}")]
    PopulationCollapse { generation: usize },
    #[error("Cannot select from an empty population")]
    EmptyPopulation,
}

/// Struct associated with the `evaluate_population` function
#[derive(Debug, Copy, Clone)]
pub struct PopulationEvaluationReport {
    /// Diets holding at least one banned item
    pub disqualified: usize,
}

/// Orchestrates a whole search: initialization, then evaluate / select / reproduce
/// for a fixed number of generations while keeping the best-known diet alive.
#[derive(Clone)]
pub struct EvolutionEngine<'a> {
    /// GA parameters, validated on construction
    config: &'a GaConfig,
    /// Goals and exclusion lists every diet is scored against
    targets: &'a NutritionTargets,
    /// Shared read-only catalog; diets borrow their items from it
    catalog: &'a Catalog,
    /// The current generation, replaced wholesale by `reproduce`
    population: Vec<Diet<'a>>,
    /// Single random source for every stochastic step, so a seed fixes the whole run
    rng: StdRng,
}

impl<'a> EvolutionEngine<'a> {
    /// Creates an engine, seeding its random source from `config.seed` when set.
    ///
    /// # Errors
    /// * `InvalidConfiguration` - out-of-range parameters or targets, or a diet larger
    ///   than the catalog
    /// * `PopulationExhausted` - fewer distinct diets exist than the population needs
    pub fn new(
        config: &'a GaConfig,
        targets: &'a NutritionTargets,
        catalog: &'a Catalog,
    ) -> Result<Self, EvolutionError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, targets, catalog, rng)
    }

    /// Same as `new`, with an explicit random source.
    pub fn with_rng(
        config: &'a GaConfig,
        targets: &'a NutritionTargets,
        catalog: &'a Catalog,
        rng: StdRng,
    ) -> Result<Self, EvolutionError> {
        config
            .validate()
            .map_err(|e| EvolutionError::InvalidConfiguration(e.to_string()))?;
        targets
            .validate()
            .map_err(EvolutionError::InvalidConfiguration)?;

        if config.diet_size > catalog.size() {
            return Err(EvolutionError::InvalidConfiguration(format!(
                "diet size {} exceeds catalog size {}",
                config.diet_size,
                catalog.size()
            )));
        }

        if !has_enough_combinations(catalog.size(), config.diet_size, config.population_size) {
            return Err(EvolutionError::PopulationExhausted(format!(
                "a catalog of {} items cannot form {} distinct diets of {} items",
                catalog.size(),
                config.population_size,
                config.diet_size
            )));
        }

        Ok(Self {
            config,
            targets,
            catalog,
            population: Vec::with_capacity(config.population_size),
            rng,
        })
    }

    pub fn population(&self) -> &[Diet<'a>] {
        &self.population
    }

    /// Runs the whole search and returns the best diet along with the metric series.
    pub fn evolve(&mut self) -> Result<RunResult<'a>, EvolutionError> {
        let num_generations = self.config.num_generations;
        info!(
            "Initializing population of size {} (diet size {})...",
            self.config.population_size, self.config.diet_size
        );
        self.initialize_population()?;

        let mut recorder = MetricsRecorder::new(num_generations);
        let mut best: Option<Diet<'a>> = None;

        for generation in 0..num_generations {
            let PopulationEvaluationReport { disqualified } = self.evaluate_population();

            let parents = self.select_parents().map_err(|e| match e {
                EvolutionError::EmptyPopulation => {
                    EvolutionError::PopulationCollapse { generation }
                }
                other => other,
            })?;
            let top = parents
                .first()
                .ok_or(EvolutionError::PopulationCollapse { generation })?;
            let generation_best = top.score;

            let improved = best.as_ref().map_or(true, |known| generation_best < known.score);
            if improved {
                best = Some(top.clone());
            }
            let best_known = best.as_ref().map_or(DISQUALIFIED, |known| known.score);

            debug!(
                "Gen {}/{}: Best={:.4} | Best Known={:.4} | Disqualified={} | Distinct Items={}",
                generation + 1,
                num_generations,
                generation_best,
                best_known,
                disqualified,
                distinct_items(&self.population)
            );

            recorder.record(generation, &self.population, generation_best, best_known);

            if generation + 1 < num_generations {
                if let Some(elite) = &best {
                    self.reproduce(&parents, elite)?;
                }
            }
        }

        let mut best_diet = best.ok_or(EvolutionError::PopulationCollapse { generation: 0 })?;
        best_diet.sort_by_name();
        info!(
            "Evolution complete. Best score {:.4} (protein {:.1}, carbs {:.1})",
            best_diet.score, best_diet.total_protein, best_diet.total_carbs
        );
        Ok(recorder.finish(best_diet))
    }

    /// Fills the population with `population_size` random diets, no two sharing
    /// the same combination of items.
    pub fn initialize_population(&mut self) -> Result<(), EvolutionError> {
        let size = self.config.population_size;
        let mut population = Vec::with_capacity(size);
        let mut seen: HashSet<DietKey<'a>> = HashSet::with_capacity(size);

        while population.len() < size {
            let mut rejected = 0;
            let diet = loop {
                let diet = self.random_diet()?;
                if seen.insert(diet.key()) {
                    break diet;
                }
                rejected += 1;
                if rejected >= self.config.max_attempts {
                    return Err(EvolutionError::PopulationExhausted(format!(
                        "no new combination after {} attempts while building diet {} of {}",
                        rejected,
                        population.len() + 1,
                        size
                    )));
                }
            };
            population.push(diet);
        }

        self.population = population;
        Ok(())
    }

    /// Draws `diet_size` distinct items uniformly from the catalog
    fn random_diet(&mut self) -> Result<Diet<'a>, EvolutionError> {
        let catalog = self.catalog;
        let diet_size = self.config.diet_size;
        let mut items: Vec<&'a FoodItem> = Vec::with_capacity(diet_size);
        let mut rejected = 0;

        while items.len() < diet_size {
            let candidate = catalog.sample(&mut self.rng);
            if items.iter().any(|item| item.name == candidate.name) {
                rejected += 1;
                if rejected >= self.config.max_attempts {
                    return Err(EvolutionError::PopulationExhausted(format!(
                        "could not draw a new item after {} attempts",
                        rejected
                    )));
                }
                continue;
            }
            rejected = 0;
            items.push(candidate);
        }

        Ok(Diet::new(items))
    }

    /// Scores every diet of the current population against the run's targets.
    ///
    /// Runs on the rayon pool; all scores are in place when this returns.
    pub fn evaluate_population(&mut self) -> PopulationEvaluationReport {
        let targets = self.targets;
        self.population.par_iter_mut().for_each(|diet| {
            diet.evaluate(targets);
        });

        PopulationEvaluationReport {
            disqualified: self
                .population
                .iter()
                .filter(|diet| diet.is_disqualified())
                .count(),
        }
    }

    /// Ranks the current population in place and returns its best half.
    fn select_parents(&mut self) -> Result<Vec<Diet<'a>>, EvolutionError> {
        select_parents(&mut self.population)
    }

    /// Interleaves two parents into one duplicate-free child of the same size.
    ///
    /// A fair coin decides which parent supplies the next candidate; once one side
    /// runs dry the other is used, and uniform catalog draws fill whatever is left.
    /// Candidates already in the child are skipped.
    pub fn crossover(
        &mut self,
        parent_a: &Diet<'a>,
        parent_b: &Diet<'a>,
    ) -> Result<Diet<'a>, EvolutionError> {
        if parent_a.len() != parent_b.len() {
            return Err(EvolutionError::InvalidConfiguration(format!(
                "crossover parents differ in size ({} vs {})",
                parent_a.len(),
                parent_b.len()
            )));
        }

        let catalog = self.catalog;
        let size = parent_a.len();
        let mut queue_a: VecDeque<&'a FoodItem> = parent_a.items.iter().copied().collect();
        let mut queue_b: VecDeque<&'a FoodItem> = parent_b.items.iter().copied().collect();
        let mut child: Vec<&'a FoodItem> = Vec::with_capacity(size);
        let mut rejected = 0;

        while child.len() < size {
            let from_parents = if !queue_a.is_empty() && !queue_b.is_empty() {
                if self.rng.random_bool(0.5) {
                    queue_a.pop_front()
                } else {
                    queue_b.pop_front()
                }
            } else {
                queue_a.pop_front().or_else(|| queue_b.pop_front())
            };
            let drawn = from_parents.is_none();
            let candidate = match from_parents {
                Some(item) => item,
                None => catalog.sample(&mut self.rng),
            };

            if child.iter().any(|item| item.name == candidate.name) {
                if drawn {
                    rejected += 1;
                    if rejected >= self.config.max_attempts {
                        return Err(EvolutionError::PopulationExhausted(format!(
                            "crossover could not complete a child after {} catalog draws",
                            rejected
                        )));
                    }
                }
                continue;
            }
            child.push(candidate);
        }

        Ok(Diet::new(child))
    }

    /// With probability `mutation_rate`, swaps one random slot for a catalog item
    /// the diet does not already hold. Returns the same diet for chaining.
    pub fn mutate<'d>(
        &mut self,
        diet: &'d mut Diet<'a>,
    ) -> Result<&'d mut Diet<'a>, EvolutionError> {
        if diet.is_empty() || self.rng.random::<f64>() >= self.config.mutation_rate {
            return Ok(diet);
        }

        let catalog = self.catalog;
        if diet.len() >= catalog.size() {
            return Err(EvolutionError::PopulationExhausted(format!(
                "a diet of {} items already holds the whole catalog",
                diet.len()
            )));
        }

        let mut rejected = 0;
        let replacement = loop {
            let candidate = catalog.sample(&mut self.rng);
            if !diet.contains(&candidate.name) {
                break candidate;
            }
            rejected += 1;
            if rejected >= self.config.max_attempts {
                return Err(EvolutionError::PopulationExhausted(format!(
                    "mutation found no new item after {} attempts",
                    rejected
                )));
            }
        };

        let slot = self.rng.random_range(0..diet.len());
        diet.items[slot] = replacement;
        diet.score = DISQUALIFIED;
        Ok(diet)
    }

    /// Builds the next generation: the elite first, then children of uniformly
    /// chosen parents, skipping any combination already present.
    fn reproduce(&mut self, parents: &[Diet<'a>], elite: &Diet<'a>) -> Result<(), EvolutionError> {
        let size = self.config.population_size;
        let mut next_generation = Vec::with_capacity(size);
        let mut seen: HashSet<DietKey<'a>> = HashSet::with_capacity(size);

        seen.insert(elite.key());
        next_generation.push(elite.clone());

        let mut collisions = 0;
        while next_generation.len() < size {
            let mut rejected = 0;
            let child = loop {
                let (parent1, parent2) = match (
                    parents.choose(&mut self.rng),
                    parents.choose(&mut self.rng),
                ) {
                    (Some(p1), Some(p2)) => (p1, p2),
                    _ => return Err(EvolutionError::EmptyPopulation),
                };

                let mut child = self.crossover(parent1, parent2)?;
                self.mutate(&mut child)?;

                if seen.insert(child.key()) {
                    break child;
                }
                rejected += 1;
                collisions += 1;
                if rejected >= self.config.max_attempts {
                    return Err(EvolutionError::PopulationExhausted(format!(
                        "no new combination after {} attempts while filling slot {} of {}",
                        rejected,
                        next_generation.len() + 1,
                        size
                    )));
                }
            };
            next_generation.push(child);
        }

        if collisions > 0 {
            debug!("Rejected {} duplicate children while reproducing", collisions);
        }
        self.population = next_generation;
        Ok(())
    }
}

/// Elitist truncation selection.
///
/// Stable-sorts `population` by ascending score (disqualified diets last, ties keep
/// their order) and returns clones of the best `len / 2` diets, rounded down, but
/// never fewer than one: 9 diets keep 4, a single diet keeps itself.
pub fn select_parents<'a>(population: &mut [Diet<'a>]) -> Result<Vec<Diet<'a>>, EvolutionError> {
    if population.is_empty() {
        return Err(EvolutionError::EmptyPopulation);
    }

    population.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
    let survivors = (population.len() / 2).max(1);
    Ok(population[..survivors].to_vec())
}

/// Runs one full search with the given catalog, targets and parameters.
pub fn run<'a>(
    catalog: &'a Catalog,
    targets: &'a NutritionTargets,
    config: &'a GaConfig,
) -> Result<RunResult<'a>, EvolutionError> {
    EvolutionEngine::new(config, targets, catalog)?.evolve()
}

/// True if `C(n, k) >= needed`
fn has_enough_combinations(n: usize, k: usize, needed: usize) -> bool {
    if k > n {
        return false;
    }
    let needed = needed as u128;
    let k = k.min(n - k);
    let mut count: u128 = 1;
    for i in 0..k {
        if count >= needed {
            return true;
        }
        count = count * (n - i) as u128 / (i + 1) as u128;
    }
    count >= needed
}
