//! Checkpoint bookkeeping for a run: fitness and diversity series and the
//! (protein, carbs) scatter of sampled populations.

use crate::evolution::diet::Diet;
use serde::Serialize;
use std::collections::HashSet;

/// Generations at which the nutrition scatter is sampled, besides the last one
pub const SCATTER_GENERATIONS: [usize; 6] = [0, 5, 10, 15, 20, 30];

/// Fitness and diversity are recorded every this many generations, and on the last
pub const SERIES_INTERVAL: usize = 25;

/// Maximum number of diets sampled into the scatter per checkpoint
pub const SCATTER_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitnessPoint {
    pub generation: usize,
    pub best_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiversityPoint {
    pub generation: usize,
    /// Distinct item names across the whole population
    pub distinct_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NutritionPoint {
    pub generation: usize,
    pub protein: f64,
    pub carbs: f64,
}

/// Everything a call to `EvolutionEngine::evolve` produces.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult<'a> {
    /// Lowest-score diet seen in any generation, items sorted by name
    pub best_diet: Diet<'a>,
    pub fitness_series: Vec<FitnessPoint>,
    pub diversity_series: Vec<DiversityPoint>,
    pub nutrition_scatter: Vec<NutritionPoint>,
    /// Best-known score after each generation; never increases
    pub best_score_history: Vec<f64>,
}

/// Accumulates the metric series while the driver runs.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    last_generation: usize,
    fitness_series: Vec<FitnessPoint>,
    diversity_series: Vec<DiversityPoint>,
    nutrition_scatter: Vec<NutritionPoint>,
    best_score_history: Vec<f64>,
}

impl MetricsRecorder {
    pub fn new(num_generations: usize) -> Self {
        Self {
            last_generation: num_generations.saturating_sub(1),
            ..Self::default()
        }
    }

    pub fn is_scatter_checkpoint(&self, generation: usize) -> bool {
        generation == self.last_generation || SCATTER_GENERATIONS.contains(&generation)
    }

    pub fn is_series_checkpoint(&self, generation: usize) -> bool {
        generation == self.last_generation || generation % SERIES_INTERVAL == 0
    }

    /// Records one generation. `population` is the ranked population, so the
    /// scatter samples its best diets first.
    pub fn record(
        &mut self,
        generation: usize,
        population: &[Diet<'_>],
        generation_best: f64,
        best_known: f64,
    ) {
        self.best_score_history.push(best_known);

        if self.is_scatter_checkpoint(generation) {
            self.nutrition_scatter.extend(
                population
                    .iter()
                    .take(SCATTER_SAMPLE_SIZE)
                    .map(|diet| NutritionPoint {
                        generation,
                        protein: diet.total_protein,
                        carbs: diet.total_carbs,
                    }),
            );
        }

        if self.is_series_checkpoint(generation) {
            self.fitness_series.push(FitnessPoint {
                generation,
                best_score: generation_best,
            });
            self.diversity_series.push(DiversityPoint {
                generation,
                distinct_items: distinct_items(population),
            });
        }
    }

    pub fn finish<'a>(self, best_diet: Diet<'a>) -> RunResult<'a> {
        RunResult {
            best_diet,
            fitness_series: self.fitness_series,
            diversity_series: self.diversity_series,
            nutrition_scatter: self.nutrition_scatter,
            best_score_history: self.best_score_history,
        }
    }
}

/// Count of distinct item names present across a population
pub fn distinct_items(population: &[Diet<'_>]) -> usize {
    population
        .iter()
        .flat_map(|diet| diet.items.iter().map(|item| item.name.as_str()))
        .collect::<HashSet<_>>()
        .len()
}
