//! Experiment harness that runs the engine over a grid of parameters.
//!
//! Every grid point is repeated `repetitions` times; the best scores of those runs
//! are summarized into one `SweepRow` together with the mean wall-clock time.

use crate::config::{ConfigError, GaConfig, SweepConfig};
use crate::data::Catalog;
use crate::evolution::diet::NutritionTargets;
use crate::evolution::{EvolutionEngine, EvolutionError};
use log::{info, warn};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(
        "Run failed (population={population_size}, generations={generations}, diet={diet_size}, mutation={mutation_rate}): {source}"
    )]
    RunFailed {
        population_size: usize,
        generations: usize,
        diet_size: usize,
        mutation_rate: f64,
        #[source]
        source: EvolutionError,
    },
}

/// Summary statistics over a set of run scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunStats {
    pub average: f64,
    /// Lowest (best) score
    pub best: f64,
    /// Highest (worst) score
    pub worst: f64,
    /// Population standard deviation
    pub standard_deviation: f64,
}

/// One line of the sweep report
#[derive(Debug, Clone, Serialize)]
pub struct SweepRow {
    pub population_size: usize,
    pub generations: usize,
    pub diet_size: usize,
    pub mutation_rate: f64,
    pub repetitions: usize,
    pub average_time_ms: f64,
    /// Runs whose best diet still held a banned item
    pub disqualified: usize,
    /// Statistics over the admissible runs only; `None` when every run was disqualified
    #[serde(flatten)]
    pub stats: Option<RunStats>,
}

/// Computes mean, min, max and population standard deviation.
/// Returns `None` for an empty slice. Callers filter out infinite scores first.
pub fn summarize(values: &[f64]) -> Option<RunStats> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let best = values.iter().copied().fold(f64::INFINITY, f64::min);
    let worst = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n;

    Some(RunStats {
        average,
        best,
        worst,
        standard_deviation: variance.sqrt(),
    })
}

/// Runs every combination of the sweep grid.
///
/// `base` supplies the parameters the grid does not vary (`max_attempts`, `seed`).
/// With a base seed, run `i` of the sweep is seeded with `seed + i`, so the whole
/// sweep is reproducible while no two runs share a random stream.
pub fn run_sweep(
    catalog: &Catalog,
    targets: &NutritionTargets,
    sweep: &SweepConfig,
    base: &GaConfig,
) -> Result<Vec<SweepRow>, SweepError> {
    sweep.validate()?;
    info!(
        "--- Starting sweep: {} grid points x {} repetitions ---",
        sweep.grid_size(),
        sweep.repetitions
    );

    let mut rows = Vec::with_capacity(sweep.grid_size());
    let mut run_index: u64 = 0;

    for &population_size in &sweep.population_sizes {
        for &generations in &sweep.generations {
            for &diet_size in &sweep.diet_sizes {
                for &mutation_rate in &sweep.mutation_rates {
                    info!(
                        "Testing: Population = {}, Generations = {}, DietSize = {}, Tm = {}",
                        population_size, generations, diet_size, mutation_rate
                    );

                    let mut scores = Vec::with_capacity(sweep.repetitions);
                    let mut elapsed_ms = Vec::with_capacity(sweep.repetitions);

                    for _ in 0..sweep.repetitions {
                        let config = GaConfig {
                            population_size,
                            num_generations: generations,
                            mutation_rate,
                            diet_size,
                            max_attempts: base.max_attempts,
                            seed: base.seed.map(|seed| seed.wrapping_add(run_index)),
                        };
                        run_index += 1;

                        let start = Instant::now();
                        let score = EvolutionEngine::new(&config, targets, catalog)
                            .and_then(|mut engine| engine.evolve())
                            .map(|result| result.best_diet.score)
                            .map_err(|source| SweepError::RunFailed {
                                population_size,
                                generations,
                                diet_size,
                                mutation_rate,
                                source,
                            })?;
                        elapsed_ms.push(start.elapsed().as_secs_f64() * 1000.0);
                        scores.push(score);
                    }

                    let admissible: Vec<f64> =
                        scores.iter().copied().filter(|s| s.is_finite()).collect();
                    let disqualified = scores.len() - admissible.len();
                    if disqualified > 0 {
                        warn!(
                            "{} of {} runs ended without an admissible diet",
                            disqualified, sweep.repetitions
                        );
                    }

                    rows.push(SweepRow {
                        population_size,
                        generations,
                        diet_size,
                        mutation_rate,
                        repetitions: sweep.repetitions,
                        average_time_ms: summarize(&elapsed_ms).map_or(0.0, |t| t.average),
                        disqualified,
                        stats: summarize(&admissible),
                    });
                }
            }
        }
    }

    info!("Sweep complete: {} rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FoodItem;

    fn get_test_catalog() -> Catalog {
        Catalog::new(
            (0..12)
                .map(|i| {
                    FoodItem::new(
                        format!("Food{:02}", i),
                        i as f64 * 3.0,
                        (12 - i) as f64 * 2.0,
                        Vec::<String>::new(),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    fn get_test_sweep() -> SweepConfig {
        SweepConfig {
            population_sizes: vec![6, 10],
            generations: vec![5],
            diet_sizes: vec![3],
            mutation_rates: vec![0.3, 0.8],
            repetitions: 3,
        }
    }

    #[test]
    fn test_summarize_known_values() {
        let stats = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.average, 5.0);
        assert_eq!(stats.best, 2.0);
        assert_eq!(stats.worst, 9.0);
        assert!((stats.standard_deviation - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_single_and_empty() {
        let stats = summarize(&[3.5]).unwrap();
        assert_eq!(stats.average, 3.5);
        assert_eq!(stats.standard_deviation, 0.0);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_sweep_produces_one_row_per_grid_point() {
        let catalog = get_test_catalog();
        let targets = NutritionTargets::new(30.0, 30.0, vec![], vec![]);
        let sweep = get_test_sweep();
        let base = GaConfig {
            seed: Some(11),
            ..GaConfig::default()
        };

        let rows = run_sweep(&catalog, &targets, &sweep, &base).unwrap();

        assert_eq!(rows.len(), sweep.grid_size());
        assert_eq!(rows[0].population_size, 6);
        assert_eq!(rows[0].mutation_rate, 0.3);
        assert_eq!(rows[3].population_size, 10);
        assert_eq!(rows[3].mutation_rate, 0.8);
        for row in &rows {
            assert_eq!(row.repetitions, 3);
            assert_eq!(row.disqualified, 0);
            let stats = row.stats.unwrap();
            assert!(stats.best <= stats.average);
            assert!(stats.average <= stats.worst);
            assert!(stats.standard_deviation >= 0.0);
            assert!(row.average_time_ms >= 0.0);
        }
    }

    #[test]
    fn test_seeded_sweep_is_reproducible() {
        let catalog = get_test_catalog();
        let targets = NutritionTargets::new(25.0, 40.0, vec![], vec![]);
        let sweep = get_test_sweep();
        let base = GaConfig {
            seed: Some(3),
            ..GaConfig::default()
        };

        let first = run_sweep(&catalog, &targets, &sweep, &base).unwrap();
        let second = run_sweep(&catalog, &targets, &sweep, &base).unwrap();
        let stats = |rows: &[SweepRow]| rows.iter().map(|r| r.stats).collect::<Vec<_>>();
        assert_eq!(stats(&first), stats(&second));
    }

    #[test]
    fn test_disqualified_runs_are_counted_not_averaged() {
        // Every item is banned, so no run can reach a finite score
        let catalog = Catalog::new(
            (0..8)
                .map(|i| FoodItem::new(format!("Cheese{}", i), 5.0, 1.0, vec!["LEITE"]))
                .collect(),
        )
        .unwrap();
        let targets = NutritionTargets::new(20.0, 5.0, vec!["LEITE".to_string()], vec![]);
        let sweep = SweepConfig {
            population_sizes: vec![4],
            generations: vec![3],
            diet_sizes: vec![2],
            mutation_rates: vec![0.5],
            repetitions: 3,
        };
        let base = GaConfig {
            seed: Some(5),
            ..GaConfig::default()
        };

        let rows = run_sweep(&catalog, &targets, &sweep, &base).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].disqualified, 3);
        assert!(rows[0].stats.is_none());
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["disqualified"], 3);
        assert!(json.get("average").is_none());
    }

    #[test]
    fn test_partially_disqualified_runs_keep_finite_stats() {
        // Only {Food4, Food5} is admissible; 4 random diets of 15 include it about 4 runs in 15
        let catalog = Catalog::new(
            (0..6)
                .map(|i| {
                    let tags = if i < 4 { vec!["LEITE"] } else { vec![] };
                    FoodItem::new(format!("Food{}", i), i as f64, 1.0, tags)
                })
                .collect(),
        )
        .unwrap();
        let targets = NutritionTargets::new(9.0, 2.0, vec!["LEITE".to_string()], vec![]);
        let sweep = SweepConfig {
            population_sizes: vec![4],
            generations: vec![1],
            diet_sizes: vec![2],
            mutation_rates: vec![0.0],
            repetitions: 40,
        };
        let base = GaConfig {
            seed: Some(17),
            ..GaConfig::default()
        };

        let rows = run_sweep(&catalog, &targets, &sweep, &base).unwrap();
        let row = &rows[0];

        assert!(row.disqualified > 0);
        assert!(row.disqualified < row.repetitions);
        let stats = row.stats.unwrap();
        assert!(stats.average.is_finite());
        assert!(stats.worst.is_finite());
        assert!(stats.standard_deviation.is_finite());
        // The only admissible diet is {Food4, Food5}: |9 - 9| + |2 - 2| = 0
        assert_eq!(stats.best, 0.0);
        assert_eq!(stats.worst, 0.0);
    }

    #[test]
    fn test_failing_grid_point_is_reported() {
        let catalog = get_test_catalog();
        let targets = NutritionTargets::new(30.0, 30.0, vec![], vec![]);
        let sweep = SweepConfig {
            diet_sizes: vec![13],
            ..get_test_sweep()
        };

        let result = run_sweep(&catalog, &targets, &sweep, &GaConfig::default());
        assert!(matches!(
            result,
            Err(SweepError::RunFailed {
                diet_size: 13,
                source: EvolutionError::InvalidConfiguration(_),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_grid_is_rejected() {
        let catalog = get_test_catalog();
        let targets = NutritionTargets::default();
        let sweep = SweepConfig {
            mutation_rates: vec![],
            ..get_test_sweep()
        };

        let result = run_sweep(&catalog, &targets, &sweep, &GaConfig::default());
        assert!(matches!(result, Err(SweepError::Config(_))));
    }

    #[test]
    fn test_rows_serialize_flat() {
        let row = SweepRow {
            population_size: 150,
            generations: 150,
            diet_size: 10,
            mutation_rate: 0.5,
            repetitions: 20,
            average_time_ms: 12.5,
            disqualified: 0,
            stats: Some(RunStats {
                average: 4.0,
                best: 1.0,
                worst: 9.0,
                standard_deviation: 2.0,
            }),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["best"], 1.0);
        assert_eq!(json["disqualified"], 0);
        assert_eq!(json["standard_deviation"], 2.0);
        assert_eq!(json["population_size"], 150);
    }
}
