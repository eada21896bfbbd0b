//! Property-based tests for diet-forge
//!
//! Uses proptest to check the invariants the engine promises for any catalog,
//! diet size and seed.

use diet_forge::config::GaConfig;
use diet_forge::data::{Catalog, FoodItem};
use diet_forge::evolution::diet::{Diet, NutritionTargets, DISQUALIFIED, PENALTY_PER_ITEM};
use diet_forge::evolution::{run, EvolutionEngine};
use proptest::prelude::*;
use std::collections::HashSet;

fn catalog_of(size: usize) -> Catalog {
    Catalog::new(
        (0..size)
            .map(|i| {
                let tags = match i % 5 {
                    0 => vec!["LEITE"],
                    3 => vec!["SOJA"],
                    _ => vec![],
                };
                FoodItem::new(
                    format!("Item{:03}", i),
                    (i * 7 % 19) as f64,
                    (i * 5 % 23) as f64,
                    tags,
                )
            })
            .collect(),
    )
    .unwrap()
}

fn config(population_size: usize, diet_size: usize, mutation_rate: f64, seed: u64) -> GaConfig {
    GaConfig {
        population_size,
        num_generations: 10,
        mutation_rate,
        diet_size,
        max_attempts: 10_000,
        seed: Some(seed),
    }
}

fn no_constraints() -> NutritionTargets {
    NutritionTargets::new(40.0, 40.0, vec![], vec![])
}

fn assert_valid(diet: &Diet, diet_size: usize) -> Result<(), TestCaseError> {
    prop_assert_eq!(diet.len(), diet_size);
    prop_assert!(diet.has_unique_items());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // ==================== Initializer ====================

    #[test]
    fn initial_population_is_valid_and_duplicate_free(
        catalog_size in 8usize..40,
        diet_fraction in 0.25f64..0.75,
        seed in any::<u64>()
    ) {
        let catalog = catalog_of(catalog_size);
        let diet_size = ((catalog_size as f64 * diet_fraction) as usize).max(1);
        let config = config(20, diet_size, 0.5, seed);
        let targets = no_constraints();
        let mut engine = EvolutionEngine::new(&config, &targets, &catalog).unwrap();

        engine.initialize_population().unwrap();

        let mut keys = HashSet::new();
        for diet in engine.population() {
            assert_valid(diet, diet_size)?;
            prop_assert!(keys.insert(diet.key()));
        }
        prop_assert_eq!(keys.len(), 20);
    }

    // ==================== Operators ====================

    #[test]
    fn crossover_and_mutation_keep_diets_valid(
        catalog_size in 6usize..30,
        diet_size in 1usize..6,
        mutation_rate in 0.0f64..=1.0,
        seed in any::<u64>()
    ) {
        let catalog = catalog_of(catalog_size);
        let config = config(4, diet_size, mutation_rate, seed);
        let targets = no_constraints();
        let mut engine = EvolutionEngine::new(&config, &targets, &catalog).unwrap();
        engine.initialize_population().unwrap();
        let population = engine.population().to_vec();

        for parent_a in &population {
            for parent_b in &population {
                let mut child = engine.crossover(parent_a, parent_b).unwrap();
                assert_valid(&child, diet_size)?;
                let mutated = engine.mutate(&mut child).unwrap();
                assert_valid(mutated, diet_size)?;
            }
        }
    }

    // ==================== Evaluator ====================

    #[test]
    fn penalty_adds_ten_per_penalized_item(
        picks in prop::collection::hash_set(0usize..25, 1..8),
        protein in 0.0f64..200.0,
        carbs in 0.0f64..200.0
    ) {
        let catalog = catalog_of(25);
        let items = picks.iter().map(|&i| &catalog.all()[i]).collect();
        let mut diet = Diet::new(items);

        let base = diet.evaluate(&NutritionTargets::new(protein, carbs, vec![], vec![]));
        let penalized_count = diet
            .items
            .iter()
            .filter(|item| item.allergens.contains("SOJA"))
            .count();
        let penalized = diet.evaluate(&NutritionTargets::new(
            protein,
            carbs,
            vec![],
            vec!["SOJA".to_string()],
        ));

        prop_assert!((penalized - (base + PENALTY_PER_ITEM * penalized_count as f64)).abs() < 1e-9);
    }

    #[test]
    fn banned_items_always_disqualify(
        picks in prop::collection::hash_set(0usize..25, 1..8)
    ) {
        let catalog = catalog_of(25);
        let items = picks.iter().map(|&i| &catalog.all()[i]).collect();
        let mut diet = Diet::new(items);
        let has_banned = diet.items.iter().any(|item| item.allergens.contains("LEITE"));

        let score = diet.evaluate(&NutritionTargets::new(
            10.0,
            10.0,
            vec!["LEITE".to_string()],
            vec![],
        ));

        prop_assert_eq!(score == DISQUALIFIED, has_banned);
    }

    #[test]
    fn evaluation_is_idempotent(
        picks in prop::collection::hash_set(0usize..25, 1..8),
        protein in 0.0f64..200.0
    ) {
        let catalog = catalog_of(25);
        let items = picks.iter().map(|&i| &catalog.all()[i]).collect();
        let mut diet = Diet::new(items);
        let targets = NutritionTargets::new(protein, 50.0, vec![], vec!["SOJA".to_string()]);

        diet.evaluate(&targets);
        let first = (diet.score, diet.total_protein, diet.total_carbs);
        diet.evaluate(&targets);
        prop_assert_eq!(first, (diet.score, diet.total_protein, diet.total_carbs));
    }

    // ==================== Driver ====================

    #[test]
    fn best_known_score_never_increases(
        population_size in 2usize..30,
        mutation_rate in 0.0f64..=1.0,
        seed in any::<u64>()
    ) {
        let catalog = catalog_of(30);
        let config = config(population_size, 4, mutation_rate, seed);
        let targets = NutritionTargets::new(
            35.0,
            45.0,
            vec!["LEITE".to_string()],
            vec!["SOJA".to_string()],
        );

        let result = run(&catalog, &targets, &config).unwrap();

        for pair in result.best_score_history.windows(2) {
            prop_assert!(pair[1] <= pair[0]);
        }
        assert_valid(&result.best_diet, 4)?;
        let names: Vec<&str> = result.best_diet.items.iter().map(|i| i.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        prop_assert_eq!(names, sorted);
    }
}
