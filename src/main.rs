use diet_forge::config::Config;
use diet_forge::data::{load_csv_with_config, Catalog, LoadConfig};
use diet_forge::evolution::EvolutionEngine;
use diet_forge::sweep::run_sweep;
use std::path::Path;
use std::process;

/// Loads the food catalog named by the configuration.
///
/// # Errors
/// Returns a message if the file cannot be read or contains invalid items.
fn prepare_catalog(config: &Config) -> Result<Catalog, String> {
    log::info!("Loading catalog from '{}'...", config.catalog.file_path);
    let load_config = LoadConfig {
        fail_on_nulls: config.catalog.fail_on_nulls,
        allergen_separator: config.catalog.allergen_separator,
    };
    let catalog = load_csv_with_config(Path::new(&config.catalog.file_path), load_config)
        .map_err(|e| format!("Failed to load catalog: {}", e))?;
    log::info!("Catalog loaded: {} food items.", catalog.size());
    Ok(catalog)
}

fn main() {
    env_logger::init();
    log::info!("Booting Diet Forge...");

    // 1. Load and Validate Configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration '{}' loaded and validated.", config_path);

    // 2. Load Catalog
    let catalog = match prepare_catalog(&config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };
    let targets = config.targets.to_targets();

    // 3. Either sweep the parameter grid or run a single search
    if let Some(sweep) = &config.sweep {
        let rows = match run_sweep(&catalog, &targets, sweep, &config.ga) {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Sweep failed: {}", e);
                process::exit(1);
            }
        };
        match serde_json::to_string_pretty(&rows) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                log::error!("Failed to serialize sweep report: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    log::info!("--- Starting Evolution ---");
    let result = match EvolutionEngine::new(&config.ga, &targets, &catalog)
        .and_then(|mut engine| engine.evolve())
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    let best = &result.best_diet;
    println!(
        "\nBest diet (score {:.2}, protein {:.1}/{:.1}, carbs {:.1}/{:.1}):",
        best.score, best.total_protein, targets.protein, best.total_carbs, targets.carbs
    );
    for item in &best.items {
        println!(
            "  - {} (protein {:.1}, carbs {:.1})",
            item.name, item.protein, item.carbs
        );
    }
    for point in &result.fitness_series {
        log::info!("Gen {}: best score {:.4}", point.generation, point.best_score);
    }
    for point in &result.diversity_series {
        log::info!(
            "Gen {}: {} distinct items",
            point.generation,
            point.distinct_items
        );
    }
}
