use crate::evolution::diet::NutritionTargets;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Top-level configuration, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub targets: TargetConfig,
    #[serde(default)]
    pub ga: GaConfig,
    /// When present, the binary runs a parameter sweep instead of a single search
    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CatalogConfig {
    pub file_path: String,
    #[serde(default = "default_allergen_separator")]
    pub allergen_separator: char,
    /// Reject empty name/protein/carbs cells instead of skipping the row or reading 0.0
    #[serde(default = "default_fail_on_nulls")]
    pub fail_on_nulls: bool,
}

fn default_allergen_separator() -> char {
    ';'
}

fn default_fail_on_nulls() -> bool {
    true
}

/// Nutrition goals and exclusion lists for a run.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TargetConfig {
    pub protein: f64,
    pub carbs: f64,
    /// Item names or allergen tags that disqualify a diet
    #[serde(default)]
    pub banned: Vec<String>,
    /// Item names or allergen tags that cost a fixed penalty per item
    #[serde(default)]
    pub penalized: Vec<String>,
}

/// Parameters of the genetic algorithm itself.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    pub num_generations: usize,
    /// Probability in [0, 1] that a child gets one of its items swapped
    pub mutation_rate: f64,
    /// Number of distinct food items per diet
    pub diet_size: usize,
    /// Upper bound on consecutive rejected draws before a run is declared exhausted
    pub max_attempts: usize,
    /// Fixed seed for reproducible runs; drawn from the OS when absent
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 150,
            num_generations: 150,
            mutation_rate: 0.5,
            diet_size: 10,
            max_attempts: 10_000,
            seed: None,
        }
    }
}

/// Grid of parameters for the experiment harness. Every combination is run
/// `repetitions` times.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SweepConfig {
    pub population_sizes: Vec<usize>,
    pub generations: Vec<usize>,
    pub diet_sizes: Vec<usize>,
    pub mutation_rates: Vec<f64>,
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
}

fn default_repetitions() -> usize {
    20
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Validates every section. The catalog-dependent checks (diet size against
    /// catalog size) happen when the engine is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.file_path.trim().is_empty() {
            return Err(invalid("catalog.file_path", "must not be empty"));
        }
        self.targets.validate()?;
        self.ga.validate()?;
        if let Some(sweep) = &self.sweep {
            sweep.validate()?;
        }
        Ok(())
    }
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("targets.protein", self.protein), ("targets.carbs", self.carbs)] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("{} is not a non-negative number", value)));
            }
        }
        Ok(())
    }

    pub fn to_targets(&self) -> NutritionTargets {
        NutritionTargets::new(
            self.protein,
            self.carbs,
            self.banned.iter().cloned(),
            self.penalized.iter().cloned(),
        )
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(invalid("ga.population_size", "must be at least 1"));
        }
        if self.num_generations == 0 {
            return Err(invalid("ga.num_generations", "must be at least 1"));
        }
        validate_rate("ga.mutation_rate", self.mutation_rate)?;
        if self.diet_size == 0 {
            return Err(invalid("ga.diet_size", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("ga.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_sizes.is_empty()
            || self.generations.is_empty()
            || self.diet_sizes.is_empty()
            || self.mutation_rates.is_empty()
        {
            return Err(invalid("sweep", "every parameter list needs at least one value"));
        }
        if self.population_sizes.contains(&0) {
            return Err(invalid("sweep.population_sizes", "values must be at least 1"));
        }
        if self.generations.contains(&0) {
            return Err(invalid("sweep.generations", "values must be at least 1"));
        }
        if self.diet_sizes.contains(&0) {
            return Err(invalid("sweep.diet_sizes", "values must be at least 1"));
        }
        for &rate in &self.mutation_rates {
            validate_rate("sweep.mutation_rates", rate)?;
        }
        if self.repetitions == 0 {
            return Err(invalid("sweep.repetitions", "must be at least 1"));
        }
        Ok(())
    }

    /// Number of grid points (not counting repetitions)
    pub fn grid_size(&self) -> usize {
        self.population_sizes.len()
            * self.generations.len()
            * self.diet_sizes.len()
            * self.mutation_rates.len()
    }
}

fn validate_rate(field: &'static str, rate: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(invalid(field, format!("{} is outside [0, 1]", rate)));
    }
    Ok(())
}
