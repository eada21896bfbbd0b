use log::{debug, warn};
use polars::prelude::*;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read or parse CSV file: {0}")]
    CsvError(#[from] PolarsError),
    #[error("CSV file is missing required columns: '{0}'")]
    MissingColumns(String),
    #[error("Invalid food item at row {row}: {reason}")]
    ValidationError { row: usize, reason: String },
    #[error("Found {count} null values in critical columns")]
    NullDataError { count: usize },
    #[error("Duplicate food item name '{0}'")]
    DuplicateName(String),
    #[error("Catalog contains no food items")]
    Empty,
}

/// Configuration for catalog loading and validation
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Whether to fail on null values or use defaults
    pub fail_on_nulls: bool,
    /// Separator between allergen tags inside the allergens column
    pub allergen_separator: char,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            fail_on_nulls: true,
            allergen_separator: ';',
        }
    }
}

/// A single entry of the food catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodItem {
    pub name: String,
    pub protein: f64,
    pub carbs: f64,
    /// Allergen tags; banned/penalized lists are matched against these as well as `name`
    pub allergens: BTreeSet<String>,
}

impl FoodItem {
    pub fn new<I, S>(name: impl Into<String>, protein: f64, carbs: f64, allergens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            protein,
            carbs,
            allergens: allergens.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates the nutritional values of the item
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name cannot be empty".to_string());
        }

        for (label, value) in [("Protein", self.protein), ("Carbs", self.carbs)] {
            if !value.is_finite() {
                return Err(format!("{} value ({}) is not a finite number", label, value));
            }
            if value < 0.0 {
                return Err(format!("{} value ({}) cannot be negative", label, value));
            }
        }

        Ok(())
    }

    /// True if the item's name or any of its allergen tags appears in `names`.
    pub fn matches_any(&self, names: &HashSet<String>) -> bool {
        names.contains(&self.name) || self.allergens.iter().any(|tag| names.contains(tag))
    }
}

/// Read-only snapshot of the food catalog.
///
/// Built once and shared by reference with every engine that needs it, so it never
/// needs locking.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<FoodItem>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog, rejecting invalid items, duplicate names and empty input.
    pub fn new(items: Vec<FoodItem>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(items.len());
        for (row, item) in items.iter().enumerate() {
            item.validate()
                .map_err(|reason| CatalogError::ValidationError { row, reason })?;
            if index.insert(item.name.clone(), row).is_some() {
                return Err(CatalogError::DuplicateName(item.name.clone()));
            }
        }

        Ok(Self { items, index })
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Uniform draw, with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &FoodItem {
        &self.items[rng.random_range(0..self.items.len())]
    }

    pub fn all(&self) -> &[FoodItem] {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&FoodItem> {
        self.index.get(name).map(|&i| &self.items[i])
    }
}

/// Finds the first column whose name matches one of `candidates`, ignoring case
fn find_column(columns: &[String], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|cand| {
        columns
            .iter()
            .find(|c| c.trim().eq_ignore_ascii_case(cand))
            .cloned()
    })
}

/// Detects the column mapping for the CSV file, the allergens column being optional
fn detect_columns(
    df: &DataFrame,
) -> Result<(String, String, String, Option<String>), CatalogError> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let name_col = find_column(&columns, &["name", "food", "item"])
        .ok_or_else(|| CatalogError::MissingColumns("Name column".to_string()))?;
    let protein_col = find_column(&columns, &["protein", "proteins"])
        .ok_or_else(|| CatalogError::MissingColumns("Protein column".to_string()))?;
    let carbs_col = find_column(&columns, &["carbs", "carbohydrates", "carb"])
        .ok_or_else(|| CatalogError::MissingColumns("Carbs column".to_string()))?;
    let allergens_col = find_column(&columns, &["allergens", "allergic", "allergies"]);

    Ok((name_col, protein_col, carbs_col, allergens_col))
}

/// Loads the food catalog from a CSV file.
pub fn load_csv(file_path: &Path) -> Result<Catalog, CatalogError> {
    load_csv_with_config(file_path, LoadConfig::default())
}

/// Loads the food catalog with custom configuration
pub fn load_csv_with_config(file_path: &Path, config: LoadConfig) -> Result<Catalog, CatalogError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.into()))?
        .finish()?;

    let (name_col, protein_col, carbs_col, allergens_col) = detect_columns(&df)?;

    let name_binding = df.column(&name_col)?.cast(&DataType::String)?;
    let names = name_binding.str()?;
    let protein_binding = df.column(&protein_col)?.cast(&DataType::Float64)?;
    let proteins = protein_binding.f64()?;
    let carbs_binding = df.column(&carbs_col)?.cast(&DataType::Float64)?;
    let carbs = carbs_binding.f64()?;
    let allergen_binding = match &allergens_col {
        Some(col) => Some(df.column(col)?.cast(&DataType::String)?),
        None => None,
    };
    let allergens = match &allergen_binding {
        Some(column) => Some(column.str()?),
        None => None,
    };

    if config.fail_on_nulls {
        let null_count = names.null_count() + proteins.null_count() + carbs.null_count();
        if null_count > 0 {
            return Err(CatalogError::NullDataError { count: null_count });
        }
    }

    let mut items = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(name) = names.get(i) else {
            warn!("Null name at row {}, skipping", i);
            continue;
        };

        let protein = proteins.get(i).unwrap_or_else(|| {
            warn!("Null protein at row {}, using 0.0", i);
            0.0
        });
        let carb = carbs.get(i).unwrap_or_else(|| {
            warn!("Null carbs at row {}, using 0.0", i);
            0.0
        });

        let tags: Vec<String> = allergens
            .and_then(|column| column.get(i))
            .map(|raw| {
                raw.split(config.allergen_separator)
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let item = FoodItem::new(name.trim(), protein, carb, tags);
        if let Err(reason) = item.validate() {
            return Err(CatalogError::ValidationError { row: i, reason });
        }
        items.push(item);
    }

    debug!("Loaded {} food items from '{}'", items.len(), file_path.display());
    Catalog::new(items)
}
