use crate::data::FoodItem;
use serde::Serialize;
use std::collections::HashSet;

/// Fixed cost added to the score for every item that hits the penalized list
pub const PENALTY_PER_ITEM: f64 = 10.0;

/// Score of a diet that contains a banned item, or that has not been evaluated yet.
/// Sorts after every finite score.
pub const DISQUALIFIED: f64 = f64::INFINITY;

/// Canonical identity of a diet: its item names, sorted.
pub type DietKey<'a> = Vec<&'a str>;

/// Nutrition goals and exclusion lists, fixed for the length of a run.
#[derive(Debug, Clone, Default)]
pub struct NutritionTargets {
    /// Grams of protein the diet should add up to
    pub protein: f64,
    /// Grams of carbohydrate the diet should add up to
    pub carbs: f64,
    /// Names or allergen tags that disqualify a diet outright
    pub banned: HashSet<String>,
    /// Names or allergen tags that cost `PENALTY_PER_ITEM` each
    pub penalized: HashSet<String>,
}

impl NutritionTargets {
    pub fn new<B, P>(protein: f64, carbs: f64, banned: B, penalized: P) -> Self
    where
        B: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        Self {
            protein,
            carbs,
            banned: banned.into_iter().collect(),
            penalized: penalized.into_iter().collect(),
        }
    }

    /// Both targets must be finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [("protein", self.protein), ("carbs", self.carbs)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!(
                    "{} target ({}) is not a non-negative number",
                    label, value
                ));
            }
        }
        Ok(())
    }
}

/// A candidate solution: a duplicate-free selection of catalog items.
#[derive(Debug, Clone, Serialize)]
pub struct Diet<'a> {
    /// Borrowed catalog entries, never two with the same name
    pub items: Vec<&'a FoodItem>,
    /// Protein summed over `items` by the last `evaluate`
    pub total_protein: f64,
    /// Carbohydrates summed over `items` by the last `evaluate`
    pub total_carbs: f64,
    /// Lower is better, `DISQUALIFIED` until evaluated
    pub score: f64,
}

impl<'a> Diet<'a> {
    pub fn new(items: Vec<&'a FoodItem>) -> Self {
        Self {
            items,
            total_protein: 0.0,
            total_carbs: 0.0,
            score: DISQUALIFIED,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name == name)
    }

    pub fn key(&self) -> DietKey<'a> {
        let mut names: Vec<&'a str> = self
            .items
            .iter()
            .copied()
            .map(|item| item.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// True when no two items share a name.
    pub fn has_unique_items(&self) -> bool {
        let mut names = HashSet::with_capacity(self.items.len());
        self.items.iter().all(|item| names.insert(item.name.as_str()))
    }

    pub fn sort_by_name(&mut self) {
        self.items.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Recomputes totals and score against `targets` and returns the score.
    ///
    /// A banned item short-circuits with `DISQUALIFIED`; the totals are then left
    /// partially accumulated, which is harmless since such a diet always ranks last.
    pub fn evaluate(&mut self, targets: &NutritionTargets) -> f64 {
        self.total_protein = 0.0;
        self.total_carbs = 0.0;
        let mut penalty = 0.0;

        for item in &self.items {
            if item.matches_any(&targets.banned) {
                self.score = DISQUALIFIED;
                return self.score;
            }
            if item.matches_any(&targets.penalized) {
                penalty += PENALTY_PER_ITEM;
            }
            self.total_protein += item.protein;
            self.total_carbs += item.carbs;
        }

        let protein_diff = (targets.protein - self.total_protein).abs();
        let carbs_diff = (targets.carbs - self.total_carbs).abs();
        self.score = protein_diff + carbs_diff + penalty;
        self.score
    }

    pub fn is_disqualified(&self) -> bool {
        self.score == DISQUALIFIED
    }
}
