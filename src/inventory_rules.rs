/*
Category and shelf-life tables used by the item consolidation engine.

The tables live in `data/inventory_rules.json`, which is embedded at compile
time. Setting `INVENTORY_RULES_PATH` replaces them at startup without a
rebuild.

Matching rules:
- Names are matched lowercase; a keyword only matches at the start of a word,
  so "tea" matches "green tea" but not "steak".
- The longest matching keyword wins; ties go to the rule listed first.
- An expiry rule with `"days": null` means the item does not expire.
- Without a matching expiry rule the category's default shelf life applies.
- `diet_staples` maps a dietary tag (matched case-insensitively) to items
  worth suggesting for the shopping list.
*/

use std::collections::HashMap;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

const EMBEDDED_RULES: &str = include_str!("../data/inventory_rules.json");
/// A century; anything longer is a typo in the override file.
const MAX_SHELF_LIFE_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryRules {
    pub default_category: String,
    pub default_measurement: String,
    #[serde(default)]
    pub measurement_aliases: HashMap<String, String>,
    pub categories: Vec<CategoryRule>,
    pub expiry_rules: Vec<ExpiryRule>,
    #[serde(default)]
    pub category_expiry_days: HashMap<String, i64>,
    #[serde(default)]
    pub diet_staples: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiryRule {
    pub label: String,
    pub keywords: Vec<String>,
    pub days: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to read inventory rules from {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid inventory rules document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid inventory rules: {0}")]
    Invalid(String),
}

impl InventoryRules {
    /// Tables shipped with the binary.
    pub fn embedded() -> Result<Self, RulesError> {
        Self::from_json(EMBEDDED_RULES)
    }

    /// Load the override file when a path is configured, otherwise the embedded tables.
    pub fn load(path: Option<&str>) -> Result<Self, RulesError> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(Path::new(p)).map_err(|source| RulesError::Io {
                    path: p.to_string(),
                    source,
                })?;
                tracing::info!("Loaded inventory rules from {}", p);
                Self::from_json(&raw)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, RulesError> {
        let mut rules: InventoryRules = serde_json::from_str(raw)?;
        rules.normalize()?;
        Ok(rules)
    }

    fn normalize(&mut self) -> Result<(), RulesError> {
        self.default_measurement = self.default_measurement.trim().to_lowercase();
        if self.default_measurement.is_empty() {
            return Err(RulesError::Invalid(
                "default_measurement cannot be empty".to_string(),
            ));
        }

        self.measurement_aliases = self
            .measurement_aliases
            .drain()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();

        for rule in &mut self.categories {
            lowercase_all(&mut rule.keywords);
        }
        for rule in &mut self.expiry_rules {
            lowercase_all(&mut rule.keywords);
            if matches!(rule.days, Some(d) if !valid_shelf_life(d)) {
                return Err(RulesError::Invalid(format!(
                    "expiry rule '{}' needs a shelf life between 0 and {} days",
                    rule.label, MAX_SHELF_LIFE_DAYS
                )));
            }
        }

        self.category_expiry_days = self
            .category_expiry_days
            .drain()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        if self.category_expiry_days.values().any(|d| !valid_shelf_life(*d)) {
            return Err(RulesError::Invalid(format!(
                "category shelf life must be between 0 and {} days",
                MAX_SHELF_LIFE_DAYS
            )));
        }

        self.diet_staples = self
            .diet_staples
            .drain()
            .map(|(diet, mut staples)| {
                staples.iter_mut().for_each(|s| *s = s.trim().to_string());
                staples.retain(|s| !s.is_empty());
                (diet.trim().to_lowercase(), staples)
            })
            .collect();

        Ok(())
    }

    /// Trim, lowercase and resolve aliases; empty means the default unit.
    pub fn normalize_measurement(&self, raw: Option<&str>) -> String {
        let unit = raw.map(|m| m.trim().to_lowercase()).unwrap_or_default();
        if unit.is_empty() {
            return self.default_measurement.clone();
        }
        self.measurement_aliases.get(&unit).cloned().unwrap_or(unit)
    }

    /// Category for an already-normalized item name.
    pub fn infer_category(&self, normalized_name: &str) -> String {
        best_match(
            self.categories
                .iter()
                .map(|rule| (rule, rule.keywords.as_slice())),
            normalized_name,
        )
        .map(|rule| rule.name.clone())
        .unwrap_or_else(|| self.default_category.clone())
    }

    /// Shelf life in days, or `None` when the item is not expected to expire.
    pub fn shelf_life_days(&self, normalized_name: &str, category: &str) -> Option<i64> {
        if let Some(rule) = best_match(
            self.expiry_rules
                .iter()
                .map(|rule| (rule, rule.keywords.as_slice())),
            normalized_name,
        ) {
            return rule.days;
        }

        let category = category.trim().to_lowercase();
        self.category_expiry_days
            .get(&category)
            .or_else(|| {
                self.category_expiry_days
                    .get(&self.default_category.to_lowercase())
            })
            .copied()
    }

    /// Staples for a dietary tag; unknown diets have none.
    pub fn staples_for(&self, diet: &str) -> &[String] {
        self.diet_staples
            .get(&diet.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn infer_expiry(
        &self,
        normalized_name: &str,
        category: &str,
        purchase_date: NaiveDate,
    ) -> Option<NaiveDate> {
        self.shelf_life_days(normalized_name, category)
            .and_then(Duration::try_days)
            .and_then(|shelf_life| purchase_date.checked_add_signed(shelf_life))
    }
}

fn valid_shelf_life(days: i64) -> bool {
    (0..=MAX_SHELF_LIFE_DAYS).contains(&days)
}

fn lowercase_all(keywords: &mut Vec<String>) {
    for k in keywords.iter_mut() {
        *k = k.trim().to_lowercase();
    }
    keywords.retain(|k| !k.is_empty());
}

/// Longest keyword hit across `candidates`; earlier entries win ties.
fn best_match<'a, T>(
    candidates: impl Iterator<Item = (&'a T, &'a [String])>,
    name: &str,
) -> Option<&'a T> {
    let mut best: Option<(&T, usize)> = None;
    for (item, keywords) in candidates {
        for keyword in keywords {
            if let Some(len) = word_start_match(name, keyword) {
                if best.map_or(true, |(_, l)| len > l) {
                    best = Some((item, len));
                }
            }
        }
    }
    best.map(|(item, _)| item)
}

fn word_start_match(name: &str, keyword: &str) -> Option<usize> {
    name.match_indices(keyword)
        .find(|(idx, _)| {
            name[..*idx]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
        })
        .map(|_| keyword.len())
}
