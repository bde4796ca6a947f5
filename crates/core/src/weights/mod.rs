//! Weight-set combination engine and CRUD service.

/// Weight-set CRUD over the authorized request path.
pub mod service;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::ApiError,
    models::{NewWeightSet, Weight, WeightSet},
};

pub use service::WeightSetService;

/// Multiply the selected weight sets into one combined multiplier table.
///
/// Every stat conceptually starts at the neutral multiplier 1.0 and is
/// multiplied, left to right over the input, by each value authored for
/// it. Stats whose combined value lands back on exactly 1.0 carry no
/// opinion and are dropped from the result. Because multiplication is
/// commutative, any ordering of the same sets yields the same table;
/// the output is sorted by stat name.
pub fn combine(selected: &[WeightSet]) -> Vec<Weight> {
    let combined = selected
        .iter()
        .flat_map(|set| set.weights.iter())
        .fold(BTreeMap::<&str, f64>::new(), |mut acc, weight| {
            *acc.entry(weight.stat.as_str()).or_insert(1.0) *= weight.value;
            acc
        });

    combined
        .into_iter()
        .filter(|(_, value)| *value != 1.0)
        .map(|(stat, value)| Weight {
            stat: stat.to_string(),
            value,
        })
        .collect()
}

/// Validate a weight-set draft before it is sent anywhere.
pub fn validate(draft: &NewWeightSet) -> Result<(), ApiError> {
    validate_name(&draft.name)?;
    validate_weights(&draft.weights)
}

/// Name rules: 2 to 50 characters after trimming.
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.len() < 2 {
        return Err(ApiError::Validation(
            "weight set name must be at least 2 characters".to_string(),
        ));
    }
    if trimmed.len() > 50 {
        return Err(ApiError::Validation(
            "weight set name must be at most 50 characters".to_string(),
        ));
    }
    Ok(())
}

/// Weight rules: non-empty, unique stats, finite non-negative values.
pub fn validate_weights(weights: &[Weight]) -> Result<(), ApiError> {
    if weights.is_empty() {
        return Err(ApiError::Validation(
            "at least one stat weight is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for weight in weights {
        if weight.stat.trim().is_empty() {
            return Err(ApiError::Validation(
                "every weight needs a stat name".to_string(),
            ));
        }
        if !weight.value.is_finite() || weight.value < 0.0 {
            return Err(ApiError::Validation(format!(
                "weight for {} must be a non-negative number",
                weight.stat
            )));
        }
        if !seen.insert(weight.stat.as_str()) {
            return Err(ApiError::Validation(format!(
                "duplicate stat: {}",
                weight.stat
            )));
        }
    }
    Ok(())
}

/// User-facing label for a stat identifier.
pub fn display_stat(stat: &str) -> String {
    STAT_LABELS
        .iter()
        .find(|(key, _)| *key == stat)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| stat.to_uppercase())
}

const STAT_LABELS: &[(&str, &str)] = &[
    ("hp", "HP"),
    ("mana", "Mana"),
    ("endur", "Endurance"),
    ("ac", "AC"),
    ("astr", "STR"),
    ("asta", "STA"),
    ("aagi", "AGI"),
    ("adex", "DEX"),
    ("awis", "WIS"),
    ("aint", "INT"),
    ("acha", "CHA"),
    ("heroic_str", "H-STR"),
    ("heroic_sta", "H-STA"),
    ("heroic_agi", "H-AGI"),
    ("heroic_dex", "H-DEX"),
    ("heroic_wis", "H-WIS"),
    ("heroic_int", "H-INT"),
    ("heroic_cha", "H-CHA"),
    ("fr", "FR"),
    ("cr", "CR"),
    ("pr", "PR"),
    ("dr", "DR"),
    ("mr", "MR"),
    ("damage", "DMG"),
    ("delay", "Delay"),
    ("w_eff", "W-Eff"),
    ("attack", "ATK"),
    ("haste", "Haste"),
    ("accuracy", "ACC"),
    ("avoidance", "Avoid"),
];
