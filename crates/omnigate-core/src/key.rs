use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A credential usable against a provider, scoped to the models it supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub value: String,
    pub models: HashSet<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Key {
    pub fn new(value: impl Into<String>, models: impl IntoIterator<Item = String>) -> Self {
        Self {
            value: value.into(),
            models: models.into_iter().collect(),
            weight: 1.0,
        }
    }

    pub fn supports(&self, model: &str) -> bool {
        !self.value.is_empty() && self.models.contains(model)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySelectionError {
    #[error("no keys found that support model {0}")]
    NoKeyForModel(String),
}

/// Picks a key among those that support `model`, weighted by `Key::weight`.
///
/// A single match is returned directly. Multiple matches are weighted random;
/// if every candidate has zero weight, the first candidate (in the order the
/// account returned them) is used instead of panicking on an empty roll.
pub fn select_key(keys: &[Key], model: &str) -> Result<&Key, KeySelectionError> {
    let candidates: Vec<&Key> = keys.iter().filter(|k| k.supports(model)).collect();

    match candidates.len() {
        0 => Err(KeySelectionError::NoKeyForModel(model.to_string())),
        1 => Ok(candidates[0]),
        _ => Ok(weighted_pick(&candidates)),
    }
}

fn weighted_pick<'a>(candidates: &[&'a Key]) -> &'a Key {
    let total: f64 = candidates.iter().map(|k| k.weight.max(0.0)).sum();
    if total <= 0.0 {
        return candidates[0];
    }

    let mut roll = rand::rng().random_range(0.0..total);
    for key in candidates {
        let weight = key.weight.max(0.0);
        if roll < weight {
            return key;
        }
        roll -= weight;
    }
    candidates[candidates.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: &str, models: &[&str], weight: f64) -> Key {
        Key {
            value: value.into(),
            models: models.iter().map(|m| m.to_string()).collect(),
            weight,
        }
    }

    #[test]
    fn no_matching_key_is_an_error() {
        let keys = vec![key("a", &["gpt-4o"], 1.0)];
        let err = select_key(&keys, "gpt-5").unwrap_err();
        assert_eq!(err, KeySelectionError::NoKeyForModel("gpt-5".to_string()));
    }

    #[test]
    fn single_match_is_returned_without_rolling() {
        let keys = vec![key("a", &["gpt-4o"], 0.0)];
        let picked = select_key(&keys, "gpt-4o").unwrap();
        assert_eq!(picked.value, "a");
    }

    #[test]
    fn zero_total_weight_falls_back_to_first_candidate() {
        let keys = vec![
            key("a", &["gpt-4o"], 0.0),
            key("b", &["gpt-4o"], 0.0),
            key("c", &["gpt-4o"], 0.0),
        ];
        let picked = select_key(&keys, "gpt-4o").unwrap();
        assert_eq!(picked.value, "a");
    }

    #[test]
    fn empty_value_keys_never_match() {
        let keys = vec![key("", &["gpt-4o"], 1.0)];
        assert!(select_key(&keys, "gpt-4o").is_err());
    }

    #[test]
    fn weighted_pick_only_returns_supporting_keys() {
        let keys = vec![key("a", &["gpt-4o"], 5.0), key("b", &["o3"], 5.0)];
        for _ in 0..50 {
            let picked = select_key(&keys, "gpt-4o").unwrap();
            assert_eq!(picked.value, "a");
        }
    }
}
