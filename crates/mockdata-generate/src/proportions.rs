//! Probability vectors over a variable's categories.

use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::GenerationError;

/// Allowed deviation of a proportion sum from 1 before it is an error.
pub const PROPORTION_TOLERANCE: f64 = 0.01;

/// Where a resolved probability vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProportionSource {
    Explicit,
    Metadata,
    Uniform,
}

/// One category offered to the resolver, with its metadata proportion.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryWeight<'a> {
    pub code: &'a str,
    pub metadata: Option<f64>,
}

/// Probability vector aligned with the categories it was resolved for.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProportions {
    pub probabilities: Vec<f64>,
    pub source: ProportionSource,
}

/// Resolve probabilities for `categories`.
///
/// An explicit map wins and must name exactly the given categories. Otherwise
/// metadata proportions are used when every category carries one, and a
/// uniform vector when none do.
pub fn resolve_proportions(
    variable: &str,
    categories: &[CategoryWeight<'_>],
    explicit: Option<&BTreeMap<String, f64>>,
) -> Result<ResolvedProportions, GenerationError> {
    if categories.is_empty() {
        return Ok(ResolvedProportions {
            probabilities: Vec::new(),
            source: ProportionSource::Uniform,
        });
    }

    if let Some(explicit) = explicit {
        let mut weights = Vec::with_capacity(categories.len());
        for category in categories {
            let weight = explicit.get(category.code).ok_or_else(|| {
                GenerationError::proportions(
                    variable,
                    format!("explicit proportions omit category '{}'", category.code),
                )
            })?;
            weights.push(*weight);
        }
        if let Some(unknown) = explicit
            .keys()
            .find(|key| !categories.iter().any(|category| category.code == key.as_str()))
        {
            return Err(GenerationError::proportions(
                variable,
                format!("explicit proportions name unknown category '{unknown}'"),
            ));
        }
        let probabilities = normalize(variable, weights, ProportionSource::Explicit)?;
        return Ok(ResolvedProportions {
            probabilities,
            source: ProportionSource::Explicit,
        });
    }

    let declared = categories
        .iter()
        .filter(|category| category.metadata.is_some())
        .count();
    if declared == 0 {
        let share = 1.0 / categories.len() as f64;
        return Ok(ResolvedProportions {
            probabilities: vec![share; categories.len()],
            source: ProportionSource::Uniform,
        });
    }
    if declared < categories.len() {
        let undeclared: Vec<&str> = categories
            .iter()
            .filter(|category| category.metadata.is_none())
            .map(|category| category.code)
            .collect();
        return Err(GenerationError::proportions(
            variable,
            format!(
                "metadata proportions missing for categories {}",
                undeclared.join(", ")
            ),
        ));
    }

    let weights = categories
        .iter()
        .map(|category| category.metadata.unwrap_or_default())
        .collect();
    let probabilities = normalize(variable, weights, ProportionSource::Metadata)?;
    Ok(ResolvedProportions {
        probabilities,
        source: ProportionSource::Metadata,
    })
}

fn normalize(
    variable: &str,
    weights: Vec<f64>,
    source: ProportionSource,
) -> Result<Vec<f64>, GenerationError> {
    if let Some(bad) = weights
        .iter()
        .find(|weight| !weight.is_finite() || **weight < 0.0)
    {
        return Err(GenerationError::proportions(
            variable,
            format!("proportion {bad} is not a non-negative number"),
        ));
    }
    let total: f64 = weights.iter().sum();
    let deviation = (total - 1.0).abs();
    if deviation > PROPORTION_TOLERANCE {
        return Err(GenerationError::proportions(
            variable,
            format!("{source:?} proportions sum to {total}, expected 1 (tolerance {PROPORTION_TOLERANCE})"),
        ));
    }
    if deviation > f64::EPSILON * weights.len() as f64 {
        warn!(variable, total, source = ?source, "renormalizing proportions");
    }
    Ok(weights.into_iter().map(|weight| weight / total).collect())
}

/// Cumulative distribution used to draw category indices.
#[derive(Debug, Clone)]
pub(crate) struct CumulativeWeights {
    cumulative: Vec<f64>,
}

impl CumulativeWeights {
    pub(crate) fn new(probabilities: &[f64]) -> Self {
        let mut running = 0.0;
        let cumulative = probabilities
            .iter()
            .map(|probability| {
                running += probability;
                running
            })
            .collect();
        Self { cumulative }
    }

    pub(crate) fn sample(&self, rng: &mut ChaCha8Rng) -> usize {
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        let target = rng.random::<f64>() * total;
        let index = self.cumulative.partition_point(|bound| *bound <= target);
        index.min(self.cumulative.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights<'a>(codes: &[(&'a str, Option<f64>)]) -> Vec<CategoryWeight<'a>> {
        codes
            .iter()
            .map(|(code, metadata)| CategoryWeight {
                code: *code,
                metadata: *metadata,
            })
            .collect()
    }

    #[test]
    fn uniform_covers_missing_codes_too() {
        let categories = weights(&[("1", None), ("2", None), ("996", None), ("999", None)]);
        let resolved = resolve_proportions("x", &categories, None).expect("resolve");
        assert_eq!(resolved.source, ProportionSource::Uniform);
        assert_eq!(resolved.probabilities, vec![0.25; 4]);
    }

    #[test]
    fn explicit_map_must_cover_every_category() {
        let categories = weights(&[("1", Some(0.5)), ("2", Some(0.5)), ("996", None)]);
        let explicit = BTreeMap::from([("1".to_string(), 0.6), ("2".to_string(), 0.4)]);
        assert!(matches!(
            resolve_proportions("x", &categories, Some(&explicit)),
            Err(GenerationError::ProportionCoverage { .. })
        ));
    }

    #[test]
    fn explicit_map_wins_over_metadata() {
        let categories = weights(&[("1", Some(0.5)), ("2", Some(0.5))]);
        let explicit = BTreeMap::from([("1".to_string(), 0.9), ("2".to_string(), 0.1)]);
        let resolved = resolve_proportions("x", &categories, Some(&explicit)).expect("resolve");
        assert_eq!(resolved.source, ProportionSource::Explicit);
        assert!((resolved.probabilities[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn unknown_explicit_category_is_rejected() {
        let categories = weights(&[("1", None)]);
        let explicit = BTreeMap::from([("1".to_string(), 0.5), ("else".to_string(), 0.5)]);
        assert!(resolve_proportions("x", &categories, Some(&explicit)).is_err());
    }

    #[test]
    fn metadata_within_tolerance_is_renormalized() {
        let categories = weights(&[("1", Some(0.502)), ("2", Some(0.5))]);
        let resolved = resolve_proportions("x", &categories, None).expect("resolve");
        assert_eq!(resolved.source, ProportionSource::Metadata);
        let total: f64 = resolved.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn metadata_far_from_one_fails() {
        let categories = weights(&[("1", Some(0.3)), ("2", Some(0.3))]);
        assert!(matches!(
            resolve_proportions("x", &categories, None),
            Err(GenerationError::ProportionCoverage { .. })
        ));
    }

    #[test]
    fn partial_metadata_fails() {
        let categories = weights(&[("1", Some(0.5)), ("2", None)]);
        assert!(resolve_proportions("x", &categories, None).is_err());
    }

    #[test]
    fn cumulative_sampling_skips_zero_weights() {
        let weights = CumulativeWeights::new(&[0.0, 1.0, 0.0]);
        let mut rng = crate::generators::seeded_rng(3);
        for _ in 0..100 {
            assert_eq!(weights.sample(&mut rng), 1);
        }
    }
}
