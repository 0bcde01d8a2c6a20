use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mockdata_core::{ELSE_TOKEN, Metadata, Target, VariableKind};

use crate::coerce::{OutputType, coerce_code, resolve_output_type};
use crate::errors::GenerationError;
use crate::generators::{Column, Value, seeded_rng, resolve_variable};
use crate::proportions::{CategoryWeight, CumulativeWeights, resolve_proportions};

/// Parameters of one categorical generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoricalConfig {
    pub n: usize,
    pub seed: u64,
    /// Caller-supplied proportions keyed by code. The key `else` weights the
    /// fallback slot, which is emitted as a missing value.
    pub proportions: Option<BTreeMap<String, f64>>,
    /// Overrides the variable's `rType`.
    pub output_type: Option<OutputType>,
}

impl CategoricalConfig {
    pub fn new(n: usize, seed: u64) -> Self {
        Self {
            n,
            seed,
            ..Self::default()
        }
    }

    pub fn with_proportions(mut self, proportions: BTreeMap<String, f64>) -> Self {
        self.proportions = Some(proportions);
        self
    }

    pub fn validate(&self, variable: &str) -> Result<(), GenerationError> {
        if let Some(proportions) = &self.proportions
            && proportions.is_empty()
        {
            return Err(GenerationError::proportions(
                variable,
                "explicit proportions are empty",
            ));
        }
        if self.output_type == Some(OutputType::Date) {
            return Err(GenerationError::constraint(
                variable,
                "categorical codes cannot be emitted as dates",
            ));
        }
        Ok(())
    }
}

struct Slot<'a> {
    code: &'a str,
    metadata: Option<f64>,
    value: Value,
}

/// Draw `config.n` codes of a categorical variable for `window`.
///
/// Returns `Ok(None)` when the variable has no categories in the window.
pub fn generate_categorical(
    metadata: &Metadata,
    variable: &str,
    window: &str,
    config: &CategoricalConfig,
) -> Result<Option<Column>, GenerationError> {
    config.validate(variable)?;
    let Some((descriptor, rules)) =
        resolve_variable(metadata, variable, window, VariableKind::Categorical)?
    else {
        return Ok(None);
    };
    let classified = rules.classify()?;
    if classified.is_empty() {
        debug!(variable, window, "no categories to generate");
        return Ok(None);
    }

    let output = config.output_type.unwrap_or_else(|| {
        resolve_output_type(
            variable,
            descriptor.output_type.as_deref(),
            VariableKind::Categorical,
        )
    });

    let mut slots = Vec::new();
    let mut labels = BTreeMap::new();
    for category in classified.all() {
        slots.push(Slot {
            code: &category.code,
            metadata: category.proportion,
            value: coerce_code(variable, &category.code, category.class, output)?,
        });
        if let Some(label) = &category.label {
            labels.insert(category.code.clone(), label.clone());
        }
    }

    if let Some(fallback) = &classified.fallback {
        let requested = match &config.proportions {
            Some(explicit) => explicit.contains_key(ELSE_TOKEN),
            None => fallback.proportion.is_some(),
        };
        if requested {
            let value = match &fallback.target {
                Target::Code(code) => coerce_code(variable, code, fallback.target.class(), output)?,
                _ => Value::Missing,
            };
            slots.push(Slot {
                code: ELSE_TOKEN,
                metadata: fallback.proportion,
                value,
            });
        }
    }

    let weights: Vec<CategoryWeight<'_>> = slots
        .iter()
        .map(|slot| CategoryWeight {
            code: slot.code,
            metadata: slot.metadata,
        })
        .collect();
    let resolved = resolve_proportions(variable, &weights, config.proportions.as_ref())?;
    let cumulative = CumulativeWeights::new(&resolved.probabilities);

    let mut rng = seeded_rng(config.seed);
    let values = (0..config.n)
        .map(|_| slots[cumulative.sample(&mut rng)].value.clone())
        .collect();

    debug!(
        variable,
        window,
        rows = config.n,
        categories = slots.len(),
        source = ?resolved.source,
        output = %output,
        "categorical column generated"
    );

    let mut column = Column::new(variable, output, values);
    column.labels = labels;
    Ok(Some(column))
}
