use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::Rng;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use mockdata_core::{Metadata, RuleSet, VariableDescriptor, VariableKind};

use crate::coerce::OutputType;
use crate::errors::GenerationError;

pub mod categorical;
pub mod continuous;
pub mod date;
pub mod survival;

/// Generated value for one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Missing,
    Integer(i64),
    Double(f64),
    /// Category code of a factor or ordered factor.
    Category(String),
    Text(String),
    Logical(bool),
    Date(NaiveDate),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn to_csv(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Integer(value) => value.to_string(),
            Value::Double(value) => value.to_string(),
            Value::Category(value) | Value::Text(value) => value.clone(),
            Value::Logical(value) => String::from(if *value { "TRUE" } else { "FALSE" }),
            Value::Date(value) => value.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Category(value) | Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            _ => None,
        }
    }
}

/// One generated column. Labels are metadata; values hold the codes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub output_type: OutputType,
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Column {
    pub fn new(name: impl Into<String>, output_type: OutputType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            output_type,
            values,
            labels: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_missing()).count()
    }
}

/// Column-bound output table owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a column. All columns must have the same length and distinct names.
    pub fn push(&mut self, column: Column) -> Result<(), GenerationError> {
        if let Some(first) = self.columns.first()
            && first.len() != column.len()
        {
            return Err(GenerationError::constraint(
                &column.name,
                format!("column has {} rows, table has {}", column.len(), first.len()),
            ));
        }
        if self.column(&column.name).is_some() {
            return Err(GenerationError::constraint(
                &column.name,
                "column already present in table",
            ));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }
}

/// Row role after NA / invalid / garbage assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowRole {
    Valid,
    Missing,
    Special(usize),
}

/// Assign disjoint row sets: `round(n * prop_na)` missing rows, then
/// `round(n * p)` rows for each special proportion, in order.
pub(crate) fn assign_rows(
    n: usize,
    prop_na: f64,
    special: &[f64],
    rng: &mut ChaCha8Rng,
) -> Vec<RowRole> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut roles = vec![RowRole::Valid; n];
    let mut remaining = n;
    let mut cursor = 0;

    let mut take = |count: usize, role: RowRole, roles: &mut Vec<RowRole>| {
        let count = count.min(remaining);
        for index in &order[cursor..cursor + count] {
            roles[*index] = role;
        }
        cursor += count;
        remaining -= count;
    };

    take(expected_count(n, prop_na), RowRole::Missing, &mut roles);
    for (slot, proportion) in special.iter().enumerate() {
        take(expected_count(n, *proportion), RowRole::Special(slot), &mut roles);
    }
    roles
}

pub(crate) fn expected_count(n: usize, proportion: f64) -> usize {
    (n as f64 * proportion).round() as usize
}

pub(crate) fn check_proportion(
    variable: &str,
    field: &str,
    value: f64,
) -> Result<(), GenerationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GenerationError::constraint(
            variable,
            format!("{field} must be between 0 and 1, got {value}"),
        ))
    }
}

pub(crate) fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Uniform day offset in `[min, max]`.
pub(crate) fn random_days(rng: &mut ChaCha8Rng, min: i64, max: i64) -> i64 {
    if min >= max {
        min
    } else {
        rng.random_range(min..=max)
    }
}

/// Look up a variable and check its kind and applicability.
///
/// Returns `Ok(None)` when the variable is not declared for `window`, which
/// callers report as a coverage gap.
pub(crate) fn resolve_variable<'a>(
    metadata: &'a Metadata,
    variable: &str,
    window: &str,
    expected: VariableKind,
) -> Result<Option<(&'a VariableDescriptor, RuleSet)>, GenerationError> {
    if window.trim().is_empty() {
        return Err(GenerationError::MissingParameter(
            "applicability window".to_string(),
        ));
    }
    let descriptor = metadata
        .variable(variable)
        .ok_or_else(|| GenerationError::UnknownVariable(variable.to_string()))?;
    if descriptor.kind != expected {
        return Err(GenerationError::constraint(
            variable,
            format!(
                "declared as {:?}, cannot generate as {:?}",
                descriptor.kind, expected
            ),
        ));
    }
    if !descriptor.applies_to(window) {
        return Ok(None);
    }
    let rules = metadata
        .rule_set(variable, window)
        .map_err(GenerationError::from)?;
    Ok(Some((descriptor, rules)))
}
