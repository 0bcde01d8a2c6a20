use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notation::{Interval, parse_interval};
use crate::rules::RuleSet;
use crate::validation::validate_metadata;

/// One row of the variables table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableRecord {
    pub variable: String,
    #[serde(rename = "variableType", default)]
    pub variable_type: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "rType", default)]
    pub r_type: Option<String>,
    #[serde(rename = "databaseStart", default)]
    pub database_start: Option<String>,
    #[serde(rename = "variableStart", default)]
    pub variable_start: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(rename = "prop_NA", default, deserialize_with = "csv::invalid_option")]
    pub prop_na: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub prop_invalid: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub garbage_low_prop: Option<f64>,
    #[serde(default)]
    pub garbage_low_range: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub garbage_high_prop: Option<f64>,
    #[serde(default)]
    pub garbage_high_range: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub followup_min: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub followup_max: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub event_prop: Option<f64>,
    #[serde(rename = "sourceFormat", default)]
    pub source_format: Option<String>,
}

/// One row of the variable-details table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailRecord {
    pub variable: String,
    #[serde(rename = "databaseStart", default)]
    pub database_start: Option<String>,
    #[serde(rename = "recStart", default)]
    pub rec_start: Option<String>,
    #[serde(rename = "recEnd", default)]
    pub rec_end: Option<String>,
    #[serde(rename = "catLabel", default)]
    pub cat_label: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub proportion: Option<f64>,
}

/// Declared kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Categorical,
    Continuous,
    Date,
    Derived,
}

impl FromStr for VariableKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "categorical" | "cat" => Ok(VariableKind::Categorical),
            "continuous" | "cont" => Ok(VariableKind::Continuous),
            "date" => Ok(VariableKind::Date),
            "derived" => Ok(VariableKind::Derived),
            other => Err(Error::InvalidMetadata(format!(
                "unknown variableType '{other}'"
            ))),
        }
    }
}

/// Sampling shape used by the continuous, date and survival generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Uniform,
    Gompertz,
    Exponential,
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(Distribution::Uniform),
            "gompertz" => Ok(Distribution::Gompertz),
            "exponential" => Ok(Distribution::Exponential),
            other => Err(Error::InvalidMetadata(format!(
                "unknown distribution '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Distribution::Uniform => "uniform",
            Distribution::Gompertz => "gompertz",
            Distribution::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

/// Encoding used when emitting dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Native calendar date values.
    #[default]
    Analysis,
    /// ISO-8601 strings, as read back from a CSV file.
    Csv,
    /// Integer day offsets from 1960-01-01.
    Sas,
}

impl FromStr for SourceFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "analysis" => Ok(SourceFormat::Analysis),
            "csv" => Ok(SourceFormat::Csv),
            "sas" => Ok(SourceFormat::Sas),
            other => Err(Error::InvalidMetadata(format!(
                "unknown source format '{other}'"
            ))),
        }
    }
}

/// Out-of-range injection declared on a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GarbageSpec {
    pub proportion: f64,
    pub range: Interval,
}

/// Generation parameters carried by the variables table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    pub distribution: Option<Distribution>,
    pub prop_na: Option<f64>,
    pub prop_invalid: Option<f64>,
    pub garbage_low: Option<GarbageSpec>,
    pub garbage_high: Option<GarbageSpec>,
    pub followup_min: Option<i64>,
    pub followup_max: Option<i64>,
    pub event_prop: Option<f64>,
    pub source_format: Option<SourceFormat>,
}

/// Typed view of a variables-table row.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: VariableKind,
    /// Raw output-type tag (`rType`); resolved by the generators.
    pub output_type: Option<String>,
    pub windows: Vec<String>,
    pub variable_start: Option<String>,
    pub label: Option<String>,
    pub params: GenerationParams,
}

impl VariableDescriptor {
    pub fn from_record(record: &VariableRecord) -> Result<Self> {
        let name = record.variable.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidMetadata(
                "variables table contains a row without a variable name".to_string(),
            ));
        }
        let context = |err: Error| err.in_variable(&name);

        let role_is_derived = record
            .role
            .as_deref()
            .is_some_and(|role| role.to_ascii_lowercase().contains("derived"));
        let kind = match non_empty(record.variable_type.as_deref()) {
            _ if role_is_derived => VariableKind::Derived,
            Some(raw) => raw.parse::<VariableKind>().map_err(context)?,
            None => {
                return Err(Error::InvalidMetadata(format!(
                    "variable '{name}' has no variableType"
                )));
            }
        };

        let distribution = non_empty(record.distribution.as_deref())
            .map(str::parse::<Distribution>)
            .transpose()
            .map_err(context)?;
        let source_format = non_empty(record.source_format.as_deref())
            .map(str::parse::<SourceFormat>)
            .transpose()
            .map_err(context)?;
        let garbage_low = garbage_spec(record.garbage_low_prop, &record.garbage_low_range)
            .map_err(context)?;
        let garbage_high = garbage_spec(record.garbage_high_prop, &record.garbage_high_range)
            .map_err(context)?;

        Ok(Self {
            kind,
            output_type: non_empty(record.r_type.as_deref()).map(str::to_string),
            windows: split_windows(record.database_start.as_deref()),
            variable_start: non_empty(record.variable_start.as_deref()).map(str::to_string),
            label: non_empty(record.label.as_deref()).map(str::to_string),
            params: GenerationParams {
                distribution,
                prop_na: record.prop_na,
                prop_invalid: record.prop_invalid,
                garbage_low,
                garbage_high,
                followup_min: record.followup_min,
                followup_max: record.followup_max,
                event_prop: record.event_prop,
                source_format,
            },
            name,
        })
    }

    pub fn applies_to(&self, window: &str) -> bool {
        self.windows.iter().any(|candidate| candidate == window)
    }

    pub fn is_derived(&self) -> bool {
        self.kind == VariableKind::Derived
    }
}

fn garbage_spec(proportion: Option<f64>, range: &Option<String>) -> Result<Option<GarbageSpec>> {
    match (proportion, non_empty(range.as_deref())) {
        (None, None) => Ok(None),
        (Some(proportion), Some(range)) => Ok(Some(GarbageSpec {
            proportion,
            range: parse_interval(range)?,
        })),
        (Some(_), None) => Err(Error::InvalidMetadata(
            "garbage proportion given without a garbage range".to_string(),
        )),
        (None, Some(_)) => Err(Error::InvalidMetadata(
            "garbage range given without a garbage proportion".to_string(),
        )),
    }
}

/// Validated variables and details tables.
#[derive(Debug, Clone)]
pub struct Metadata {
    variables: Vec<VariableDescriptor>,
    details: BTreeMap<String, Vec<DetailRecord>>,
}

impl Metadata {
    /// Build from raw rows, validating both tables once.
    pub fn new(variables: Vec<VariableRecord>, details: Vec<DetailRecord>) -> Result<Self> {
        let variables = variables
            .iter()
            .map(VariableDescriptor::from_record)
            .collect::<Result<Vec<_>>>()?;

        let mut grouped: BTreeMap<String, Vec<DetailRecord>> = BTreeMap::new();
        for detail in details {
            grouped
                .entry(detail.variable.trim().to_string())
                .or_default()
                .push(detail);
        }

        validate_metadata(&variables, &grouped)?;
        Ok(Self {
            variables,
            details: grouped,
        })
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Non-derived variables declared for `window`, in table order.
    pub fn variables_for<'a>(
        &'a self,
        window: &'a str,
    ) -> impl Iterator<Item = &'a VariableDescriptor> + 'a {
        self.variables
            .iter()
            .filter(move |variable| !variable.is_derived() && variable.applies_to(window))
    }

    /// Detail rows of `variable` that apply to `window`.
    ///
    /// Rows with an empty `databaseStart` apply to every window.
    pub fn details_for(&self, variable: &str, window: &str) -> Vec<&DetailRecord> {
        self.details
            .get(variable)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        let windows = split_windows(row.database_start.as_deref());
                        windows.is_empty() || windows.iter().any(|candidate| candidate == window)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Typed rule set of `variable` restricted to `window`.
    pub fn rule_set(&self, variable: &str, window: &str) -> Result<RuleSet> {
        RuleSet::from_details(variable, &self.details_for(variable, window))
    }
}

/// Split a comma-separated `databaseStart` cell.
pub fn split_windows(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|window| !window.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(variable: &str, variable_type: &str) -> VariableRecord {
        VariableRecord {
            variable: variable.to_string(),
            variable_type: Some(variable_type.to_string()),
            database_start: Some("cchs2001_p, cchs2003_p".to_string()),
            ..VariableRecord::default()
        }
    }

    #[test]
    fn descriptor_parses_parameters() {
        let mut row = record("HWTGHTM", "Continuous");
        row.distribution = Some("Gompertz".to_string());
        row.garbage_high_prop = Some(0.03);
        row.garbage_high_range = Some("[150,200]".to_string());

        let descriptor = VariableDescriptor::from_record(&row).expect("descriptor");
        assert_eq!(descriptor.kind, VariableKind::Continuous);
        assert_eq!(descriptor.params.distribution, Some(Distribution::Gompertz));
        assert_eq!(descriptor.windows, vec!["cchs2001_p", "cchs2003_p"]);
        let garbage = descriptor.params.garbage_high.expect("garbage");
        assert_eq!(garbage.range.numeric_bounds(), Some((150.0, 200.0)));
    }

    #[test]
    fn derived_role_overrides_type() {
        let mut row = record("HWTGBMI_der", "Continuous");
        row.role = Some("derived, enabled".to_string());
        let descriptor = VariableDescriptor::from_record(&row).expect("descriptor");
        assert!(descriptor.is_derived());
    }

    #[test]
    fn garbage_range_requires_proportion() {
        let mut row = record("HWTGHTM", "Continuous");
        row.garbage_low_range = Some("[0,10]".to_string());
        assert!(matches!(
            VariableDescriptor::from_record(&row),
            Err(Error::InvalidMetadata(_))
        ));
    }

    #[test]
    fn details_without_window_apply_everywhere() {
        let metadata = Metadata::new(
            vec![record("SMK_01", "Categorical")],
            vec![
                DetailRecord {
                    variable: "SMK_01".to_string(),
                    rec_start: Some("1".to_string()),
                    rec_end: Some("1".to_string()),
                    ..DetailRecord::default()
                },
                DetailRecord {
                    variable: "SMK_01".to_string(),
                    database_start: Some("cchs2003_p".to_string()),
                    rec_start: Some("2".to_string()),
                    rec_end: Some("2".to_string()),
                    ..DetailRecord::default()
                },
            ],
        )
        .expect("metadata");

        assert_eq!(metadata.details_for("SMK_01", "cchs2001_p").len(), 1);
        assert_eq!(metadata.details_for("SMK_01", "cchs2003_p").len(), 2);
        assert_eq!(metadata.variables_for("cchs2001_p").count(), 1);
        assert_eq!(metadata.variables_for("cchs2015_p").count(), 0);
    }
}
