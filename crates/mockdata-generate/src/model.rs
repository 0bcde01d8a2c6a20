use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mockdata_core::SourceFormat;

use crate::coerce::OutputType;
use crate::generators::survival::EventConfig;

/// Options for the batch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Applicability window (`databaseStart` value) to generate for.
    pub window: String,
    /// Rows per generated column.
    pub rows: usize,
    /// Batch seed; each variable derives its own seed from it.
    pub seed: u64,
    /// Overrides each date variable's `sourceFormat`.
    pub source_format: Option<SourceFormat>,
    /// Abort on the first failing variable instead of recording it.
    pub strict: bool,
    /// Restrict generation to these variables, in table order.
    pub variables: Option<Vec<String>>,
    /// Explicit categorical proportions keyed by variable, then code.
    pub proportions: BTreeMap<String, BTreeMap<String, f64>>,
    /// Generate these date variables together as survival data.
    pub survival: Option<SurvivalVariables>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            window: String::new(),
            rows: 1000,
            seed: 12345,
            source_format: None,
            strict: false,
            variables: None,
            proportions: BTreeMap::new(),
            survival: None,
        }
    }
}

/// Survival slots of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurvivalVariables {
    pub entry: String,
    pub event: Option<EventConfig>,
    pub death: Option<EventConfig>,
    pub ltfu: Option<EventConfig>,
    pub admin_censor: Option<EventConfig>,
}

impl SurvivalVariables {
    /// Variable names generated by the survival generator.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.entry.as_str())
            .chain(
                [&self.event, &self.death, &self.ltfu, &self.admin_censor]
                    .into_iter()
                    .flatten()
                    .map(|event| event.variable.as_str()),
            )
            .collect()
    }
}

/// Summary of one generated column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnReport {
    pub variable: String,
    pub generator: String,
    pub output_type: OutputType,
    pub rows: usize,
    pub missing: usize,
    pub seed: u64,
}

/// Structured generation issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub level: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
}

impl GenerationIssue {
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: "warning".to_string(),
            code: code.to_string(),
            message: message.into(),
            variable: None,
            window: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: "error".to_string(),
            ..Self::warning(code, message)
        }
    }

    pub fn for_variable(mut self, variable: &str, window: &str) -> Self {
        self.variable = Some(variable.to_string());
        self.window = Some(window.to_string());
        self
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub window: String,
    pub rows: usize,
    pub seed: u64,
    pub columns: Vec<ColumnReport>,
    pub coverage_gaps: Vec<String>,
    pub generator_usage: BTreeMap<String, u64>,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<GenerationIssue>,
    pub failures: Vec<GenerationIssue>,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(run_id: String, options: &GenerateOptions) -> Self {
        Self {
            run_id,
            window: options.window.clone(),
            rows: options.rows,
            seed: options.seed,
            columns: Vec::new(),
            coverage_gaps: Vec::new(),
            generator_usage: BTreeMap::new(),
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn record_column(&mut self, column: ColumnReport) {
        *self
            .generator_usage
            .entry(column.generator.clone())
            .or_insert(0) += 1;
        self.columns.push(column);
    }

    pub fn record_coverage_gap(&mut self, variable: &str) {
        self.coverage_gaps.push(variable.to_string());
        let issue = GenerationIssue::warning(
            "coverage_gap",
            "no categories or range resolvable for this window",
        )
        .for_variable(variable, &self.window);
        self.record_warning(issue);
    }

    pub fn record_warning(&mut self, issue: GenerationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.warnings.push(issue);
    }

    pub fn record_failure(&mut self, issue: GenerationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.failures.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_unset_fields_with_defaults() {
        let options: GenerateOptions = serde_json::from_str(
            r#"{"window":"cycle1","rows":50,"proportions":{"smoking":{"1":0.5,"2":0.5}}}"#,
        )
        .expect("options");
        assert_eq!(options.window, "cycle1");
        assert_eq!(options.rows, 50);
        assert_eq!(options.seed, 12345);
        assert!(!options.strict);
        assert_eq!(options.proportions["smoking"].len(), 2);
    }

    #[test]
    fn coverage_gaps_are_counted_by_code() {
        let options = GenerateOptions {
            window: "cycle2".to_string(),
            ..GenerateOptions::default()
        };
        let mut report = GenerationReport::new("run".to_string(), &options);
        report.record_coverage_gap("height");
        assert_eq!(report.coverage_gaps, vec!["height"]);
        assert_eq!(report.warnings_by_code["coverage_gap"], 1);
        assert_eq!(report.warnings[0].window.as_deref(), Some("cycle2"));
    }

    #[test]
    fn survival_names_list_configured_slots() {
        let survival = SurvivalVariables {
            entry: "entry_date".to_string(),
            death: Some(EventConfig::new("death_date")),
            ..SurvivalVariables::default()
        };
        assert_eq!(survival.names(), vec!["entry_date", "death_date"]);
    }
}
