use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{info, warn};

use mockdata_core::{Metadata, VariableDescriptor, VariableKind};

use crate::coerce::output_type_fallback;
use crate::errors::GenerationError;
use crate::generators::categorical::{CategoricalConfig, generate_categorical};
use crate::generators::continuous::{ContinuousConfig, generate_continuous};
use crate::generators::date::{DateConfig, generate_date};
use crate::generators::survival::{SurvivalConfig, generate_survival};
use crate::generators::{Column, Table};
use crate::model::{ColumnReport, GenerateOptions, GenerationIssue, GenerationReport};

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub table: Table,
    pub report: GenerationReport,
}

/// Generates every applicable variable of a window into one table.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    options: GenerateOptions,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn run(&self, metadata: &Metadata) -> Result<GenerationResult, GenerationError> {
        let start = Instant::now();
        let options = &self.options;
        let window = options.window.trim();
        if window.is_empty() {
            return Err(GenerationError::MissingParameter(
                "applicability window".to_string(),
            ));
        }
        if let Some(selected) = &options.variables
            && let Some(unknown) = selected
                .iter()
                .find(|name| metadata.variable(name).is_none())
        {
            return Err(GenerationError::UnknownVariable(unknown.clone()));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = GenerationReport::new(run_id.clone(), options);
        let mut table = Table::new();

        let survival_names: BTreeSet<&str> = options
            .survival
            .as_ref()
            .map(|survival| survival.names().into_iter().collect())
            .unwrap_or_default();
        let variables: Vec<&VariableDescriptor> = metadata
            .variables_for(window)
            .filter(|variable| {
                options
                    .variables
                    .as_ref()
                    .is_none_or(|selected| selected.contains(&variable.name))
            })
            .filter(|variable| !survival_names.contains(variable.name.as_str()))
            .collect();

        info!(
            run_id = %run_id,
            window,
            variables = variables.len(),
            rows = options.rows,
            seed = options.seed,
            strict = options.strict,
            "generation started"
        );

        for variable in variables {
            let seed = derive_seed(options.seed, &variable.name);
            match self.generate_variable(metadata, variable, window, seed) {
                Ok(Some(column)) => {
                    info!(
                        variable = %variable.name,
                        window,
                        rows = column.len(),
                        missing = column.missing_count(),
                        "variable generated"
                    );
                    report.record_column(ColumnReport {
                        variable: variable.name.clone(),
                        generator: generator_id(variable.kind).to_string(),
                        output_type: column.output_type,
                        rows: column.len(),
                        missing: column.missing_count(),
                        seed,
                    });
                    table.push(column)?;
                    if let Some(reason) =
                        output_type_fallback(variable.output_type.as_deref(), variable.kind)
                    {
                        report.record_warning(
                            GenerationIssue::warning("unknown_output_type", reason)
                                .for_variable(&variable.name, window),
                        );
                    }
                }
                Ok(None) => {
                    warn!(variable = %variable.name, window, "coverage gap");
                    report.record_coverage_gap(&variable.name);
                }
                Err(err) if options.strict => {
                    warn!(variable = %variable.name, window, error = %err, "generation failed");
                    return Err(err);
                }
                Err(err) => {
                    warn!(variable = %variable.name, window, error = %err, "variable skipped");
                    report.record_failure(
                        GenerationIssue::error(failure_code(&err), err.to_string())
                            .for_variable(&variable.name, window),
                    );
                }
            }
        }

        if let Some(survival) = &options.survival {
            let seed = derive_seed(options.seed, &format!("survival:{}", survival.entry));
            let config = SurvivalConfig {
                entry: Some(survival.entry.clone()),
                window: Some(window.to_string()),
                event: survival.event.clone(),
                death: survival.death.clone(),
                ltfu: survival.ltfu.clone(),
                admin_censor: survival.admin_censor.clone(),
                n: options.rows,
                seed,
                source_format: options.source_format,
            };
            match generate_survival(metadata, &config) {
                Ok(survival_table) => {
                    for column in survival_table.columns() {
                        report.record_column(ColumnReport {
                            variable: column.name.clone(),
                            generator: "survival".to_string(),
                            output_type: column.output_type,
                            rows: column.len(),
                            missing: column.missing_count(),
                            seed,
                        });
                        table.push(column.clone())?;
                    }
                }
                Err(err) if options.strict => return Err(err),
                Err(err) => {
                    warn!(entry = %survival.entry, window, error = %err, "survival skipped");
                    report.record_failure(
                        GenerationIssue::error(failure_code(&err), err.to_string())
                            .for_variable(&survival.entry, window),
                    );
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            columns = report.columns.len(),
            coverage_gaps = report.coverage_gaps.len(),
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "generation completed"
        );
        Ok(GenerationResult { table, report })
    }

    fn generate_variable(
        &self,
        metadata: &Metadata,
        variable: &VariableDescriptor,
        window: &str,
        seed: u64,
    ) -> Result<Option<Column>, GenerationError> {
        let n = self.options.rows;
        match variable.kind {
            VariableKind::Categorical => {
                let config = CategoricalConfig {
                    proportions: self.options.proportions.get(&variable.name).cloned(),
                    ..CategoricalConfig::new(n, seed)
                };
                generate_categorical(metadata, &variable.name, window, &config)
            }
            VariableKind::Continuous => generate_continuous(
                metadata,
                &variable.name,
                window,
                &ContinuousConfig::new(n, seed),
            ),
            VariableKind::Date => {
                let config = DateConfig {
                    source_format: self.options.source_format,
                    ..DateConfig::new(n, seed)
                };
                generate_date(metadata, &variable.name, window, &config)
            }
            VariableKind::Derived => Ok(None),
        }
    }
}

fn generator_id(kind: VariableKind) -> &'static str {
    match kind {
        VariableKind::Categorical => "categorical",
        VariableKind::Continuous => "continuous",
        VariableKind::Date => "date",
        VariableKind::Derived => "derived",
    }
}

fn failure_code(err: &GenerationError) -> &'static str {
    match err {
        GenerationError::Metadata(mockdata_core::Error::Parse { .. }) => "parse_error",
        GenerationError::Metadata(mockdata_core::Error::ClassificationAmbiguity { .. }) => {
            "classification_ambiguity"
        }
        GenerationError::Metadata(_) => "invalid_metadata",
        GenerationError::ProportionCoverage { .. } => "proportion_coverage",
        GenerationError::ConstraintViolation { .. } => "constraint_violation",
        GenerationError::MissingParameter(_) => "missing_parameter",
        GenerationError::UnknownVariable(_) => "unknown_variable",
        GenerationError::Io(_) | GenerationError::Json(_) | GenerationError::Csv(_) => "io_error",
    }
}

/// Per-variable seed derived from the batch seed and a key.
pub fn derive_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
