use std::path::PathBuf;

use sha2::{Digest, Sha256};

use mockdata_core::{DetailRecord, Metadata, VariableRecord, load_metadata};
use mockdata_generate::{
    EventConfig, GenerateOptions, GenerationEngine, GenerationError, SurvivalVariables, Table,
    write_csv,
};

fn fixture_metadata() -> Metadata {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../metadata/examples");
    load_metadata(&root.join("variables.csv"), &root.join("variable_details.csv"))
        .expect("load example metadata")
}

fn hash_table(table: &Table) -> String {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, table).expect("write csv");
    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    hex::encode(hasher.finalize())
}

fn options(window: &str, seed: u64) -> GenerateOptions {
    GenerateOptions {
        window: window.to_string(),
        rows: 500,
        seed,
        ..GenerateOptions::default()
    }
}

fn variable(name: &str, variable_type: &str) -> VariableRecord {
    VariableRecord {
        variable: name.to_string(),
        variable_type: Some(variable_type.to_string()),
        database_start: Some("cchs2001_p, cchs2003_p".to_string()),
        ..VariableRecord::default()
    }
}

fn detail(name: &str, window: &str, rec_start: &str, rec_end: &str) -> DetailRecord {
    DetailRecord {
        variable: name.to_string(),
        database_start: Some(window.to_string()),
        rec_start: Some(rec_start.to_string()),
        rec_end: Some(rec_end.to_string()),
        ..DetailRecord::default()
    }
}

#[test]
fn batch_output_is_deterministic() {
    let metadata = fixture_metadata();
    let first = GenerationEngine::new(options("cycle1", 7))
        .run(&metadata)
        .expect("run A");
    let second = GenerationEngine::new(options("cycle1", 7))
        .run(&metadata)
        .expect("run B");
    let other = GenerationEngine::new(options("cycle1", 8))
        .run(&metadata)
        .expect("run C");

    assert_eq!(hash_table(&first.table), hash_table(&second.table));
    assert_ne!(hash_table(&first.table), hash_table(&other.table));
    assert_ne!(first.report.run_id, second.report.run_id);
}

#[test]
fn variable_output_does_not_depend_on_selection() {
    let metadata = fixture_metadata();
    let full = GenerationEngine::new(options("cycle1", 11))
        .run(&metadata)
        .expect("full run");
    let subset = GenerationEngine::new(GenerateOptions {
        variables: Some(vec!["age".to_string()]),
        ..options("cycle1", 11)
    })
    .run(&metadata)
    .expect("subset run");

    assert_eq!(subset.table.columns().len(), 1);
    assert_eq!(full.table.column("age"), subset.table.column("age"));
}

#[test]
fn derived_and_inapplicable_variables_are_not_generated() {
    let metadata = fixture_metadata();
    let result = GenerationEngine::new(options("cycle1", 3))
        .run(&metadata)
        .expect("run");

    assert!(result.table.column("bmi_der").is_none());
    assert!(result.table.column("height").is_none());
    assert!(result.table.column("smoking").is_some());
    assert_eq!(result.table.n_rows(), 500);
    assert!(result.report.failures.is_empty());
}

#[test]
fn coverage_gaps_are_recorded_not_fatal() {
    let metadata = Metadata::new(
        vec![variable("SMK_01", "Categorical"), variable("ALC_1", "Categorical")],
        vec![
            detail("SMK_01", "cchs2001_p", "1", "1"),
            detail("SMK_01", "cchs2001_p", "2", "2"),
            detail("ALC_1", "cchs2003_p", "1", "1"),
        ],
    )
    .expect("metadata");

    let result = GenerationEngine::new(GenerateOptions {
        strict: true,
        ..options("cchs2001_p", 1)
    })
    .run(&metadata)
    .expect("run");

    assert!(result.table.column("SMK_01").is_some());
    assert_eq!(result.report.coverage_gaps, vec!["ALC_1"]);
    assert_eq!(result.report.warnings_by_code["coverage_gap"], 1);
}

#[test]
fn strict_mode_aborts_on_ambiguous_classification() {
    let metadata = Metadata::new(
        vec![variable("SMK_01", "Categorical"), variable("ALC_1", "Categorical")],
        vec![
            detail("SMK_01", "cchs2001_p", "1", ""),
            detail("SMK_01", "cchs2001_p", "2", ""),
            detail("SMK_01", "cchs2001_p", "9", ""),
            detail("ALC_1", "cchs2001_p", "1", "1"),
        ],
    )
    .expect("metadata");

    let lenient = GenerationEngine::new(options("cchs2001_p", 1))
        .run(&metadata)
        .expect("lenient run");
    assert!(lenient.table.column("SMK_01").is_none());
    assert!(lenient.table.column("ALC_1").is_some());
    assert_eq!(lenient.report.failures.len(), 1);
    assert_eq!(lenient.report.failures[0].code, "classification_ambiguity");

    let strict = GenerationEngine::new(GenerateOptions {
        strict: true,
        ..options("cchs2001_p", 1)
    })
    .run(&metadata);
    assert!(matches!(strict, Err(GenerationError::Metadata(_))));
}

#[test]
fn unknown_selected_variable_is_rejected() {
    let metadata = fixture_metadata();
    let result = GenerationEngine::new(GenerateOptions {
        variables: Some(vec!["nope".to_string()]),
        ..options("cycle1", 1)
    })
    .run(&metadata);
    assert!(matches!(result, Err(GenerationError::UnknownVariable(_))));
}

#[test]
fn survival_columns_replace_independent_dates() {
    let metadata = fixture_metadata();
    let result = GenerationEngine::new(GenerateOptions {
        survival: Some(SurvivalVariables {
            entry: "entry_date".to_string(),
            event: Some(EventConfig::new("primary_event_date")),
            death: Some(EventConfig::new("death_date")),
            ..SurvivalVariables::default()
        }),
        ..options("cycle1", 5)
    })
    .run(&metadata)
    .expect("run");

    let usage = &result.report.generator_usage;
    assert_eq!(usage["survival"], 3);
    let entry = result.table.column("entry_date").expect("entry");
    let event = result.table.column("primary_event_date").expect("event");
    for (entry, event) in entry.values.iter().zip(&event.values) {
        if let (Some(entry), Some(event)) = (entry.as_date(), event.as_date()) {
            assert!(entry <= event);
        }
    }
    assert!(result.table.column("ltfu_date").is_some(), "unconfigured slots stay independent");
}
