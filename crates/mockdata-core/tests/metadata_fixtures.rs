use std::path::PathBuf;

use mockdata_core::{
    CodeClass, Error, Metadata, MissingKind, Target, VariableKind, load_metadata,
    resolve_source_name,
};

fn fixture_metadata() -> Metadata {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../metadata/examples");
    load_metadata(&root.join("variables.csv"), &root.join("variable_details.csv"))
        .expect("load example metadata")
}

#[test]
fn derived_variables_are_filtered_before_generation() {
    let metadata = fixture_metadata();
    let names: Vec<&str> = metadata
        .variables_for("cycle1")
        .map(|variable| variable.name.as_str())
        .collect();

    assert!(!names.contains(&"bmi_der"));
    assert!(!names.contains(&"height"), "height is only declared for cycle2");
    assert!(names.contains(&"smoking"));
    assert_eq!(
        metadata.variable("bmi_der").map(|variable| variable.kind),
        Some(VariableKind::Derived)
    );
}

#[test]
fn smoking_codes_split_into_valid_and_missing() {
    let metadata = fixture_metadata();
    let rules = metadata.rule_set("smoking", "cycle1").expect("rule set");

    assert_eq!(
        rules.codes(CodeClass::Valid).expect("valid codes"),
        vec!["1", "2", "3"]
    );
    assert_eq!(
        rules.codes(CodeClass::Missing).expect("missing codes"),
        vec!["996", "997", "998", "999"]
    );

    let classified = rules.classify().expect("classify");
    let valid_skip = classified
        .missing
        .iter()
        .find(|category| category.code == "996")
        .expect("996 present");
    assert_eq!(valid_skip.missing_kind, Some(MissingKind::NotApplicable));
}

#[test]
fn else_row_becomes_fallback() {
    let metadata = fixture_metadata();
    let classified = metadata
        .rule_set("alcohol", "cycle2")
        .expect("rule set")
        .classify()
        .expect("classify");

    assert!(classified.all().all(|category| category.code != "else"));
    assert_eq!(
        classified.fallback.map(|fallback| fallback.target),
        Some(Target::Missing(MissingKind::NoResponse))
    );
}

#[test]
fn variable_start_resolves_per_window() {
    let metadata = fixture_metadata();
    let smoking = metadata.variable("smoking").expect("smoking");
    let expression = smoking.variable_start.as_deref().expect("variableStart");

    assert_eq!(
        resolve_source_name(expression, "cycle1").expect("resolve"),
        Some("SMK_01".to_string())
    );
    assert_eq!(
        resolve_source_name(expression, "cycle2").expect("resolve"),
        Some("SMOKING".to_string())
    );
}

#[test]
fn undeclared_detail_variable_is_rejected() {
    let details = vec![mockdata_core::DetailRecord {
        variable: "ghost".to_string(),
        rec_start: Some("1".to_string()),
        ..Default::default()
    }];
    assert!(matches!(
        Metadata::new(Vec::new(), details),
        Err(Error::InvalidMetadata(_))
    ));
}
