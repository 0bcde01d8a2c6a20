use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::identifier::parse_variable_start;
use crate::metadata::{DetailRecord, VariableDescriptor, non_empty};

/// Validate internal consistency of the variables and details tables.
///
/// This checks:
/// - duplicate variable names
/// - detail rows referring to undeclared variables
/// - at most one `else` row per variable and window
/// - `variableStart` expressions parse
/// - declared proportions are within `[0, 1]`
pub fn validate_metadata(
    variables: &[VariableDescriptor],
    details: &BTreeMap<String, Vec<DetailRecord>>,
) -> Result<()> {
    let mut names = BTreeSet::new();
    for variable in variables {
        if !names.insert(variable.name.as_str()) {
            return Err(Error::InvalidMetadata(format!(
                "duplicate variable name: {}",
                variable.name
            )));
        }

        if let Some(expression) = variable.variable_start.as_deref() {
            parse_variable_start(expression).map_err(|err| err.in_variable(&variable.name))?;
        }

        let params = &variable.params;
        let proportions = [
            ("prop_NA", params.prop_na),
            ("prop_invalid", params.prop_invalid),
            ("event_prop", params.event_prop),
            (
                "garbage_low_prop",
                params.garbage_low.as_ref().map(|spec| spec.proportion),
            ),
            (
                "garbage_high_prop",
                params.garbage_high.as_ref().map(|spec| spec.proportion),
            ),
        ];
        for (field, value) in proportions {
            if let Some(value) = value
                && !(0.0..=1.0).contains(&value)
            {
                return Err(Error::InvalidMetadata(format!(
                    "variable '{}': {field} must be between 0 and 1, got {value}",
                    variable.name
                )));
            }
        }
    }

    for (variable, rows) in details {
        if !names.contains(variable.as_str()) {
            return Err(Error::InvalidMetadata(format!(
                "variable_details refers to undeclared variable: {variable}"
            )));
        }

        let mut else_windows: BTreeSet<String> = BTreeSet::new();
        for row in rows {
            if let Some(proportion) = row.proportion
                && !(0.0..=1.0).contains(&proportion)
            {
                return Err(Error::InvalidMetadata(format!(
                    "variable '{variable}': proportion must be between 0 and 1, got {proportion}"
                )));
            }

            let is_else = non_empty(row.rec_start.as_deref())
                .is_some_and(|value| value.eq_ignore_ascii_case(crate::notation::ELSE_TOKEN));
            if !is_else {
                continue;
            }
            let window = non_empty(row.database_start.as_deref())
                .unwrap_or_default()
                .to_string();
            if !else_windows.insert(window) {
                return Err(Error::InvalidMetadata(format!(
                    "variable '{variable}' has more than one 'else' row"
                )));
            }
        }
    }

    Ok(())
}
