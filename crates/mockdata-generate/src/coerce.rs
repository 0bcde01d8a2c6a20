//! Output-type tags and value coercion.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use mockdata_core::{CodeClass, Interval, VariableKind};

use crate::errors::GenerationError;
use crate::generators::Value;

/// Representation selected for a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Integer,
    Double,
    /// Labeled enumeration over the category codes.
    Factor,
    /// Ordered enumeration; codes keep table order.
    Ordered,
    Character,
    Logical,
    Date,
}

impl OutputType {
    /// Representation used when no tag is declared.
    pub fn default_for(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Continuous => OutputType::Double,
            VariableKind::Date => OutputType::Date,
            VariableKind::Categorical | VariableKind::Derived => OutputType::Factor,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let output = match tag.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => OutputType::Integer,
            "double" | "numeric" | "float" => OutputType::Double,
            "factor" => OutputType::Factor,
            "ordered" | "ordinal" => OutputType::Ordered,
            "character" | "string" | "text" => OutputType::Character,
            "logical" | "boolean" | "bool" => OutputType::Logical,
            "date" => OutputType::Date,
            _ => return None,
        };
        Some(output)
    }

    fn supports(self, kind: VariableKind) -> bool {
        match kind {
            VariableKind::Continuous => matches!(self, OutputType::Integer | OutputType::Double),
            VariableKind::Date => self == OutputType::Date,
            VariableKind::Categorical | VariableKind::Derived => self != OutputType::Date,
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputType::Integer => "integer",
            OutputType::Double => "double",
            OutputType::Factor => "factor",
            OutputType::Ordered => "ordered",
            OutputType::Character => "character",
            OutputType::Logical => "logical",
            OutputType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Resolve an `rType` tag for a variable of `kind`.
///
/// Unknown tags, and tags that do not apply to the kind, fall back to the
/// kind's default with a warning.
pub fn resolve_output_type(variable: &str, tag: Option<&str>, kind: VariableKind) -> OutputType {
    let default = OutputType::default_for(kind);
    if let Some(reason) = output_type_fallback(tag, kind) {
        warn!(variable, tag, fallback = %default, "{reason}");
        return default;
    }
    tag.and_then(OutputType::from_tag).unwrap_or(default)
}

/// Why `tag` cannot be used for `kind`, or `None` when it resolves cleanly.
pub fn output_type_fallback(tag: Option<&str>, kind: VariableKind) -> Option<String> {
    let tag = tag.map(str::trim).filter(|tag| !tag.is_empty())?;
    let default = OutputType::default_for(kind);
    match OutputType::from_tag(tag) {
        Some(output) if output.supports(kind) => None,
        Some(output) => Some(format!(
            "output type {output} does not apply to {kind:?} variables, using {default}"
        )),
        None => Some(format!("unrecognized output type '{tag}', using {default}")),
    }
}

/// Coerce a category code. The code string stays the canonical value.
pub fn coerce_code(
    variable: &str,
    code: &str,
    class: CodeClass,
    output: OutputType,
) -> Result<Value, GenerationError> {
    match output {
        OutputType::Factor | OutputType::Ordered => Ok(Value::Category(code.to_string())),
        OutputType::Character => Ok(Value::Text(code.to_string())),
        OutputType::Logical => {
            if class == CodeClass::Missing {
                return Ok(Value::Missing);
            }
            match code.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "y" => Ok(Value::Logical(true)),
                "0" | "2" | "false" | "f" | "no" | "n" => Ok(Value::Logical(false)),
                _ => Err(GenerationError::constraint(
                    variable,
                    format!("code '{code}' cannot be represented as logical"),
                )),
            }
        }
        OutputType::Integer => parse_integer_code(code).map(Value::Integer).ok_or_else(|| {
            GenerationError::constraint(variable, format!("code '{code}' is not an integer"))
        }),
        OutputType::Double => code
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Double)
            .ok_or_else(|| {
                GenerationError::constraint(variable, format!("code '{code}' is not numeric"))
            }),
        OutputType::Date => Err(GenerationError::constraint(
            variable,
            "categorical codes cannot be emitted as dates",
        )),
    }
}

fn parse_integer_code(code: &str) -> Option<i64> {
    let code = code.trim();
    if let Ok(value) = code.parse::<i64>() {
        return Some(value);
    }
    let value = code.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .then_some(value as i64)
}

/// Integers inside `interval` after applying inclusivity.
pub fn integer_bounds(interval: &Interval) -> Option<(i64, i64)> {
    if let Some(values) = interval.integer_values() {
        return Some((*values.start(), *values.end()));
    }
    let (lower, upper) = interval.numeric_bounds()?;
    let low = if interval.lower_inclusive {
        lower.ceil()
    } else {
        lower.floor() + 1.0
    };
    let high = if interval.upper_inclusive {
        upper.floor()
    } else {
        upper.ceil() - 1.0
    };
    (low <= high).then_some((low as i64, high as i64))
}

/// Coerce a sampled number.
///
/// Integer output rounds to the nearest integer and keeps the result inside
/// `bounds` (the interval the value was drawn from), so valid draws stay in the
/// valid range and injected garbage stays in its garbage range.
pub fn coerce_number(value: f64, output: OutputType, bounds: Option<(i64, i64)>) -> Value {
    match output {
        OutputType::Integer => {
            let rounded = value.round() as i64;
            match bounds {
                Some((low, high)) => Value::Integer(rounded.clamp(low, high)),
                None => Value::Integer(rounded),
            }
        }
        _ => Value::Double(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockdata_core::parse_interval;

    #[test]
    fn unset_tags_use_kind_defaults() {
        assert_eq!(
            resolve_output_type("x", None, VariableKind::Continuous),
            OutputType::Double
        );
        assert_eq!(
            resolve_output_type("x", Some(""), VariableKind::Categorical),
            OutputType::Factor
        );
    }

    #[test]
    fn unknown_or_inapplicable_tags_fall_back() {
        assert_eq!(
            resolve_output_type("x", Some("complex"), VariableKind::Continuous),
            OutputType::Double
        );
        assert_eq!(
            resolve_output_type("x", Some("logical"), VariableKind::Continuous),
            OutputType::Double
        );
        assert_eq!(
            resolve_output_type("x", Some("Integer"), VariableKind::Continuous),
            OutputType::Integer
        );
    }

    #[test]
    fn fallback_reasons_name_the_tag() {
        assert_eq!(output_type_fallback(Some("double"), VariableKind::Continuous), None);
        assert_eq!(output_type_fallback(None, VariableKind::Date), None);
        let reason = output_type_fallback(Some("complex"), VariableKind::Categorical)
            .expect("unknown tag");
        assert!(reason.contains("'complex'"));
        assert!(output_type_fallback(Some("date"), VariableKind::Continuous).is_some());
    }

    #[test]
    fn codes_keep_their_string_value() {
        let value = coerce_code("x", "996", CodeClass::Missing, OutputType::Factor).expect("code");
        assert_eq!(value, Value::Category("996".to_string()));
        let value = coerce_code("x", "2", CodeClass::Valid, OutputType::Character).expect("code");
        assert_eq!(value, Value::Text("2".to_string()));
    }

    #[test]
    fn logical_codes_map_yes_no() {
        assert_eq!(
            coerce_code("x", "1", CodeClass::Valid, OutputType::Logical).expect("yes"),
            Value::Logical(true)
        );
        assert_eq!(
            coerce_code("x", "2", CodeClass::Valid, OutputType::Logical).expect("no"),
            Value::Logical(false)
        );
        assert_eq!(
            coerce_code("x", "997", CodeClass::Missing, OutputType::Logical).expect("missing"),
            Value::Missing
        );
        assert!(coerce_code("x", "3", CodeClass::Valid, OutputType::Logical).is_err());
    }

    #[test]
    fn integer_coercion_stays_in_bounds() {
        let interval = parse_interval("(18,100)").expect("interval");
        let bounds = integer_bounds(&interval);
        assert_eq!(bounds, Some((19, 99)));
        assert_eq!(
            coerce_number(18.2, OutputType::Integer, bounds),
            Value::Integer(19)
        );
        assert_eq!(
            coerce_number(99.7, OutputType::Integer, bounds),
            Value::Integer(99)
        );
    }

    #[test]
    fn continuous_bounds_round_inwards() {
        let interval = parse_interval("[1.2,2.1]").expect("interval");
        assert_eq!(integer_bounds(&interval), Some((2, 2)));
        let interval = parse_interval("[0.3,0.9]").expect("interval");
        assert_eq!(integer_bounds(&interval), None);
        assert_eq!(coerce_number(0.7, OutputType::Integer, None), Value::Integer(1));
    }
}
