use chrono::{Duration, NaiveDate};
use tracing::debug;

use mockdata_core::{CodeClass, Distribution, Domain, Metadata, SourceFormat, VariableKind};

use crate::coerce::{OutputType, resolve_output_type};
use crate::errors::GenerationError;
use crate::generators::{
    Column, RowRole, Value, assign_rows, check_proportion, random_days, resolve_variable,
    seeded_rng,
};
use crate::sampling::sample_day_offset;

/// Day zero of the SAS date encoding.
pub const SAS_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1960, 1, 1) {
    Some(date) => date,
    None => panic!("SAS epoch is a valid date"),
};

/// Invalid dates land this many days outside the valid range.
pub const INVALID_OFFSET_DAYS: (i64, i64) = (365, 1825);

/// Parameters of one date generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateConfig {
    pub n: usize,
    pub seed: u64,
    pub distribution: Option<Distribution>,
    pub prop_na: Option<f64>,
    pub prop_invalid: Option<f64>,
    pub source_format: Option<SourceFormat>,
}

impl DateConfig {
    pub fn new(n: usize, seed: u64) -> Self {
        Self {
            n,
            seed,
            ..Self::default()
        }
    }

    /// Check explicitly set budgets before metadata values are merged in.
    pub fn validate(&self, variable: &str) -> Result<(), GenerationError> {
        validate_date_budget(
            variable,
            self.prop_na.unwrap_or(0.0),
            self.prop_invalid.unwrap_or(0.0),
        )
    }
}

/// Check that the NA and invalid budgets fit in one column.
pub fn validate_date_budget(
    variable: &str,
    prop_na: f64,
    prop_invalid: f64,
) -> Result<(), GenerationError> {
    check_proportion(variable, "prop_NA", prop_na)?;
    check_proportion(variable, "prop_invalid", prop_invalid)?;
    if prop_na + prop_invalid > 1.0 + f64::EPSILON {
        return Err(GenerationError::constraint(
            variable,
            format!("prop_NA ({prop_na}) plus prop_invalid ({prop_invalid}) exceeds 1"),
        ));
    }
    Ok(())
}

/// Column type used for dates emitted in `format`.
pub fn date_output_type(format: SourceFormat) -> OutputType {
    match format {
        SourceFormat::Analysis => OutputType::Date,
        SourceFormat::Csv => OutputType::Character,
        SourceFormat::Sas => OutputType::Integer,
    }
}

/// Encode a calendar date in `format`.
pub fn encode_date(date: NaiveDate, format: SourceFormat) -> Value {
    match format {
        SourceFormat::Analysis => Value::Date(date),
        SourceFormat::Csv => Value::Text(date.format("%Y-%m-%d").to_string()),
        SourceFormat::Sas => Value::Integer((date - SAS_EPOCH).num_days()),
    }
}

/// Decode a value produced by [`encode_date`] in any format.
pub fn decode_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(date) => Some(*date),
        Value::Text(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        Value::Integer(days) => SAS_EPOCH.checked_add_signed(Duration::try_days(*days)?),
        _ => None,
    }
}

/// Draw `config.n` dates of a date variable for `window`.
///
/// Returns `Ok(None)` when the variable has no valid date range in the window.
pub fn generate_date(
    metadata: &Metadata,
    variable: &str,
    window: &str,
    config: &DateConfig,
) -> Result<Option<Column>, GenerationError> {
    config.validate(variable)?;
    let Some((descriptor, rules)) = resolve_variable(metadata, variable, window, VariableKind::Date)?
    else {
        return Ok(None);
    };
    let params = &descriptor.params;
    let distribution = config
        .distribution
        .or(params.distribution)
        .unwrap_or_default();
    let prop_na = config.prop_na.or(params.prop_na).unwrap_or(0.0);
    let prop_invalid = config.prop_invalid.or(params.prop_invalid).unwrap_or(0.0);
    let format = config
        .source_format
        .or(params.source_format)
        .unwrap_or_default();
    validate_date_budget(variable, prop_na, prop_invalid)?;
    // Only `date` applies; other tags warn and fall back.
    resolve_output_type(
        variable,
        descriptor.output_type.as_deref(),
        VariableKind::Date,
    );

    let intervals = rules.intervals(CodeClass::Valid)?;
    let Some((start, end)) = intervals
        .into_iter()
        .filter(|interval| interval.domain() == Domain::Date)
        .find_map(|interval| interval.date_range())
    else {
        debug!(variable, window, "no valid date range");
        return Ok(None);
    };
    let span = (end - start).num_days();

    let mut rng = seeded_rng(config.seed);
    let roles = assign_rows(config.n, prop_na, &[prop_invalid], &mut rng);
    let mut invalid_seen = 0_usize;
    let mut values = Vec::with_capacity(config.n);
    for role in roles {
        let date = match role {
            RowRole::Missing => {
                values.push(Value::Missing);
                continue;
            }
            RowRole::Valid => start + Duration::days(sample_day_offset(distribution, span, &mut rng)),
            RowRole::Special(_) => {
                let offset = random_days(&mut rng, INVALID_OFFSET_DAYS.0, INVALID_OFFSET_DAYS.1);
                invalid_seen += 1;
                if invalid_seen % 2 == 1 {
                    start - Duration::days(offset)
                } else {
                    end + Duration::days(offset)
                }
            }
        };
        values.push(encode_date(date, format));
    }

    debug!(
        variable,
        window,
        rows = config.n,
        distribution = %distribution,
        prop_na,
        prop_invalid,
        format = ?format,
        "date column generated"
    );
    Ok(Some(Column::new(variable, date_output_type(format), values)))
}
