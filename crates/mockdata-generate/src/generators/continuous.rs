use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use mockdata_core::{CodeClass, Distribution, Domain, GarbageSpec, Interval, Metadata, VariableKind};

use crate::coerce::{OutputType, coerce_number, integer_bounds, resolve_output_type};
use crate::errors::GenerationError;
use crate::generators::{
    Column, RowRole, Value, assign_rows, check_proportion, resolve_variable, seeded_rng,
};
use crate::sampling::sample_fraction;

const MAX_REDRAWS: usize = 64;

/// Parameters of one continuous generation call.
///
/// Unset fields fall back to the variables table, then to uniform draws
/// without missing values or garbage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinuousConfig {
    pub n: usize,
    pub seed: u64,
    pub distribution: Option<Distribution>,
    pub prop_na: Option<f64>,
    pub garbage_low: Option<GarbageSpec>,
    pub garbage_high: Option<GarbageSpec>,
    pub output_type: Option<OutputType>,
}

impl ContinuousConfig {
    pub fn new(n: usize, seed: u64) -> Self {
        Self {
            n,
            seed,
            ..Self::default()
        }
    }

    /// Check explicitly set fields before metadata values are merged in.
    pub fn validate(&self, variable: &str) -> Result<(), GenerationError> {
        if let Some(prop_na) = self.prop_na {
            check_proportion(variable, "prop_NA", prop_na)?;
        }
        for (side, garbage) in [("garbage_low", &self.garbage_low), ("garbage_high", &self.garbage_high)] {
            if let Some(garbage) = garbage {
                check_proportion(variable, side, garbage.proportion)?;
                if garbage.range.domain() == Domain::Date {
                    return Err(GenerationError::constraint(
                        variable,
                        format!("{side} range {} is not numeric", garbage.range),
                    ));
                }
            }
        }
        if let Some(output) = self.output_type
            && !matches!(output, OutputType::Integer | OutputType::Double)
        {
            return Err(GenerationError::constraint(
                variable,
                format!("continuous values cannot be emitted as {output}"),
            ));
        }
        Ok(())
    }
}

/// Fully resolved parameters, checked before any sampling.
#[derive(Debug, Clone)]
struct Plan<'a> {
    valid: &'a Interval,
    distribution: Distribution,
    prop_na: f64,
    garbage_low: Option<GarbageSpec>,
    garbage_high: Option<GarbageSpec>,
    output: OutputType,
    valid_bounds: Option<(i64, i64)>,
}

impl<'a> Plan<'a> {
    fn validate(&self, variable: &str) -> Result<(), GenerationError> {
        check_proportion(variable, "prop_NA", self.prop_na)?;
        let (valid_lower, valid_upper) = self.valid.numeric_bounds().ok_or_else(|| {
            GenerationError::constraint(variable, "valid interval is not numeric")
        })?;

        let mut budget = self.prop_na;
        for (side, garbage) in [("garbage_low", &self.garbage_low), ("garbage_high", &self.garbage_high)] {
            let Some(garbage) = garbage else {
                continue;
            };
            check_proportion(variable, side, garbage.proportion)?;
            budget += garbage.proportion;
            let (lower, upper) = garbage.range.numeric_bounds().ok_or_else(|| {
                GenerationError::constraint(variable, format!("{side} range is not numeric"))
            })?;
            let outside = if side == "garbage_low" {
                upper < valid_lower
                    || (upper == valid_lower
                        && !(garbage.range.upper_inclusive && self.valid.lower_inclusive))
            } else {
                lower > valid_upper
                    || (lower == valid_upper
                        && !(garbage.range.lower_inclusive && self.valid.upper_inclusive))
            };
            if !outside {
                return Err(GenerationError::constraint(
                    variable,
                    format!("{side} range {} overlaps valid range {}", garbage.range, self.valid),
                ));
            }
        }
        if budget > 1.0 + f64::EPSILON {
            return Err(GenerationError::constraint(
                variable,
                format!("prop_NA plus garbage proportions is {budget}, exceeds 1"),
            ));
        }
        if self.output == OutputType::Integer && self.valid_bounds.is_none() {
            return Err(GenerationError::constraint(
                variable,
                format!("valid range {} contains no integer", self.valid),
            ));
        }
        Ok(())
    }
}

/// Draw `config.n` values of a continuous variable for `window`.
///
/// Returns `Ok(None)` when the variable has no valid numeric range in the window.
pub fn generate_continuous(
    metadata: &Metadata,
    variable: &str,
    window: &str,
    config: &ContinuousConfig,
) -> Result<Option<Column>, GenerationError> {
    config.validate(variable)?;
    let Some((descriptor, rules)) =
        resolve_variable(metadata, variable, window, VariableKind::Continuous)?
    else {
        return Ok(None);
    };
    let intervals = rules.intervals(CodeClass::Valid)?;
    let Some(valid) = intervals
        .into_iter()
        .find(|interval| interval.domain() != Domain::Date)
    else {
        debug!(variable, window, "no valid numeric range");
        return Ok(None);
    };

    let params = &descriptor.params;
    let output = config.output_type.unwrap_or_else(|| {
        resolve_output_type(
            variable,
            descriptor.output_type.as_deref(),
            VariableKind::Continuous,
        )
    });
    let plan = Plan {
        valid,
        distribution: config
            .distribution
            .or(params.distribution)
            .unwrap_or_default(),
        prop_na: config.prop_na.or(params.prop_na).unwrap_or(0.0),
        garbage_low: config.garbage_low.clone().or_else(|| params.garbage_low.clone()),
        garbage_high: config
            .garbage_high
            .clone()
            .or_else(|| params.garbage_high.clone()),
        output,
        valid_bounds: integer_bounds(valid),
    };
    plan.validate(variable)?;

    let special = [
        plan.garbage_low.as_ref().map_or(0.0, |garbage| garbage.proportion),
        plan.garbage_high.as_ref().map_or(0.0, |garbage| garbage.proportion),
    ];
    let mut rng = seeded_rng(config.seed);
    let roles = assign_rows(config.n, plan.prop_na, &special, &mut rng);

    let values = roles
        .iter()
        .map(|role| match role {
            RowRole::Missing => Value::Missing,
            RowRole::Valid => draw_valid(&plan, &mut rng),
            RowRole::Special(slot) => {
                let garbage = if *slot == 0 {
                    plan.garbage_low.as_ref()
                } else {
                    plan.garbage_high.as_ref()
                };
                match garbage {
                    Some(garbage) => {
                        let value = draw_in(&garbage.range, Distribution::Uniform, &mut rng);
                        coerce_number(value, plan.output, integer_bounds(&garbage.range))
                    }
                    None => draw_valid(&plan, &mut rng),
                }
            }
        })
        .collect();

    debug!(
        variable,
        window,
        rows = config.n,
        distribution = %plan.distribution,
        prop_na = plan.prop_na,
        output = %plan.output,
        "continuous column generated"
    );
    Ok(Some(Column::new(variable, plan.output, values)))
}

fn draw_valid(plan: &Plan<'_>, rng: &mut ChaCha8Rng) -> Value {
    if plan.output == OutputType::Integer
        && plan.distribution == Distribution::Uniform
        && let Some((low, high)) = plan.valid_bounds
    {
        return Value::Integer(rng.random_range(low..=high));
    }
    let value = draw_in(plan.valid, plan.distribution, rng);
    coerce_number(value, plan.output, plan.valid_bounds)
}

/// Draw inside `interval`, redrawing values that land on an excluded end.
fn draw_in(interval: &Interval, distribution: Distribution, rng: &mut ChaCha8Rng) -> f64 {
    let Some((lower, upper)) = interval.numeric_bounds() else {
        return f64::NAN;
    };
    if lower == upper {
        return lower;
    }
    for _ in 0..MAX_REDRAWS {
        let value = lower + sample_fraction(distribution, upper - lower, rng) * (upper - lower);
        if interval.contains_number(value) {
            return value;
        }
    }
    (lower + upper) / 2.0
}
