//! Correlated entry and event dates for cohort-style data.
//!
//! Each individual gets an entry date, then candidate dates for every
//! configured event slot. Competing risks and censoring are resolved per row,
//! so the columns are always produced together.

use chrono::{Duration, NaiveDate};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mockdata_core::{CodeClass, Distribution, Domain, Metadata, SourceFormat, VariableKind};

use crate::errors::GenerationError;
use crate::generators::date::{date_output_type, encode_date};
use crate::generators::{Column, Table, Value, check_proportion, resolve_variable, seeded_rng};
use crate::sampling::sample_day_offset;

/// Follow-up parameters of one event slot. Unset fields come from the
/// variables table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub variable: String,
    pub followup_min: Option<i64>,
    pub followup_max: Option<i64>,
    pub event_prop: Option<f64>,
    pub distribution: Option<Distribution>,
}

impl EventConfig {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            ..Self::default()
        }
    }
}

/// Parameters of one survival generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurvivalConfig {
    pub entry: Option<String>,
    pub window: Option<String>,
    pub event: Option<EventConfig>,
    pub death: Option<EventConfig>,
    pub ltfu: Option<EventConfig>,
    pub admin_censor: Option<EventConfig>,
    pub n: usize,
    pub seed: u64,
    pub source_format: Option<SourceFormat>,
}

impl SurvivalConfig {
    pub fn new(entry: impl Into<String>, window: impl Into<String>, n: usize, seed: u64) -> Self {
        Self {
            entry: Some(entry.into()),
            window: Some(window.into()),
            n,
            seed,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(&str, &str), GenerationError> {
        let entry = self
            .entry
            .as_deref()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .ok_or_else(|| GenerationError::MissingParameter("entry variable".to_string()))?;
        let window = self
            .window
            .as_deref()
            .map(str::trim)
            .filter(|window| !window.is_empty())
            .ok_or_else(|| GenerationError::MissingParameter("applicability window".to_string()))?;
        Ok((entry, window))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Event,
    Death,
    Ltfu,
    AdminCensor,
}

#[derive(Debug, Clone, Copy)]
enum Timing {
    /// Days after entry.
    Followup { min: i64, max: i64 },
    /// Calendar dates from the variable's own range.
    Calendar { start: NaiveDate, span: i64 },
}

#[derive(Debug, Clone)]
struct EventPlan {
    slot: Slot,
    variable: String,
    timing: Timing,
    event_prop: f64,
    distribution: Distribution,
}

impl EventPlan {
    fn draw(&self, entry: NaiveDate, rng: &mut ChaCha8Rng) -> Option<NaiveDate> {
        // Both draws happen on every row so later slots see the same stream.
        let occurs = rng.random::<f64>() < self.event_prop;
        let date = match self.timing {
            Timing::Followup { min, max } => {
                let offset = min + sample_day_offset(self.distribution, max - min, rng);
                entry.checked_add_signed(Duration::try_days(offset)?)
            }
            Timing::Calendar { start, span } => {
                let offset = sample_day_offset(self.distribution, span, rng);
                start.checked_add_signed(Duration::try_days(offset)?)
            }
        };
        date.filter(|_| occurs)
    }
}

/// Generate entry and event dates for `config.n` individuals.
///
/// Output contains the entry column plus one column per configured slot, in
/// the order event, death, loss to follow-up, administrative censoring.
pub fn generate_survival(metadata: &Metadata, config: &SurvivalConfig) -> Result<Table, GenerationError> {
    let (entry_name, window) = config.validate()?;
    let (entry_start, entry_end) = date_range(metadata, entry_name, window)?;
    let entry_format = metadata
        .variable(entry_name)
        .and_then(|descriptor| descriptor.params.source_format);
    let format = config.source_format.or(entry_format).unwrap_or_default();

    let slots = [
        (Slot::Event, &config.event),
        (Slot::Death, &config.death),
        (Slot::Ltfu, &config.ltfu),
        (Slot::AdminCensor, &config.admin_censor),
    ];
    let mut plans = Vec::new();
    for (slot, event) in slots {
        if let Some(event) = event {
            plans.push(plan_event(metadata, window, slot, event, entry_end)?);
        }
    }

    info!(
        entry = entry_name,
        window,
        rows = config.n,
        events = plans.len(),
        seed = config.seed,
        "generating survival dates"
    );

    let mut rng = seeded_rng(config.seed);
    let entry_span = (entry_end - entry_start).num_days();
    let mut entries = Vec::with_capacity(config.n);
    let mut events: Vec<Vec<Option<NaiveDate>>> = vec![Vec::with_capacity(config.n); plans.len()];
    for _ in 0..config.n {
        let entry = entry_start
            + Duration::days(sample_day_offset(Distribution::Uniform, entry_span, &mut rng));
        let mut candidates: Vec<Option<NaiveDate>> =
            plans.iter().map(|plan| plan.draw(entry, &mut rng)).collect();
        resolve_competing(&plans, &mut candidates);
        entries.push(entry);
        for (column, candidate) in events.iter_mut().zip(candidates) {
            column.push(candidate);
        }
    }

    let output = date_output_type(format);
    let mut table = Table::new();
    table.push(Column::new(
        entry_name,
        output,
        entries.into_iter().map(|date| encode_date(date, format)).collect(),
    ))?;
    for (plan, column) in plans.iter().zip(events) {
        let values: Vec<Value> = column
            .into_iter()
            .map(|date| date.map_or(Value::Missing, |date| encode_date(date, format)))
            .collect();
        let column = Column::new(&plan.variable, output, values);
        debug!(
            variable = %plan.variable,
            slot = ?plan.slot,
            missing = column.missing_count(),
            "survival column generated"
        );
        table.push(column)?;
    }
    Ok(table)
}

/// Apply competing risks and censoring to one individual's candidates.
///
/// - death on or before the primary event removes the event;
/// - loss to follow-up is dropped when death came first, otherwise it removes
///   later events and deaths;
/// - everything strictly after the administrative censor date is removed.
fn resolve_competing(plans: &[EventPlan], candidates: &mut [Option<NaiveDate>]) {
    let find = |slot: Slot| plans.iter().position(|plan| plan.slot == slot);
    let event = find(Slot::Event);
    let death = find(Slot::Death);
    let ltfu = find(Slot::Ltfu);
    let admin = find(Slot::AdminCensor);
    let date = |candidates: &[Option<NaiveDate>], index: Option<usize>| {
        index.and_then(|index| candidates[index])
    };

    if let (Some(death_date), Some(event_date)) = (date(candidates, death), date(candidates, event))
        && death_date <= event_date
        && let Some(index) = event
    {
        candidates[index] = None;
    }

    if let Some(ltfu_date) = date(candidates, ltfu) {
        if date(candidates, death).is_some_and(|death_date| death_date <= ltfu_date) {
            if let Some(index) = ltfu {
                candidates[index] = None;
            }
        } else {
            for index in [event, death].into_iter().flatten() {
                if candidates[index].is_some_and(|candidate| candidate > ltfu_date) {
                    candidates[index] = None;
                }
            }
        }
    }

    if let Some(admin_date) = date(candidates, admin) {
        for index in [event, death, ltfu].into_iter().flatten() {
            if candidates[index].is_some_and(|candidate| candidate > admin_date) {
                candidates[index] = None;
            }
        }
    }
}

fn plan_event(
    metadata: &Metadata,
    window: &str,
    slot: Slot,
    config: &EventConfig,
    entry_end: NaiveDate,
) -> Result<EventPlan, GenerationError> {
    let variable = config.variable.trim();
    if variable.is_empty() {
        return Err(GenerationError::MissingParameter(format!(
            "{slot:?} variable name"
        )));
    }
    let descriptor = metadata
        .variable(variable)
        .ok_or_else(|| GenerationError::UnknownVariable(variable.to_string()))?;
    let params = &descriptor.params;

    let event_prop = config.event_prop.or(params.event_prop).unwrap_or(1.0);
    check_proportion(variable, "event_prop", event_prop)?;
    let distribution = config
        .distribution
        .or(params.distribution)
        .unwrap_or_default();

    let followup_min = config.followup_min.or(params.followup_min);
    let followup_max = config.followup_max.or(params.followup_max);
    let timing = match (followup_min, followup_max) {
        (Some(min), Some(max)) => {
            if min < 0 || min > max {
                return Err(GenerationError::constraint(
                    variable,
                    format!("followup range [{min},{max}] must satisfy 0 <= min <= max"),
                ));
            }
            let reachable = Duration::try_days(max)
                .and_then(|days| entry_end.checked_add_signed(days))
                .is_some();
            if !reachable {
                return Err(GenerationError::constraint(
                    variable,
                    format!("followup_max {max} days after {entry_end} is not a representable date"),
                ));
            }
            Timing::Followup { min, max }
        }
        (None, None) if slot == Slot::AdminCensor => {
            let (start, end) = date_range(metadata, variable, window)?;
            if start < entry_end {
                return Err(GenerationError::constraint(
                    variable,
                    format!("censor dates start {start}, before the last entry date {entry_end}"),
                ));
            }
            Timing::Calendar {
                start,
                span: (end - start).num_days(),
            }
        }
        (None, _) => {
            return Err(GenerationError::MissingParameter(format!(
                "followup_min for '{variable}'"
            )));
        }
        (_, None) => {
            return Err(GenerationError::MissingParameter(format!(
                "followup_max for '{variable}'"
            )));
        }
    };

    Ok(EventPlan {
        slot,
        variable: variable.to_string(),
        timing,
        event_prop,
        distribution,
    })
}

fn date_range(
    metadata: &Metadata,
    variable: &str,
    window: &str,
) -> Result<(NaiveDate, NaiveDate), GenerationError> {
    let Some((_, rules)) = resolve_variable(metadata, variable, window, VariableKind::Date)? else {
        return Err(GenerationError::constraint(
            variable,
            format!("not declared for window '{window}'"),
        ));
    };
    rules
        .intervals(CodeClass::Valid)?
        .into_iter()
        .filter(|interval| interval.domain() == Domain::Date)
        .find_map(|interval| interval.date_range())
        .ok_or_else(|| GenerationError::constraint(variable, "no valid date range"))
}
