//! Parser for the range notation used in `recStart` cells.
//!
//! A selector is either a scalar code (`"1"`, `"996"`), the catch-all `else`,
//! or an interval such as `[18,100]`, `(0, 1.5]` or `[2001-01-01,2017-03-31]`.
//! Brackets decide inclusivity per side.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid")
});

/// Literal used for the catch-all selector.
pub const ELSE_TOKEN: &str = "else";

/// Value domain of an interval, decided by the shape of its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Integer,
    Continuous,
    Date,
}

/// One end of an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Integer(i64),
    Continuous(f64),
    Date(NaiveDate),
}

impl Bound {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bound::Integer(value) => Some(*value as f64),
            Bound::Continuous(value) => Some(*value),
            Bound::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Bound::Date(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Integer(value) => write!(f, "{value}"),
            Bound::Continuous(value) => write!(f, "{value}"),
            Bound::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

/// Parsed interval with per-side inclusivity.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub lower: Bound,
    pub upper: Bound,
    pub lower_inclusive: bool,
    pub upper_inclusive: bool,
}

impl Interval {
    pub fn domain(&self) -> Domain {
        match (self.lower, self.upper) {
            (Bound::Integer(_), Bound::Integer(_)) => Domain::Integer,
            (Bound::Date(_), Bound::Date(_)) => Domain::Date,
            _ => Domain::Continuous,
        }
    }

    /// Raw numeric bounds, ignoring inclusivity. `None` for date intervals.
    pub fn numeric_bounds(&self) -> Option<(f64, f64)> {
        Some((self.lower.as_f64()?, self.upper.as_f64()?))
    }

    pub fn contains_number(&self, value: f64) -> bool {
        let Some((lower, upper)) = self.numeric_bounds() else {
            return false;
        };
        let above = if self.lower_inclusive {
            value >= lower
        } else {
            value > lower
        };
        let below = if self.upper_inclusive {
            value <= upper
        } else {
            value < upper
        };
        above && below
    }

    /// Integers covered by an integer-domain interval after adjusting for
    /// exclusive ends. `None` when the domain is not integer or nothing remains.
    pub fn integer_values(&self) -> Option<RangeInclusive<i64>> {
        let (Bound::Integer(lower), Bound::Integer(upper)) = (self.lower, self.upper) else {
            return None;
        };
        let start = if self.lower_inclusive {
            lower
        } else {
            lower.checked_add(1)?
        };
        let end = if self.upper_inclusive {
            upper
        } else {
            upper.checked_sub(1)?
        };
        (start <= end).then_some(start..=end)
    }

    /// Inclusive calendar range of a date interval.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let (Bound::Date(lower), Bound::Date(upper)) = (self.lower, self.upper) else {
            return None;
        };
        let start = if self.lower_inclusive {
            lower
        } else {
            lower.checked_add_signed(Duration::days(1))?
        };
        let end = if self.upper_inclusive {
            upper
        } else {
            upper.checked_sub_signed(Duration::days(1))?
        };
        (start <= end).then_some((start, end))
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.date_range()
            .is_some_and(|(start, end)| start <= date && date <= end)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.lower_inclusive { '[' } else { '(' };
        let close = if self.upper_inclusive { ']' } else { ')' };
        write!(f, "{open}{},{}{close}", self.lower, self.upper)
    }
}

/// Typed form of a `recStart` cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Scalar(String),
    Interval(Interval),
    Else,
}

impl Selector {
    pub fn is_else(&self) -> bool {
        matches!(self, Selector::Else)
    }
}

/// Parse a `recStart` cell into a selector.
///
/// Anything opening with `[` or `(` must be a well-formed interval; a broken
/// interval is an error rather than a scalar.
pub fn parse_selector(input: &str) -> Result<Selector> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::parse(input, "empty selector"));
    }
    if trimmed.eq_ignore_ascii_case(ELSE_TOKEN) {
        return Ok(Selector::Else);
    }
    if trimmed.starts_with(['[', '(']) || trimmed.ends_with([']', ')']) {
        return parse_interval(trimmed).map(Selector::Interval);
    }
    Ok(Selector::Scalar(trimmed.to_string()))
}

/// Parse an interval expression such as `[18,100]` or `(2001-01-01, 2005-12-31]`.
pub fn parse_interval(input: &str) -> Result<Interval> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::parse(input, "empty interval"));
    }

    let lower_inclusive = match trimmed.chars().next() {
        Some('[') => true,
        Some('(') => false,
        _ => return Err(Error::parse(input, "missing opening bracket")),
    };
    let upper_inclusive = match trimmed.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(Error::parse(input, "missing closing bracket")),
    };
    let inner = &trimmed[1..trimmed.len() - 1];
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(Error::parse(input, "expected two bounds separated by ','"));
    }
    let (raw_lower, raw_upper) = (parts[0], parts[1]);
    if raw_lower.is_empty() || raw_upper.is_empty() {
        return Err(Error::parse(input, "empty bound"));
    }

    let (lower, upper) = parse_bounds(input, raw_lower, raw_upper)?;
    let ordered = match (lower, upper) {
        (Bound::Integer(a), Bound::Integer(b)) => a <= b,
        (Bound::Date(a), Bound::Date(b)) => a <= b,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        },
    };
    if !ordered {
        return Err(Error::parse(input, "lower bound exceeds upper bound"));
    }
    let degenerate = match (lower, upper) {
        (Bound::Integer(a), Bound::Integer(b)) => a == b,
        (Bound::Date(a), Bound::Date(b)) => a == b,
        (a, b) => a.as_f64() == b.as_f64(),
    };
    if degenerate && !(lower_inclusive && upper_inclusive) {
        return Err(Error::parse(input, "interval is empty"));
    }

    Ok(Interval {
        lower,
        upper,
        lower_inclusive,
        upper_inclusive,
    })
}

fn parse_bounds(input: &str, raw_lower: &str, raw_upper: &str) -> Result<(Bound, Bound)> {
    let lower_is_date = DATE_SHAPE.is_match(raw_lower);
    let upper_is_date = DATE_SHAPE.is_match(raw_upper);
    if lower_is_date || upper_is_date {
        if !(lower_is_date && upper_is_date) {
            return Err(Error::parse(input, "cannot mix date and numeric bounds"));
        }
        let lower = parse_date(input, raw_lower)?;
        let upper = parse_date(input, raw_upper)?;
        return Ok((Bound::Date(lower), Bound::Date(upper)));
    }

    if let (Ok(lower), Ok(upper)) = (raw_lower.parse::<i64>(), raw_upper.parse::<i64>()) {
        return Ok((Bound::Integer(lower), Bound::Integer(upper)));
    }

    let lower = parse_float(input, raw_lower)?;
    let upper = parse_float(input, raw_upper)?;
    if let (Some(lower), Some(upper)) = (integral(lower), integral(upper)) {
        return Ok((Bound::Integer(lower), Bound::Integer(upper)));
    }
    Ok((Bound::Continuous(lower), Bound::Continuous(upper)))
}

/// Whole-valued floats such as `3.0` that fit in an `i64`.
fn integral(value: f64) -> Option<i64> {
    (value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

fn parse_date(input: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| Error::parse(input, format!("invalid date '{raw}': {err}")))
}

fn parse_float(input: &str, raw: &str) -> Result<f64> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| Error::parse(input, format!("invalid number '{raw}'")))?;
    if !value.is_finite() {
        return Err(Error::parse(input, "bounds must be finite"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_set_inclusivity_per_side() {
        let interval = parse_interval("(18, 100]").expect("parse");
        assert!(!interval.lower_inclusive);
        assert!(interval.upper_inclusive);
        assert_eq!(interval.domain(), Domain::Integer);
        assert_eq!(interval.integer_values(), Some(19..=100));
    }

    #[test]
    fn decimal_bounds_are_continuous() {
        let interval = parse_interval("[0.5,2]").expect("parse");
        assert_eq!(interval.domain(), Domain::Continuous);
        assert!(interval.contains_number(2.0));
        assert!(!interval.contains_number(0.4));
        assert_eq!(interval.integer_values(), None);
    }

    #[test]
    fn iso_bounds_are_dates() {
        let interval = parse_interval("[2001-01-01, 2017-03-31)").expect("parse");
        assert_eq!(interval.domain(), Domain::Date);
        let (start, end) = interval.date_range().expect("range");
        assert_eq!(start, NaiveDate::from_ymd_opt(2001, 1, 1).expect("date"));
        assert_eq!(end, NaiveDate::from_ymd_opt(2017, 3, 30).expect("date"));
    }

    #[test]
    fn malformed_intervals_are_parse_errors() {
        for input in [
            "",
            "[1,2",
            "1,2]",
            "[5]",
            "[1,2,3]",
            "[a,b]",
            "[9,1]",
            "[2001-01-01,5]",
            "(5,5)",
            "[5,5)",
            "(2.5,2.5]",
            "(2001-01-01,2001-01-01)",
        ] {
            assert!(
                matches!(parse_interval(input), Err(Error::Parse { .. })),
                "expected parse error for {input:?}"
            );
        }
    }

    #[test]
    fn whole_valued_decimal_bounds_are_integers() {
        let interval = parse_interval("[1.0,3.0]").expect("parse");
        assert_eq!(interval.domain(), Domain::Integer);
        assert_eq!(interval.integer_values(), Some(1..=3));
        assert_eq!(
            parse_interval("[1.0,3.5]").expect("parse").domain(),
            Domain::Continuous
        );
    }

    #[test]
    fn single_point_intervals_need_both_ends_closed() {
        let interval = parse_interval("[5,5]").expect("parse");
        assert_eq!(interval.integer_values(), Some(5..=5));
    }

    #[test]
    fn selectors_distinguish_else_scalars_and_intervals() {
        assert_eq!(parse_selector(" else ").expect("else"), Selector::Else);
        assert_eq!(
            parse_selector("996").expect("scalar"),
            Selector::Scalar("996".to_string())
        );
        assert!(matches!(
            parse_selector("[1,3]").expect("interval"),
            Selector::Interval(_)
        ));
        assert!(parse_selector("[1,3").is_err());
        assert!(parse_selector("   ").is_err());
    }

    #[test]
    fn display_round_trips_notation() {
        let interval = parse_interval("( 1 , 7 ]").expect("parse");
        assert_eq!(interval.to_string(), "(1,7]");
    }
}
