//! Typed detail rules and the valid/missing classifier.
//!
//! A variable's detail rows are parsed once into a [`RuleSet`]. Classification
//! splits the rows into valid and missing categories; the `else` row is kept
//! aside as a fallback and never becomes an emittable code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::metadata::{DetailRecord, non_empty};
use crate::notation::{Domain, Interval, Selector, parse_selector};

/// Conventional survey missing codes (valid skip, don't know, refusal, not stated).
pub const CONVENTIONAL_MISSING_CODES: &[i64] = &[6, 7, 8, 9, 96, 97, 98, 99, 996, 997, 998, 999];

/// Upper limit on the number of codes one integer interval may expand to.
pub const MAX_EXPANDED_CODES: usize = 10_000;

/// Sub-kind of a missing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKind {
    /// `NA::a`: not applicable / valid skip.
    NotApplicable,
    /// `NA::b`: don't know, refusal, not stated.
    NoResponse,
}

/// Classification target of a detail row (`recEnd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Missing(MissingKind),
    /// Source value passes through unchanged.
    Copy,
    Code(String),
    /// `recEnd` left blank.
    Unclassified,
}

impl Target {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = non_empty(raw) else {
            return Target::Unclassified;
        };
        match raw.to_ascii_lowercase().as_str() {
            "na::a" => Target::Missing(MissingKind::NotApplicable),
            "na::b" => Target::Missing(MissingKind::NoResponse),
            "copy" => Target::Copy,
            _ => Target::Code(raw.to_string()),
        }
    }

    pub fn class(&self) -> CodeClass {
        match self {
            Target::Missing(_) => CodeClass::Missing,
            _ => CodeClass::Valid,
        }
    }
}

/// Which side of the valid/missing partition a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeClass {
    Valid,
    Missing,
}

/// One parsed detail row.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRule {
    pub selector: Selector,
    pub target: Target,
    pub label: Option<String>,
    pub proportion: Option<f64>,
}

/// A discrete, emittable code with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub code: String,
    pub label: Option<String>,
    pub class: CodeClass,
    pub missing_kind: Option<MissingKind>,
    /// Metadata proportion attributed to this code, summed across rows.
    pub proportion: Option<f64>,
}

/// A non-discrete interval rule (continuous or date domain).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRule {
    pub interval: Interval,
    pub class: CodeClass,
    pub label: Option<String>,
}

/// Catch-all classification taken from the `else` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub target: Target,
    pub label: Option<String>,
    pub proportion: Option<f64>,
}

/// Disjoint valid and missing categories of one variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedCategories {
    pub valid: Vec<Category>,
    pub missing: Vec<Category>,
    pub ranges: Vec<RangeRule>,
    pub fallback: Option<Fallback>,
}

impl ClassifiedCategories {
    /// Valid codes followed by missing codes.
    pub fn all(&self) -> impl Iterator<Item = &Category> {
        self.valid.iter().chain(self.missing.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.missing.is_empty()
    }

    pub fn valid_ranges(&self) -> impl Iterator<Item = &Interval> {
        self.ranges
            .iter()
            .filter(|range| range.class == CodeClass::Valid)
            .map(|range| &range.interval)
    }
}

/// Parsed detail rules of one variable, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    variable: String,
    rules: Vec<DetailRule>,
}

impl RuleSet {
    /// Parse detail rows. Rows with an empty `recStart` are skipped.
    pub fn from_details(variable: &str, details: &[&DetailRecord]) -> Result<Self> {
        let mut rules = Vec::with_capacity(details.len());
        for detail in details {
            let Some(raw) = non_empty(detail.rec_start.as_deref()) else {
                continue;
            };
            let selector = parse_selector(raw).map_err(|err| err.in_variable(variable))?;
            rules.push(DetailRule {
                selector,
                target: Target::parse(detail.rec_end.as_deref()),
                label: non_empty(detail.cat_label.as_deref()).map(str::to_string),
                proportion: detail.proportion,
            });
        }

        if rules.iter().filter(|rule| rule.selector.is_else()).count() > 1 {
            return Err(Error::InvalidMetadata(format!(
                "variable '{variable}' has more than one 'else' row"
            )));
        }

        Ok(Self {
            variable: variable.to_string(),
            rules,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn rules(&self) -> &[DetailRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn else_rule(&self) -> Option<&DetailRule> {
        self.rules.iter().find(|rule| rule.selector.is_else())
    }

    /// Discrete codes of `class`, in table order, without duplicates.
    pub fn codes(&self, class: CodeClass) -> Result<Vec<String>> {
        let categories = self.classify()?;
        let codes = match class {
            CodeClass::Valid => categories.valid,
            CodeClass::Missing => categories.missing,
        };
        Ok(codes.into_iter().map(|category| category.code).collect())
    }

    /// Interval selectors of `class`, unexpanded, in table order.
    ///
    /// Used by the continuous and date generators, where an interval is a
    /// bound to sample from rather than a list of codes.
    pub fn intervals(&self, class: CodeClass) -> Result<Vec<&Interval>> {
        if self
            .rules
            .iter()
            .all(|rule| rule.target == Target::Unclassified)
        {
            self.check_unclassified()?;
        }
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.target.class() == class)
            .filter_map(|rule| match &rule.selector {
                Selector::Interval(interval) => Some(interval),
                _ => None,
            })
            .collect())
    }

    /// Split rules into valid and missing categories.
    ///
    /// Integer intervals expand to their codes and share the row proportion
    /// evenly. Continuous and date intervals stay as ranges.
    pub fn classify(&self) -> Result<ClassifiedCategories> {
        let unclassified = self
            .rules
            .iter()
            .all(|rule| rule.target == Target::Unclassified);
        if unclassified {
            self.check_unclassified()?;
        }

        let mut classified = ClassifiedCategories::default();
        let mut seen: BTreeMap<String, (CodeClass, usize)> = BTreeMap::new();

        for rule in &self.rules {
            let class = rule.target.class();
            let missing_kind = match rule.target {
                Target::Missing(kind) => Some(kind),
                _ => None,
            };
            let codes = match &rule.selector {
                Selector::Else => {
                    classified.fallback = Some(Fallback {
                        target: rule.target.clone(),
                        label: rule.label.clone(),
                        proportion: rule.proportion,
                    });
                    continue;
                }
                Selector::Scalar(code) => vec![code.clone()],
                Selector::Interval(interval) if interval.domain() == Domain::Integer => {
                    self.expand(interval)?
                }
                Selector::Interval(interval) => {
                    classified.ranges.push(RangeRule {
                        interval: interval.clone(),
                        class,
                        label: rule.label.clone(),
                    });
                    continue;
                }
            };

            let share = rule.proportion.map(|value| value / codes.len() as f64);
            for code in codes {
                if let Some((existing, index)) = seen.get(&code) {
                    if *existing != class {
                        return Err(Error::InvalidMetadata(format!(
                            "variable '{}' classifies code '{code}' as both valid and missing",
                            self.variable
                        )));
                    }
                    let bucket = match existing {
                        CodeClass::Valid => &mut classified.valid,
                        CodeClass::Missing => &mut classified.missing,
                    };
                    let category = &mut bucket[*index];
                    category.proportion = match (category.proportion, share) {
                        (Some(a), Some(b)) => Some(a + b),
                        (a, b) => a.or(b),
                    };
                    continue;
                }

                let bucket = match class {
                    CodeClass::Valid => &mut classified.valid,
                    CodeClass::Missing => &mut classified.missing,
                };
                seen.insert(code.clone(), (class, bucket.len()));
                bucket.push(Category {
                    code,
                    label: rule.label.clone(),
                    class,
                    missing_kind,
                    proportion: share,
                });
            }
        }

        debug!(
            variable = %self.variable,
            valid = classified.valid.len(),
            missing = classified.missing.len(),
            ranges = classified.ranges.len(),
            fallback = classified.fallback.is_some(),
            "classified categories"
        );
        Ok(classified)
    }

    fn expand(&self, interval: &Interval) -> Result<Vec<String>> {
        let Some(values) = interval.integer_values() else {
            return Ok(Vec::new());
        };
        let count = values.end().abs_diff(*values.start()).saturating_add(1);
        if count > MAX_EXPANDED_CODES as u64 {
            return Err(Error::InvalidMetadata(format!(
                "variable '{}' interval {interval} expands to {count} codes (limit {MAX_EXPANDED_CODES})",
                self.variable
            )));
        }
        Ok(values.map(|value| value.to_string()).collect())
    }

    /// Without `recEnd` the partition can only be trusted when no selector
    /// looks like a conventional missing code.
    fn check_unclassified(&self) -> Result<()> {
        let mut suspicious = Vec::new();
        for rule in &self.rules {
            match &rule.selector {
                Selector::Scalar(code) => {
                    if code
                        .parse::<i64>()
                        .is_ok_and(|value| CONVENTIONAL_MISSING_CODES.contains(&value))
                    {
                        suspicious.push(code.clone());
                    }
                }
                Selector::Interval(interval) => {
                    if CONVENTIONAL_MISSING_CODES
                        .iter()
                        .any(|code| interval.contains_number(*code as f64))
                    {
                        suspicious.push(interval.to_string());
                    }
                }
                Selector::Else => {}
            }
        }

        if suspicious.is_empty() {
            Ok(())
        } else {
            Err(Error::ClassificationAmbiguity {
                variable: self.variable.clone(),
                codes: suspicious,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(rec_start: &str, rec_end: &str) -> DetailRecord {
        DetailRecord {
            variable: "SMK_005".to_string(),
            rec_start: Some(rec_start.to_string()),
            rec_end: Some(rec_end.to_string()),
            cat_label: Some(format!("label {rec_start}")),
            ..DetailRecord::default()
        }
    }

    fn rule_set(rows: &[DetailRecord]) -> RuleSet {
        let refs: Vec<&DetailRecord> = rows.iter().collect();
        RuleSet::from_details("SMK_005", &refs).expect("rule set")
    }

    #[test]
    fn else_row_is_never_a_code() {
        let rules = rule_set(&[detail("1", "1"), detail("2", "2"), detail("else", "NA::b")]);
        let classified = rules.classify().expect("classify");

        assert!(classified.all().all(|category| category.code != "else"));
        assert_eq!(rules.codes(CodeClass::Valid).expect("valid"), vec!["1", "2"]);
        assert!(rules.codes(CodeClass::Missing).expect("missing").is_empty());
        let fallback = classified.fallback.expect("fallback");
        assert_eq!(fallback.target, Target::Missing(MissingKind::NoResponse));
    }

    #[test]
    fn missing_markers_route_to_missing() {
        let rules = rule_set(&[
            detail("1", "1"),
            detail("996", "NA::a"),
            detail("[997,999]", "NA::b"),
        ]);
        let classified = rules.classify().expect("classify");
        let missing: Vec<&str> = classified
            .missing
            .iter()
            .map(|category| category.code.as_str())
            .collect();
        assert_eq!(missing, vec!["996", "997", "998", "999"]);
        assert_eq!(
            classified.missing[0].missing_kind,
            Some(MissingKind::NotApplicable)
        );
        assert_eq!(classified.valid.len(), 1);
    }

    #[test]
    fn copy_rows_are_valid_and_continuous_intervals_stay_ranges() {
        let rules = rule_set(&[detail("[18.5,100]", "copy"), detail("999", "NA::b")]);
        let classified = rules.classify().expect("classify");
        assert!(classified.valid.is_empty());
        assert_eq!(classified.valid_ranges().count(), 1);
        assert_eq!(classified.missing.len(), 1);
    }

    #[test]
    fn interval_proportion_is_shared_between_codes() {
        let mut row = detail("[1,4]", "copy");
        row.proportion = Some(0.8);
        let rules = rule_set(&[row]);
        let classified = rules.classify().expect("classify");
        assert_eq!(classified.valid.len(), 4);
        for category in &classified.valid {
            let share = category.proportion.expect("share");
            assert!((share - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_looking_codes_without_classification_fail() {
        let rows = vec![detail("1", ""), detail("2", ""), detail("9", "")];
        let rules = rule_set(&rows);
        assert!(matches!(
            rules.classify(),
            Err(Error::ClassificationAmbiguity { .. })
        ));
    }

    #[test]
    fn unclassified_rows_without_missing_codes_are_valid() {
        let rows = vec![detail("1", ""), detail("2", "")];
        let rules = rule_set(&rows);
        assert_eq!(rules.codes(CodeClass::Valid).expect("valid"), vec!["1", "2"]);
    }

    #[test]
    fn intervals_keep_bounds_unexpanded() {
        let rules = rule_set(&[
            detail("[18,100]", "copy"),
            detail("996", "NA::a"),
            detail("[997,999]", "NA::b"),
        ]);
        let valid = rules.intervals(CodeClass::Valid).expect("valid");
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].numeric_bounds(), Some((18.0, 100.0)));
        assert_eq!(rules.intervals(CodeClass::Missing).expect("missing").len(), 1);
    }

    #[test]
    fn whole_valued_decimal_interval_expands_to_codes() {
        let rules = rule_set(&[detail("[1.0,3.0]", "copy"), detail("9", "NA::b")]);
        assert_eq!(
            rules.codes(CodeClass::Valid).expect("valid"),
            vec!["1", "2", "3"]
        );
        assert!(rules.classify().expect("classify").ranges.is_empty());
    }

    #[test]
    fn code_in_both_classes_is_rejected() {
        let rules = rule_set(&[detail("1", "1"), detail("1", "NA::a")]);
        assert!(matches!(rules.classify(), Err(Error::InvalidMetadata(_))));
    }

    #[test]
    fn two_else_rows_are_rejected() {
        let rows = [detail("else", "NA::a"), detail("else", "NA::b")];
        let refs: Vec<&DetailRecord> = rows.iter().collect();
        assert!(matches!(
            RuleSet::from_details("SMK_005", &refs),
            Err(Error::InvalidMetadata(_))
        ));
    }
}
