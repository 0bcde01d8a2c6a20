//! Resolution of `variableStart` expressions to raw source variable names.
//!
//! Supported entries, comma separated:
//! - `cchs2001_p::DHHAGAGE` qualified by database/cycle,
//! - `[DHH_AGE]` fallback valid in every window,
//! - `DerivedVar::[a, b]` marker for derived variables (never resolves).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("name pattern is valid"));

const DERIVED_PREFIX: &str = "DerivedVar::";

/// One entry of a `variableStart` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Qualified { source: String, name: String },
    Fallback(String),
    Derived(Vec<String>),
}

/// Parse a `variableStart` cell into its entries.
pub fn parse_variable_start(input: &str) -> Result<Vec<SourceRef>> {
    let mut refs = Vec::new();
    for token in split_top_level(input)? {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        refs.push(parse_entry(input, token)?);
    }
    if refs.is_empty() {
        return Err(Error::parse(input, "no identifiers"));
    }
    Ok(refs)
}

/// Resolve the raw variable name for `window`.
///
/// An exact `window::name` entry wins; otherwise the first `[name]` fallback
/// is used. Returns `Ok(None)` when neither exists.
pub fn resolve_source_name(input: &str, window: &str) -> Result<Option<String>> {
    let refs = parse_variable_start(input)?;
    let qualified = refs.iter().find_map(|entry| match entry {
        SourceRef::Qualified { source, name } if source == window => Some(name.clone()),
        _ => None,
    });
    if qualified.is_some() {
        return Ok(qualified);
    }
    Ok(refs.into_iter().find_map(|entry| match entry {
        SourceRef::Fallback(name) => Some(name),
        _ => None,
    }))
}

fn parse_entry(input: &str, token: &str) -> Result<SourceRef> {
    if let Some(rest) = token.strip_prefix(DERIVED_PREFIX) {
        let inner = strip_brackets(rest)
            .ok_or_else(|| Error::parse(input, "DerivedVar entry must be bracketed"))?;
        let names = inner
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| check_name(input, name))
            .collect::<Result<Vec<_>>>()?;
        return Ok(SourceRef::Derived(names));
    }

    if let Some((source, name)) = token.split_once("::") {
        let source = check_name(input, source.trim())?;
        let name = name.trim();
        let name = strip_brackets(name).unwrap_or(name);
        let name = check_name(input, name.trim())?;
        return Ok(SourceRef::Qualified { source, name });
    }

    let name = strip_brackets(token).unwrap_or(token);
    Ok(SourceRef::Fallback(check_name(input, name.trim())?))
}

fn strip_brackets(value: &str) -> Option<&str> {
    value.strip_prefix('[')?.strip_suffix(']')
}

fn check_name(input: &str, name: &str) -> Result<String> {
    if NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(Error::parse(input, format!("invalid identifier '{name}'")))
    }
}

/// Split on commas that are not inside brackets.
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    for (index, ch) in input.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::parse(input, "unbalanced ']'"));
                }
            }
            ',' if depth == 0 => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::parse(input, "unbalanced '['"));
    }
    parts.push(&input[start..]);
    Ok(parts)
}
