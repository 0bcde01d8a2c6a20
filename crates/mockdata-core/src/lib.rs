//! Metadata contracts for mockdata.
//!
//! This crate defines the variables/details table rows, the range notation
//! parser, the `variableStart` identifier resolver and the valid/missing rule
//! classifier shared by the generators and the CLI.

pub mod error;
pub mod identifier;
pub mod load;
pub mod metadata;
pub mod notation;
pub mod rules;
pub mod validation;

pub use error::{Error, Result};
pub use identifier::{SourceRef, parse_variable_start, resolve_source_name};
pub use load::{load_metadata, load_variable_details, load_variables};
pub use metadata::{
    DetailRecord, Distribution, GarbageSpec, GenerationParams, Metadata, SourceFormat,
    VariableDescriptor, VariableKind, VariableRecord, split_windows,
};
pub use notation::{Bound, Domain, ELSE_TOKEN, Interval, Selector, parse_interval, parse_selector};
pub use rules::{
    Category, ClassifiedCategories, CodeClass, DetailRule, Fallback, MissingKind, RangeRule,
    RuleSet, Target,
};
pub use validation::validate_metadata;
