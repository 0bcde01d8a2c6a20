//! Synthetic survey data generation for mockdata.
//!
//! This crate consumes validated metadata from `mockdata-core` and produces
//! deterministic, typed columns: categorical codes, bounded continuous values,
//! dates in several encodings and correlated survival dates.

pub mod coerce;
pub mod engine;
pub mod errors;
pub mod generators;
pub mod model;
pub mod output;
pub mod proportions;
pub mod sampling;

pub use coerce::{OutputType, output_type_fallback, resolve_output_type};
pub use engine::{GenerationEngine, GenerationResult, derive_seed};
pub use errors::GenerationError;
pub use generators::categorical::{CategoricalConfig, generate_categorical};
pub use generators::continuous::{ContinuousConfig, generate_continuous};
pub use generators::date::{DateConfig, decode_date, encode_date, generate_date};
pub use generators::survival::{EventConfig, SurvivalConfig, generate_survival};
pub use generators::{Column, Table, Value};
pub use model::{
    ColumnReport, GenerateOptions, GenerationIssue, GenerationReport, SurvivalVariables,
};
pub use output::csv::{write_csv, write_table_csv};
pub use proportions::{
    CategoryWeight, PROPORTION_TOLERANCE, ProportionSource, ResolvedProportions,
    resolve_proportions,
};
