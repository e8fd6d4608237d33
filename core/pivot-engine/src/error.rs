//! FILENAME: core/pivot-engine/src/error.rs

use formula_parser::ParseError;
use thiserror::Error;

/// Configuration and consistency failures that abort a refresh pass.
/// Data-level problems (no records, evaluator errors) never surface here:
/// they become blank cells instead.
#[derive(Error, Debug)]
pub enum PivotError {
    #[error("Invalid aggregation function: {0}")]
    InvalidAggregationFunction(String),

    #[error("Invalid subtotal type: {0}")]
    InvalidTotalType(String),

    #[error("Invalid cache field index {index} (cache has {count} fields)")]
    InvalidCacheField { index: usize, count: usize },

    #[error("Cache field '{0}' is calculated and has no stored values")]
    CalculatedFieldValues(String),

    #[error("Invalid data field index {index} (pivot table has {count} data fields)")]
    InvalidDataField { index: usize, count: usize },

    #[error("Calculated field '{field}' references unknown field '{name}'")]
    UnknownFieldReference { field: String, name: String },

    #[error("Cyclic calculated field reference: {0}")]
    CyclicCalculatedField(String),

    #[error("Cannot merge a calculated value set with a non-calculated one")]
    MergeMismatch,

    #[error("Formula error: {0}")]
    FormulaParse(#[from] ParseError),

    #[error("Invalid pivot definition: {0}")]
    Config(#[from] serde_json::Error),
}

pub type PivotResult<T> = Result<T, PivotError>;
