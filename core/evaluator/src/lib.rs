//! FILENAME: core/evaluator/src/lib.rs
//! PURPOSE: Standalone expression evaluation for pivot calculated fields.

pub mod cell;
pub mod evaluator;
pub mod names;

pub use cell::{CellError, CellValue};
pub use evaluator::{EvalResult, Evaluator, MAX_NAME_DEPTH};
pub use names::NameTable;
