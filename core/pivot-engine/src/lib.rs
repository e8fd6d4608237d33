//! FILENAME: core/pivot-engine/src/lib.rs
//! Pivot table data aggregation.
//!
//! Computes body values, subtotals and grand totals of a pivot table from
//! already-built row and column headers and a record cache. Formula parsing
//! and evaluation for calculated fields come from `formula-parser` and
//! `formula-eval`.
//!
//! Layers:
//! - `definition`, `header`: Serializable configuration (what the pivot table IS)
//! - `cache`: Interned records and record access (WHAT we aggregate)
//! - `functions`, `calculated`, `backing`: Aggregation and calculated fields
//! - `body`, `totals`, `show_as`: The body matrix, totals and display transforms
//! - `writer`, `engine`: Output collection and the refresh pass

pub mod backing;
pub mod body;
pub mod cache;
pub mod calculated;
pub mod definition;
pub mod engine;
pub mod error;
pub mod functions;
pub mod header;
pub mod show_as;
pub mod totals;
pub mod writer;

pub use backing::{BackingValueSet, BackingValues};
pub use body::{BodyMatrix, PivotBodyAggregator};
pub use cache::*;
pub use calculated::configure_calculated_fields;
pub use definition::*;
pub use engine::{calculate_pivot, compute_pivot, PivotCalculator};
pub use error::{PivotError, PivotResult};
pub use functions::{calculate, AggregationEngine, SANITIZED_NAME_PREFIX};
pub use header::{PivotHeader, TotalType};
pub use show_as::{ShowDataAsCalculator, ShowDataAsContext};
pub use totals::{AxisTotals, CornerTotals, GrandTotalAccumulator, TotalsAxis};
pub use writer::{CellWriter, MemorySheet, OutputCell, OutputRegion, PivotOutput};

pub use formula_eval::{CellError, CellValue};
