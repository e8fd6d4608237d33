//! FILENAME: core/pivot-engine/src/header.rs
//! Row and column header nodes.
//!
//! Headers are produced by an external layout step (grouping, sorting and
//! filtering happen there) and are read-only here. Each header knows which
//! cache records it covers; `None` means the header puts no restriction on
//! its axis (a grand total, or a layout with no fields on that axis).

use crate::definition::{AggregationType, FieldIndex, PivotTableDefinition};
use crate::error::{PivotError, PivotResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subtotal setting of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum TotalType {
    /// Use the data field's own function.
    #[default]
    Default,
    /// Subtotal explicitly suppressed.
    None,
    /// Subtotal computed with this function instead of the data field's.
    Function(AggregationType),
}

impl FromStr for TotalType {
    type Err = PivotError;

    fn from_str(s: &str) -> PivotResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(TotalType::Default),
            "none" => Ok(TotalType::None),
            _ => s
                .parse::<AggregationType>()
                .map(TotalType::Function)
                .map_err(|_| PivotError::InvalidTotalType(s.to_string())),
        }
    }
}

impl TryFrom<String> for TotalType {
    type Error = PivotError;

    fn try_from(value: String) -> PivotResult<Self> {
        value.parse()
    }
}

impl From<TotalType> for String {
    fn from(value: TotalType) -> Self {
        match value {
            TotalType::Default => "default".to_string(),
            TotalType::None => "none".to_string(),
            TotalType::Function(f) => f.as_str().to_string(),
        }
    }
}

/// One node of a row or column header sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotHeader {
    /// Ordinal position along the axis.
    pub position: usize,

    /// Cache field this header groups by (for subtotal settings).
    #[serde(default)]
    pub field_index: Option<FieldIndex>,

    pub is_leaf_node: bool,

    #[serde(default)]
    pub is_grand_total: bool,

    /// Placeholder row used when several data fields collapse into rows.
    #[serde(default)]
    pub is_place_holder: bool,

    #[serde(default)]
    pub is_above_data_field: bool,

    /// Data field this header stands for when data fields are on this axis.
    #[serde(default)]
    pub data_field_index: usize,

    #[serde(default)]
    pub total_type: TotalType,

    /// Records covered by this header, in cache order.
    #[serde(default)]
    pub cache_record_indices: Option<Vec<usize>>,
}

impl PivotHeader {
    /// A leaf header covering `indices`.
    pub fn leaf(position: usize, indices: Option<Vec<usize>>) -> Self {
        PivotHeader {
            position,
            field_index: None,
            is_leaf_node: true,
            is_grand_total: false,
            is_place_holder: false,
            is_above_data_field: false,
            data_field_index: 0,
            total_type: TotalType::Default,
            cache_record_indices: indices,
        }
    }

    /// A subtotal header for `field_index` covering `indices`.
    pub fn subtotal(position: usize, field_index: FieldIndex, indices: Vec<usize>) -> Self {
        PivotHeader {
            is_leaf_node: false,
            field_index: Some(field_index),
            ..PivotHeader::leaf(position, Some(indices))
        }
    }

    /// The grand total header at the end of an axis.
    pub fn grand_total(position: usize) -> Self {
        PivotHeader {
            is_leaf_node: false,
            is_grand_total: true,
            ..PivotHeader::leaf(position, None)
        }
    }

    pub fn with_field(mut self, field_index: FieldIndex) -> Self {
        self.field_index = Some(field_index);
        self
    }

    pub fn with_data_field(mut self, data_field_index: usize) -> Self {
        self.data_field_index = data_field_index;
        self
    }

    pub fn with_total_type(mut self, total_type: TotalType) -> Self {
        self.total_type = total_type;
        self
    }

    pub fn place_holder(mut self) -> Self {
        self.is_place_holder = true;
        self
    }

    /// Function overriding the data field's function on a subtotal header.
    pub fn subtotal_function(&self) -> Option<AggregationType> {
        match self.total_type {
            TotalType::Function(f) if !self.is_leaf_node => Some(f),
            _ => None,
        }
    }

    pub fn record_indices(&self) -> Option<&[usize]> {
        self.cache_record_indices.as_deref()
    }

    /// True when this header's field displays its default subtotal and the
    /// header does not suppress it.
    pub fn shows_subtotal(&self, definition: &PivotTableDefinition) -> bool {
        self.field_index
            .is_some_and(|f| definition.shows_default_subtotal(f))
            && self.total_type != TotalType::None
    }
}
