//! FILENAME: core/pivot-engine/src/definition.rs
//! Serializable pivot table layout: data fields, axis fields and options.
//!
//! These types DESCRIBE a pivot table: its data fields with their
//! aggregation and display mode, per-field subtotal and hidden-item
//! settings, and the body's anchor on the worksheet. Header trees are not
//! part of the definition; they arrive already built.

use crate::error::{PivotError, PivotResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Index into the cache fields (0-based).
pub type FieldIndex = usize;

/// Number format applied to percentage display modes when the data field
/// has no explicit format ("0.00%").
pub const PERCENT_NUMBER_FORMAT_ID: u32 = 10;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for data fields.
/// Serialized with the spreadsheet file format spelling (`countNums`, `stdDevp`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AggregationType {
    #[default]
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "countNums")]
    CountNumbers,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "product")]
    Product,
    #[serde(rename = "stdDev")]
    StdDev,
    #[serde(rename = "stdDevp")]
    StdDevP,
    #[serde(rename = "var")]
    Var,
    #[serde(rename = "varp")]
    VarP,
}

impl AggregationType {
    pub const ALL: [AggregationType; 11] = [
        AggregationType::Sum,
        AggregationType::Count,
        AggregationType::CountNumbers,
        AggregationType::Average,
        AggregationType::Max,
        AggregationType::Min,
        AggregationType::Product,
        AggregationType::StdDev,
        AggregationType::StdDevP,
        AggregationType::Var,
        AggregationType::VarP,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::CountNumbers => "countNums",
            AggregationType::Average => "average",
            AggregationType::Max => "max",
            AggregationType::Min => "min",
            AggregationType::Product => "product",
            AggregationType::StdDev => "stdDev",
            AggregationType::StdDevP => "stdDevp",
            AggregationType::Var => "var",
            AggregationType::VarP => "varp",
        }
    }
}

impl FromStr for AggregationType {
    type Err = PivotError;

    /// Matching is case-insensitive; unknown names never fall back to Sum.
    fn from_str(s: &str) -> PivotResult<Self> {
        AggregationType::ALL
            .iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| PivotError::InvalidAggregationFunction(s.to_string()))
    }
}

impl std::fmt::Display for AggregationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SHOW DATA AS
// ============================================================================

/// Post-aggregation display transform for a data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ShowDataAs {
    #[default]
    Normal,
    /// Value / grand-grand total.
    PercentOfTotal,
    /// Value / the total of its row.
    PercentOfRow,
    /// Value / the total of its column.
    PercentOfColumn,
    /// (Value * grand-grand total) / (row total * column total).
    Index,
    /// Accumulated down the leaf rows of each column.
    RunningTotal,
    /// Running total / column total.
    PercentOfRunningTotal,
}

impl ShowDataAs {
    /// Modes whose output is a fraction to be displayed as a percentage.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            ShowDataAs::PercentOfTotal
                | ShowDataAs::PercentOfRow
                | ShowDataAs::PercentOfColumn
                | ShowDataAs::PercentOfRunningTotal
        )
    }
}

// ============================================================================
// FIELD DEFINITIONS
// ============================================================================

/// Pivot settings of one cache field. Indexed by cache field index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotField {
    /// Whether the default subtotal is displayed for this field's items.
    pub default_subtotal: bool,

    /// Items filtered out of the pivot table, by display text.
    pub hidden_items: Vec<String>,
}

impl Default for PivotField {
    fn default() -> Self {
        PivotField {
            default_subtotal: true,
            hidden_items: Vec::new(),
        }
    }
}

/// A configured value field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    /// Index of the cache field being aggregated.
    pub source_index: FieldIndex,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub function: AggregationType,

    #[serde(default)]
    pub number_format_id: u32,

    #[serde(default)]
    pub show_data_as: ShowDataAs,
}

impl DataField {
    pub fn new(source_index: FieldIndex, name: &str, function: AggregationType) -> Self {
        DataField {
            source_index,
            name: name.to_string(),
            function,
            number_format_id: 0,
            show_data_as: ShowDataAs::Normal,
        }
    }

    pub fn with_show_data_as(mut self, show_data_as: ShowDataAs) -> Self {
        self.show_data_as = show_data_as;
        self
    }

    /// The format id written for this field's values.
    pub fn effective_number_format_id(&self) -> u32 {
        if self.number_format_id == 0 && self.show_data_as.is_percentage() {
            PERCENT_NUMBER_FORMAT_ID
        } else {
            self.number_format_id
        }
    }
}

/// A report filter field. `selected_item` restricts every body cell to the
/// records whose value in `source_index` displays as that text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageField {
    pub source_index: FieldIndex,

    #[serde(default)]
    pub selected_item: Option<String>,
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Which axis carries the data-field breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ValuesPosition {
    #[default]
    Columns,
    Rows,
}

/// Sheet position of the first body cell (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PivotLocation {
    pub row: u32,
    pub col: u32,
}

// ============================================================================
// PIVOT TABLE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotTableDefinition {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub location: PivotLocation,

    /// Per cache field settings. Missing entries use `PivotField::default()`.
    #[serde(default)]
    pub fields: Vec<PivotField>,

    #[serde(default)]
    pub data_fields: Vec<DataField>,

    #[serde(default)]
    pub page_fields: Vec<PageField>,

    #[serde(default)]
    pub values_position: ValuesPosition,

    #[serde(default = "default_true")]
    pub show_row_grand_totals: bool,

    #[serde(default = "default_true")]
    pub show_column_grand_totals: bool,
}

fn default_true() -> bool {
    true
}

impl PivotTableDefinition {
    pub fn new(name: &str) -> Self {
        PivotTableDefinition {
            name: name.to_string(),
            location: PivotLocation::default(),
            fields: Vec::new(),
            data_fields: Vec::new(),
            page_fields: Vec::new(),
            values_position: ValuesPosition::Columns,
            show_row_grand_totals: true,
            show_column_grand_totals: true,
        }
    }

    pub fn from_json(json: &str) -> PivotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> PivotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when data fields are laid out along the row axis.
    pub fn data_on_rows(&self) -> bool {
        self.values_position == ValuesPosition::Rows
    }

    pub fn shows_default_subtotal(&self, index: FieldIndex) -> bool {
        self.fields
            .get(index)
            .map(|f| f.default_subtotal)
            .unwrap_or(true)
    }

    pub fn data_field(&self, index: usize) -> PivotResult<&DataField> {
        self.data_fields.get(index).ok_or(PivotError::InvalidDataField {
            index,
            count: self.data_fields.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_names_parse() {
        assert_eq!("sum".parse::<AggregationType>().unwrap(), AggregationType::Sum);
        assert_eq!("countNums".parse::<AggregationType>().unwrap(), AggregationType::CountNumbers);
        assert_eq!("STDDEVP".parse::<AggregationType>().unwrap(), AggregationType::StdDevP);
        assert_eq!("varp".parse::<AggregationType>().unwrap(), AggregationType::VarP);
    }

    #[test]
    fn unknown_aggregation_is_an_error() {
        let err = "median".parse::<AggregationType>().unwrap_err();
        assert!(matches!(err, PivotError::InvalidAggregationFunction(ref name) if name == "median"));
    }

    #[test]
    fn percentage_modes_get_percent_format() {
        let plain = DataField::new(0, "Sum of Total", AggregationType::Sum);
        assert_eq!(plain.effective_number_format_id(), 0);

        let pct = plain.clone().with_show_data_as(ShowDataAs::PercentOfRow);
        assert_eq!(pct.effective_number_format_id(), PERCENT_NUMBER_FORMAT_ID);

        let index = plain.clone().with_show_data_as(ShowDataAs::Index);
        assert_eq!(index.effective_number_format_id(), 0);

        let mut custom = pct;
        custom.number_format_id = 9;
        assert_eq!(custom.effective_number_format_id(), 9);
    }

    #[test]
    fn definition_from_json_uses_defaults() {
        let json = r#"{
            "name": "Sales",
            "data_fields": [
                { "source_index": 2, "name": "Sum of Total", "function": "sum" },
                { "source_index": 3, "function": "countNums", "show_data_as": "percentOfTotal" }
            ],
            "values_position": "rows"
        }"#;

        let def = PivotTableDefinition::from_json(json).unwrap();
        assert_eq!(def.name, "Sales");
        assert!(def.data_on_rows());
        assert!(def.show_row_grand_totals);
        assert!(def.show_column_grand_totals);
        assert_eq!(def.data_fields[1].function, AggregationType::CountNumbers);
        assert_eq!(def.data_fields[1].show_data_as, ShowDataAs::PercentOfTotal);
        assert!(def.shows_default_subtotal(7));
        assert_eq!(def.location, PivotLocation::default());
    }

    #[test]
    fn definition_json_rejects_unknown_function() {
        let json = r#"{ "data_fields": [ { "source_index": 0, "function": "median" } ] }"#;
        assert!(matches!(
            PivotTableDefinition::from_json(json),
            Err(PivotError::Config(_))
        ));
    }

    #[test]
    fn definition_round_trips_through_json() {
        let mut def = PivotTableDefinition::new("Round Trip");
        def.location = PivotLocation { row: 4, col: 1 };
        def.fields.push(PivotField {
            default_subtotal: false,
            hidden_items: vec!["Memphis".to_string()],
        });
        def.data_fields
            .push(DataField::new(2, "Max of Total", AggregationType::Max));
        def.page_fields.push(PageField {
            source_index: 1,
            selected_item: Some("January".to_string()),
        });

        let json = def.to_json().unwrap();
        assert!(json.contains("\"max\""));
        assert_eq!(PivotTableDefinition::from_json(&json).unwrap(), def);
    }

    #[test]
    fn missing_data_field_is_reported() {
        let def = PivotTableDefinition::new("Empty");
        assert!(matches!(
            def.data_field(2),
            Err(PivotError::InvalidDataField { index: 2, count: 0 })
        ));
    }
}
