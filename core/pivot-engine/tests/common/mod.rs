//! FILENAME: tests/common/mod.rs
//! Shared fixtures for pivot engine integration tests.

#![allow(dead_code)]

use pivot_engine::{
    AggregationType, CellValue, DataField, PivotCache, PivotHeader, PivotTableDefinition, ValuesPosition,
};

pub const CITY: usize = 0;
pub const MONTH: usize = 1;
pub const TOTAL: usize = 2;
pub const WHOLESALE: usize = 3;

/// Sales by city and month.
pub struct CityFixture;

impl CityFixture {
    pub fn records() -> Vec<(&'static str, &'static str, f64, f64)> {
        vec![
            ("Chicago", "January", 100.0, 60.0),
            ("Chicago", "January", 50.0, 20.0),
            ("Nashville", "February", 30.0, 10.0),
        ]
    }

    pub fn cache() -> PivotCache {
        let mut cache = PivotCache::new(&["City", "Month", "Total", "Wholesale Price"]);
        for (city, month, total, wholesale) in Self::records() {
            cache.add_record(&[city.into(), month.into(), CellValue::Number(total), CellValue::Number(wholesale)]);
        }
        cache
    }

    /// Sum of Total and Sum of Wholesale Price, laid out on rows.
    pub fn definition() -> PivotTableDefinition {
        let mut definition = PivotTableDefinition::new("CitySales");
        definition.values_position = ValuesPosition::Rows;
        definition.data_fields = vec![
            DataField::new(TOTAL, "Sum of Total", AggregationType::Sum),
            DataField::new(WHOLESALE, "Sum of Wholesale Price", AggregationType::Sum),
        ];
        definition
    }

    /// Chicago/Total, Chicago/Wholesale, Nashville/Total, Nashville/Wholesale,
    /// then one grand total row per data field.
    pub fn rows(data_fields: usize) -> Vec<PivotHeader> {
        let cities = [vec![0, 1], vec![2]];
        let mut rows = Vec::new();
        for indices in cities {
            for d in 0..data_fields {
                rows.push(
                    PivotHeader::leaf(rows.len(), Some(indices.clone()))
                        .with_field(CITY)
                        .with_data_field(d),
                );
            }
        }
        for d in 0..data_fields {
            rows.push(PivotHeader::grand_total(rows.len()).with_data_field(d));
        }
        rows
    }

    /// January, February, Grand Total.
    pub fn columns() -> Vec<PivotHeader> {
        vec![
            PivotHeader::leaf(0, Some(vec![0, 1])).with_field(MONTH),
            PivotHeader::leaf(1, Some(vec![2])).with_field(MONTH),
            PivotHeader::grand_total(2),
        ]
    }
}

pub fn number(value: Option<&CellValue>) -> Option<f64> {
    value.and_then(CellValue::as_number)
}
