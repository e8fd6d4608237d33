//! FILENAME: core/pivot-engine/src/backing.rs
//! Backing values of one body cell, axis total, or corner total.

use crate::definition::AggregationType;
use crate::error::{PivotError, PivotResult};
use crate::functions::AggregationEngine;
use formula_eval::CellValue;
use std::collections::BTreeMap;

/// Raw values behind a cell. Exactly one shape per set, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum BackingValues {
    /// Values of a stored data field, in record order.
    Raw(Vec<CellValue>),
    /// Values of every field a calculated field references, plus its
    /// resolved formula.
    Calculated {
        formula: Option<String>,
        field_values: BTreeMap<String, Vec<CellValue>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackingValueSet {
    values: BackingValues,
    result: Option<CellValue>,

    /// Whether the cell's value is displayed.
    pub show_value: bool,
    pub data_field_index: usize,
    pub sheet_row: u32,
    pub sheet_column: u32,
}

impl BackingValueSet {
    pub fn raw(values: Vec<CellValue>) -> Self {
        BackingValueSet::with_values(BackingValues::Raw(values))
    }

    pub fn calculated(formula: Option<String>, field_values: BTreeMap<String, Vec<CellValue>>) -> Self {
        BackingValueSet::with_values(BackingValues::Calculated {
            formula,
            field_values,
        })
    }

    fn with_values(values: BackingValues) -> Self {
        BackingValueSet {
            values,
            result: None,
            show_value: false,
            data_field_index: 0,
            sheet_row: 0,
            sheet_column: 0,
        }
    }

    /// Copy of this set's values, ready to accumulate into.
    pub fn start_accumulator(&self) -> Self {
        BackingValueSet {
            data_field_index: self.data_field_index,
            ..BackingValueSet::with_values(self.values.clone())
        }
    }

    pub fn is_calculated_cell(&self) -> bool {
        matches!(self.values, BackingValues::Calculated { .. })
    }

    pub fn backing_values(&self) -> &BackingValues {
        &self.values
    }

    /// Raw values, for non-calculated sets.
    pub fn values(&self) -> Option<&[CellValue]> {
        match &self.values {
            BackingValues::Raw(values) => Some(values),
            BackingValues::Calculated { .. } => None,
        }
    }

    /// Per-field values, for calculated sets.
    pub fn field_values(&self) -> Option<&BTreeMap<String, Vec<CellValue>>> {
        match &self.values {
            BackingValues::Calculated { field_values, .. } => Some(field_values),
            BackingValues::Raw(_) => None,
        }
    }

    /// True when no value at all contributed.
    pub fn is_empty(&self) -> bool {
        match &self.values {
            BackingValues::Raw(values) => values.is_empty(),
            BackingValues::Calculated { field_values, .. } => field_values.values().all(Vec::is_empty),
        }
    }

    /// Appends `other`'s values after this set's own. Calculated sets merge
    /// per field; fields only `other` has are added.
    pub fn merge(&mut self, other: &BackingValueSet) -> PivotResult<()> {
        match (&mut self.values, &other.values) {
            (BackingValues::Raw(mine), BackingValues::Raw(theirs)) => {
                mine.extend(theirs.iter().cloned());
            }
            (
                BackingValues::Calculated { formula, field_values },
                BackingValues::Calculated {
                    formula: other_formula,
                    field_values: other_values,
                },
            ) => {
                if formula.is_none() {
                    formula.clone_from(other_formula);
                }
                for (field, values) in other_values {
                    field_values
                        .entry(field.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
            }
            _ => return Err(PivotError::MergeMismatch),
        }
        self.result = None;
        Ok(())
    }

    /// Computes and memoizes the result. Raw sets use `function`; calculated
    /// sets always evaluate their formula.
    pub fn calculate(
        &mut self,
        function: AggregationType,
        engine: &mut AggregationEngine,
    ) -> PivotResult<&CellValue> {
        if self.result.is_none() {
            let value = match &self.values {
                BackingValues::Raw(values) => engine.calculate(function, values),
                BackingValues::Calculated { formula, field_values } => {
                    engine.evaluate_calculated_field_formula(field_values, formula.as_deref())?
                }
            };
            self.result = Some(value);
        }
        Ok(self.result.get_or_insert(CellValue::Empty))
    }

    /// The memoized result; `Empty` until calculated.
    pub fn result(&self) -> &CellValue {
        self.result.as_ref().unwrap_or(&CellValue::Empty)
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(values: &[f64]) -> BackingValueSet {
        BackingValueSet::raw(values.iter().map(|&n| CellValue::Number(n)).collect())
    }

    fn calc(fields: Vec<(&str, Vec<f64>)>) -> BackingValueSet {
        let field_values = fields
            .into_iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|&n| CellValue::Number(n)).collect(),
                )
            })
            .collect();
        BackingValueSet::calculated(Some("'A'+'B'".to_string()), field_values)
    }

    #[test]
    fn raw_merge_preserves_order() {
        let mut a = raw(&[1.0, 2.0]);
        a.merge(&raw(&[3.0])).unwrap();
        let expected: Vec<CellValue> = [1.0, 2.0, 3.0].iter().map(|&n| n.into()).collect();
        assert_eq!(a.values(), Some(expected.as_slice()));
    }

    #[test]
    fn raw_merge_is_associative() {
        let (a, b, c) = (raw(&[1.0]), raw(&[2.0, 3.0]), raw(&[4.0]));

        let mut left = a.clone();
        left.merge(&b).unwrap();
        left.merge(&c).unwrap();

        let mut bc = b.clone();
        bc.merge(&c).unwrap();
        let mut right = a.clone();
        right.merge(&bc).unwrap();

        assert_eq!(left.values(), right.values());
    }

    #[test]
    fn calculated_merge_unions_fields() {
        let mut a = calc(vec![("A", vec![1.0])]);
        a.merge(&calc(vec![("A", vec![2.0]), ("B", vec![5.0])])).unwrap();

        let fields = a.field_values().unwrap();
        assert_eq!(fields["A"], vec![CellValue::Number(1.0), CellValue::Number(2.0)]);
        assert_eq!(fields["B"], vec![CellValue::Number(5.0)]);
    }

    #[test]
    fn mixed_merge_is_rejected() {
        let mut a = raw(&[1.0]);
        assert!(matches!(a.merge(&calc(vec![("A", vec![1.0])])), Err(PivotError::MergeMismatch)));
        let mut b = calc(vec![("A", vec![1.0])]);
        assert!(matches!(b.merge(&raw(&[1.0])), Err(PivotError::MergeMismatch)));
    }

    #[test]
    fn result_is_memoized_until_merge() {
        let mut engine = AggregationEngine::new();
        let mut set = raw(&[1.0, 2.0]);
        assert_eq!(set.result(), &CellValue::Empty);

        assert_eq!(set.calculate(AggregationType::Sum, &mut engine).unwrap(), &CellValue::Number(3.0));
        // A different function does not recompute a memoized result.
        assert_eq!(set.calculate(AggregationType::Max, &mut engine).unwrap(), &CellValue::Number(3.0));

        set.merge(&raw(&[4.0])).unwrap();
        assert!(!set.has_result());
        assert_eq!(set.calculate(AggregationType::Max, &mut engine).unwrap(), &CellValue::Number(4.0));
    }

    #[test]
    fn calculated_result_uses_formula() {
        let mut engine = AggregationEngine::new();
        engine.add_names(["A", "B"]);
        let mut set = calc(vec![("A", vec![1.0, 2.0]), ("B", vec![10.0])]);
        assert_eq!(set.calculate(AggregationType::Count, &mut engine).unwrap(), &CellValue::Number(13.0));
    }

    #[test]
    fn emptiness() {
        assert!(raw(&[]).is_empty());
        assert!(calc(vec![("A", vec![]), ("B", vec![])]).is_empty());
        assert!(!calc(vec![("A", vec![]), ("B", vec![0.0])]).is_empty());
    }
}
