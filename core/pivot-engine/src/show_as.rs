//! FILENAME: core/pivot-engine/src/show_as.rs
//! Show-data-as transforms applied to aggregated results before display.

use crate::backing::BackingValueSet;
use crate::body::BodyMatrix;
use crate::definition::ShowDataAs;
use crate::header::PivotHeader;
use crate::totals::{AxisTotals, CornerTotals};
use formula_eval::{CellError, CellValue};

/// Everything a transform may look at besides the value itself.
#[derive(Clone, Copy)]
pub struct ShowDataAsContext<'a> {
    pub rows: &'a [PivotHeader],
    pub columns: &'a [PivotHeader],
    pub matrix: &'a BodyMatrix,
    pub row_totals: &'a AxisTotals,
    pub column_totals: &'a AxisTotals,
    pub corner: &'a CornerTotals,
}

impl<'a> ShowDataAsContext<'a> {
    fn row_total(&self, row: usize, data_field: usize) -> Option<&'a CellValue> {
        self.row_totals.get(row, data_field).map(BackingValueSet::result)
    }

    fn column_total(&self, column: usize, data_field: usize) -> Option<&'a CellValue> {
        self.column_totals.get(column, data_field).map(BackingValueSet::result)
    }

    fn corner_total(&self, data_field: usize) -> Option<&'a CellValue> {
        self.corner.get(data_field).map(BackingValueSet::result)
    }

    fn is_leaf_row(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|h| h.is_leaf_node && !h.is_grand_total)
    }
}

/// `numerator / denominator` with spreadsheet semantics: a blank numerator
/// stays blank, an error numerator is passed through, and a missing or zero
/// denominator is `#DIV/0!`.
fn ratio(numerator: &CellValue, denominator: Option<&CellValue>) -> CellValue {
    let n = match numerator {
        CellValue::Number(n) => *n,
        CellValue::Empty => return CellValue::Empty,
        other => return other.clone(),
    };
    match denominator.and_then(CellValue::as_number) {
        Some(d) if d != 0.0 => CellValue::Number(n / d),
        _ => CellValue::Error(CellError::Div0),
    }
}

fn sum_numbers<'v>(values: impl Iterator<Item = &'v CellValue>) -> CellValue {
    CellValue::Number(values.filter_map(CellValue::as_number).sum())
}

/// One calculator per mode; every method is a single `match` on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowDataAsCalculator {
    mode: ShowDataAs,
}

impl ShowDataAsCalculator {
    pub fn for_mode(mode: ShowDataAs) -> Self {
        ShowDataAsCalculator { mode }
    }

    pub fn mode(&self) -> ShowDataAs {
        self.mode
    }

    /// Display value of body cell (`row`, `column`).
    pub fn calculate_body_value(&self, row: usize, column: usize, context: &ShowDataAsContext) -> CellValue {
        let Some(cell) = context.matrix.get(row, column) else {
            return CellValue::Empty;
        };
        let value = cell.result();
        let slot = cell.data_field_index;

        match self.mode {
            ShowDataAs::Normal => value.clone(),
            ShowDataAs::PercentOfTotal => ratio(value, context.corner_total(slot)),
            ShowDataAs::PercentOfRow => ratio(value, context.row_total(row, slot)),
            ShowDataAs::PercentOfColumn => ratio(value, context.column_total(column, slot)),
            ShowDataAs::Index => {
                let scaled = match (value, context.corner_total(slot).and_then(CellValue::as_number)) {
                    (CellValue::Number(v), Some(corner)) => CellValue::Number(v * corner),
                    (CellValue::Number(_), None) => return CellValue::Error(CellError::Div0),
                    (other, _) => other.clone(),
                };
                let row_total = context.row_total(row, slot).and_then(CellValue::as_number);
                let column_total = context.column_total(column, slot).and_then(CellValue::as_number);
                let denominator = match (row_total, column_total) {
                    (Some(r), Some(c)) => Some(CellValue::Number(r * c)),
                    _ => None,
                };
                ratio(&scaled, denominator.as_ref())
            }
            ShowDataAs::RunningTotal => self.running_body_value(row, column, slot, context),
            ShowDataAs::PercentOfRunningTotal => {
                let running = self.running_body_value(row, column, slot, context);
                ratio(&running, context.column_total(column, slot))
            }
        }
    }

    fn running_body_value(&self, row: usize, column: usize, slot: usize, context: &ShowDataAsContext) -> CellValue {
        let own = context
            .matrix
            .get(row, column)
            .map(|c| c.result().clone())
            .unwrap_or_default();
        if !context.is_leaf_row(row) || !matches!(own, CellValue::Number(_)) {
            return own;
        }

        sum_numbers(
            (0..=row)
                .filter(|&r| context.is_leaf_row(r))
                .filter_map(|r| context.matrix.get(r, column))
                .filter(|c| c.show_value && c.data_field_index == slot)
                .map(BackingValueSet::result),
        )
    }

    /// Display value of the axis total at `index` for data field `slot`.
    /// `is_row_total` selects the totals indexed by row (the grand total
    /// column) over those indexed by column.
    pub fn calculate_grand_total_value(
        &self,
        index: usize,
        slot: usize,
        context: &ShowDataAsContext,
        is_row_total: bool,
    ) -> CellValue {
        let own = if is_row_total {
            context.row_total(index, slot)
        } else {
            context.column_total(index, slot)
        };
        let Some(total) = own else {
            return CellValue::Empty;
        };
        let corner = context.corner_total(slot);

        match self.mode {
            ShowDataAs::Normal => total.clone(),
            ShowDataAs::PercentOfTotal => ratio(total, corner),
            ShowDataAs::PercentOfRow if is_row_total => ratio(total, Some(total)),
            ShowDataAs::PercentOfRow => ratio(total, corner),
            ShowDataAs::PercentOfColumn if is_row_total => ratio(total, corner),
            ShowDataAs::PercentOfColumn => ratio(total, Some(total)),
            ShowDataAs::Index => ratio(total, Some(total)),
            ShowDataAs::RunningTotal if is_row_total => self.running_row_total(index, slot, context),
            ShowDataAs::RunningTotal => total.clone(),
            ShowDataAs::PercentOfRunningTotal if is_row_total => {
                let running = self.running_row_total(index, slot, context);
                ratio(&running, corner)
            }
            ShowDataAs::PercentOfRunningTotal => ratio(total, Some(total)),
        }
    }

    fn running_row_total(&self, row: usize, slot: usize, context: &ShowDataAsContext) -> CellValue {
        let own = context.row_total(row, slot).cloned().unwrap_or_default();
        if !context.is_leaf_row(row) || !matches!(own, CellValue::Number(_)) {
            return own;
        }
        sum_numbers(
            (0..=row)
                .filter(|&r| context.is_leaf_row(r))
                .filter_map(|r| context.row_total(r, slot)),
        )
    }

    /// Display value of a corner total.
    pub fn calculate_grand_grand_total_value(&self, total: &BackingValueSet) -> CellValue {
        let value = total.result();
        match self.mode {
            ShowDataAs::Normal | ShowDataAs::RunningTotal => value.clone(),
            _ => ratio(value, Some(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        rows: Vec<PivotHeader>,
        columns: Vec<PivotHeader>,
        matrix: BodyMatrix,
        row_totals: AxisTotals,
        column_totals: AxisTotals,
        corner: CornerTotals,
    }

    fn finished(value: f64) -> BackingValueSet {
        let mut set = BackingValueSet::raw(vec![CellValue::Number(value)]);
        set.calculate(crate::definition::AggregationType::Sum, &mut crate::functions::AggregationEngine::new())
            .unwrap();
        set.show_value = true;
        set
    }

    fn totals(values: &[Option<f64>]) -> AxisTotals {
        AxisTotals {
            totals: values
                .iter()
                .map(|v| std::iter::once(v.map(finished)).collect())
                .collect(),
        }
    }

    /// 2x2 body [[10, 30], [20, 40]], one data field, grand totals on both axes.
    fn fixture() -> Fixture {
        let rows = vec![
            PivotHeader::leaf(0, None),
            PivotHeader::leaf(1, None),
            PivotHeader::grand_total(2),
        ];
        let columns = vec![
            PivotHeader::leaf(0, None),
            PivotHeader::leaf(1, None),
            PivotHeader::grand_total(2),
        ];
        let mut matrix = BodyMatrix::new(3, 3);
        matrix.set(0, 0, Some(finished(10.0)));
        matrix.set(0, 1, Some(finished(30.0)));
        matrix.set(1, 0, Some(finished(20.0)));
        matrix.set(1, 1, Some(finished(40.0)));

        Fixture {
            rows,
            columns,
            matrix,
            row_totals: totals(&[Some(40.0), Some(60.0), None]),
            column_totals: totals(&[Some(30.0), Some(70.0), None]),
            corner: CornerTotals {
                totals: std::iter::once(Some(finished(100.0))).collect(),
            },
        }
    }

    impl Fixture {
        fn context(&self) -> ShowDataAsContext<'_> {
            ShowDataAsContext {
                rows: &self.rows,
                columns: &self.columns,
                matrix: &self.matrix,
                row_totals: &self.row_totals,
                column_totals: &self.column_totals,
                corner: &self.corner,
            }
        }
    }

    fn body(mode: ShowDataAs, row: usize, column: usize) -> CellValue {
        let f = fixture();
        ShowDataAsCalculator::for_mode(mode).calculate_body_value(row, column, &f.context())
    }

    #[test]
    fn body_ratios() {
        assert_eq!(body(ShowDataAs::Normal, 0, 1), CellValue::Number(30.0));
        assert_eq!(body(ShowDataAs::PercentOfTotal, 0, 1), CellValue::Number(0.3));
        assert_eq!(body(ShowDataAs::PercentOfRow, 0, 0), CellValue::Number(0.25));
        assert_eq!(body(ShowDataAs::PercentOfColumn, 1, 1), CellValue::Number(40.0 / 70.0));
        // 10 * 100 / (40 * 30)
        assert_eq!(body(ShowDataAs::Index, 0, 0), CellValue::Number(1000.0 / 1200.0));
    }

    #[test]
    fn running_totals_accumulate_down_rows() {
        assert_eq!(body(ShowDataAs::RunningTotal, 0, 1), CellValue::Number(30.0));
        assert_eq!(body(ShowDataAs::RunningTotal, 1, 1), CellValue::Number(70.0));
        assert_eq!(body(ShowDataAs::PercentOfRunningTotal, 0, 0), CellValue::Number(10.0 / 30.0));
        assert_eq!(body(ShowDataAs::PercentOfRunningTotal, 1, 0), CellValue::Number(1.0));
    }

    #[test]
    fn missing_cells_stay_blank() {
        let mut f = fixture();
        f.matrix.set(1, 1, None);
        let calc = ShowDataAsCalculator::for_mode(ShowDataAs::PercentOfTotal);
        assert_eq!(calc.calculate_body_value(1, 1, &f.context()), CellValue::Empty);
    }

    #[test]
    fn zero_denominator_is_div0() {
        let mut f = fixture();
        f.corner = CornerTotals {
            totals: std::iter::once(Some(finished(0.0))).collect(),
        };
        let calc = ShowDataAsCalculator::for_mode(ShowDataAs::PercentOfTotal);
        let ctx = f.context();
        assert_eq!(calc.calculate_body_value(0, 0, &ctx), CellValue::Error(CellError::Div0));
        assert_eq!(
            calc.calculate_grand_grand_total_value(f.corner.get(0).unwrap()),
            CellValue::Error(CellError::Div0)
        );
    }

    #[test]
    fn grand_total_values() {
        let f = fixture();
        let ctx = f.context();

        let pct_row = ShowDataAsCalculator::for_mode(ShowDataAs::PercentOfRow);
        assert_eq!(pct_row.calculate_grand_total_value(0, 0, &ctx, true), CellValue::Number(1.0));
        assert_eq!(pct_row.calculate_grand_total_value(1, 0, &ctx, false), CellValue::Number(0.7));

        let pct_col = ShowDataAsCalculator::for_mode(ShowDataAs::PercentOfColumn);
        assert_eq!(pct_col.calculate_grand_total_value(1, 0, &ctx, true), CellValue::Number(0.6));
        assert_eq!(pct_col.calculate_grand_total_value(0, 0, &ctx, false), CellValue::Number(1.0));

        let running = ShowDataAsCalculator::for_mode(ShowDataAs::RunningTotal);
        assert_eq!(running.calculate_grand_total_value(1, 0, &ctx, true), CellValue::Number(100.0));
        assert_eq!(running.calculate_grand_total_value(1, 0, &ctx, false), CellValue::Number(70.0));

        let index = ShowDataAsCalculator::for_mode(ShowDataAs::Index);
        assert_eq!(index.calculate_grand_total_value(0, 0, &ctx, true), CellValue::Number(1.0));
        assert_eq!(index.calculate_grand_total_value(2, 0, &ctx, true), CellValue::Empty);
    }

    #[test]
    fn grand_grand_values() {
        let f = fixture();
        let corner = f.corner.get(0).unwrap();
        let value = |mode| ShowDataAsCalculator::for_mode(mode).calculate_grand_grand_total_value(corner);
        assert_eq!(value(ShowDataAs::Normal), CellValue::Number(100.0));
        assert_eq!(value(ShowDataAs::RunningTotal), CellValue::Number(100.0));
        assert_eq!(value(ShowDataAs::PercentOfTotal), CellValue::Number(1.0));
        assert_eq!(value(ShowDataAs::Index), CellValue::Number(1.0));
    }
}
