//! FILENAME: core/pivot-engine/src/engine.rs
//! Pivot Engine - one refresh pass from headers and cache to written cells.
//!
//! Algorithm:
//! 1. Register cache field names and resolve calculated fields
//! 2. Apply hidden items and page field selections to the cache
//! 3. Build the body matrix (one backing value set per intersection)
//! 4. Accumulate row, column and corner grand totals
//! 5. Apply show-data-as and collect every output cell
//! 6. Flush the collected cells to the writer
//!
//! Steps 1-5 never touch the writer, so a failed pass leaves the sheet as
//! it was.

use crate::body::{BodyMatrix, PivotBodyAggregator};
use crate::cache::{PivotCache, ValueId};
use crate::calculated::configure_calculated_fields;
use crate::definition::{FieldIndex, PivotTableDefinition};
use crate::error::PivotResult;
use crate::functions::AggregationEngine;
use crate::header::PivotHeader;
use crate::show_as::{ShowDataAsCalculator, ShowDataAsContext};
use crate::totals::{AxisTotals, CornerTotals, GrandTotalAccumulator, TotalsAxis};
use crate::writer::{CellWriter, OutputRegion, PivotOutput};
use log::debug;
use rustc_hash::FxHashSet;

// ============================================================================
// PIVOT CALCULATOR
// ============================================================================

/// Owns the per-pass state of one refresh.
pub struct PivotCalculator<'a> {
    definition: &'a PivotTableDefinition,
    cache: &'a mut PivotCache,
    rows: &'a [PivotHeader],
    columns: &'a [PivotHeader],

    /// Name mappings and formula memo; fresh for every calculator.
    engine: AggregationEngine,
}

impl<'a> PivotCalculator<'a> {
    pub fn new(
        definition: &'a PivotTableDefinition,
        cache: &'a mut PivotCache,
        rows: &'a [PivotHeader],
        columns: &'a [PivotHeader],
    ) -> Self {
        PivotCalculator {
            definition,
            cache,
            rows,
            columns,
            engine: AggregationEngine::new(),
        }
    }

    /// Runs steps 1-5 and returns every cell to write.
    pub fn calculate(&mut self) -> PivotResult<PivotOutput> {
        debug!(
            "refreshing pivot table '{}': {} row headers, {} column headers, {} data fields",
            self.definition.name,
            self.rows.len(),
            self.columns.len(),
            self.definition.data_fields.len()
        );

        // Step 1: names and calculated fields
        self.engine.reset();
        self.engine.add_names(self.cache.field_names());
        configure_calculated_fields(self.cache, &mut self.engine)?;
        self.validate_data_fields()?;

        // Step 2: filters
        self.apply_filters()?;
        let page_indices = self.resolve_page_indices()?;

        // Step 3: body
        let cache: &PivotCache = &*self.cache;
        let aggregator = PivotBodyAggregator::new(
            self.definition,
            cache,
            self.rows,
            self.columns,
            page_indices.as_ref(),
        );
        let matrix = aggregator.build_body_backing_data(&mut self.engine)?;

        // Step 4: totals
        let (row_totals, column_totals, corner) =
            accumulate_totals(self.definition, self.rows, self.columns, &matrix, &mut self.engine)?;

        // Step 5: output
        let context = ShowDataAsContext {
            rows: self.rows,
            columns: self.columns,
            matrix: &matrix,
            row_totals: &row_totals,
            column_totals: &column_totals,
            corner: &corner,
        };

        let mut output = PivotOutput::new();
        aggregator.write_body_values(&context, &mut output)?;
        if self.definition.show_row_grand_totals {
            self.write_axis_totals(&row_totals, true, &context, &mut output)?;
        }
        if self.definition.show_column_grand_totals {
            self.write_axis_totals(&column_totals, false, &context, &mut output)?;
        }
        if self.definition.show_row_grand_totals && self.definition.show_column_grand_totals {
            self.write_corner_totals(&corner, &mut output)?;
        }

        debug!(
            "pivot table '{}' computed: {} body cells, {} output cells",
            self.definition.name,
            matrix.iter().count(),
            output.len()
        );
        Ok(output)
    }

    /// Every data field must name an existing cache field, even when no
    /// intersection would read it.
    fn validate_data_fields(&self) -> PivotResult<()> {
        for data_field in &self.definition.data_fields {
            self.cache.field(data_field.source_index)?;
        }
        Ok(())
    }

    /// Applies the hidden items of every field to the cache filter mask.
    fn apply_filters(&mut self) -> PivotResult<()> {
        let mut hidden_items: Vec<(FieldIndex, Vec<ValueId>)> = Vec::new();

        for (index, field) in self.definition.fields.iter().enumerate() {
            if field.hidden_items.is_empty() {
                continue;
            }
            let hidden_ids = self.resolve_hidden_items(index, &field.hidden_items)?;
            if !hidden_ids.is_empty() {
                hidden_items.push((index, hidden_ids));
            }
        }

        self.cache.apply_item_filters(&hidden_items);
        Ok(())
    }

    /// Resolves hidden item labels to value ids. Unknown labels are ignored.
    fn resolve_hidden_items(&self, index: FieldIndex, labels: &[String]) -> PivotResult<Vec<ValueId>> {
        let field = self.cache.field(index)?;
        Ok(labels
            .iter()
            .filter_map(|label| field.items.find_by_label(label))
            .collect())
    }

    /// Records selected by every page field with a selection. `None` when
    /// no page field restricts the table.
    fn resolve_page_indices(&self) -> PivotResult<Option<FxHashSet<usize>>> {
        let mut selected: Option<FxHashSet<usize>> = None;

        for page in &self.definition.page_fields {
            let Some(item) = &page.selected_item else {
                continue;
            };
            let matching = self.cache.records_matching(page.source_index, item)?;
            selected = Some(match selected {
                None => matching,
                Some(current) => current.intersection(&matching).copied().collect(),
            });
        }
        Ok(selected)
    }

    fn write_axis_totals(
        &self,
        totals: &AxisTotals,
        is_row_total: bool,
        context: &ShowDataAsContext,
        output: &mut PivotOutput,
    ) -> PivotResult<()> {
        let region = if is_row_total {
            OutputRegion::RowGrandTotal
        } else {
            OutputRegion::ColumnGrandTotal
        };

        for (index, slots) in totals.totals.iter().enumerate() {
            for (slot, total) in slots.iter().enumerate() {
                let Some(total) = total.as_ref().filter(|t| t.show_value) else {
                    continue;
                };
                let data_field = self.definition.data_field(slot)?;
                let value = ShowDataAsCalculator::for_mode(data_field.show_data_as)
                    .calculate_grand_total_value(index, slot, context, is_row_total);
                output.push(
                    region,
                    total.sheet_row,
                    total.sheet_column,
                    value,
                    data_field.effective_number_format_id(),
                );
            }
        }
        Ok(())
    }

    fn write_corner_totals(&self, corner: &CornerTotals, output: &mut PivotOutput) -> PivotResult<()> {
        for (slot, total) in corner.totals.iter().enumerate() {
            let Some(total) = total else { continue };
            let data_field = self.definition.data_field(slot)?;
            let value = ShowDataAsCalculator::for_mode(data_field.show_data_as).calculate_grand_grand_total_value(total);
            output.push(
                OutputRegion::GrandTotal,
                total.sheet_row,
                total.sheet_column,
                value,
                data_field.effective_number_format_id(),
            );
        }
        Ok(())
    }
}

/// Row totals, column totals and corner totals of one body matrix.
fn accumulate_totals(
    definition: &PivotTableDefinition,
    rows: &[PivotHeader],
    columns: &[PivotHeader],
    matrix: &BodyMatrix,
    engine: &mut AggregationEngine,
) -> PivotResult<(AxisTotals, AxisTotals, CornerTotals)> {
    let data_field_count = definition.data_fields.len();

    let row_axis = GrandTotalAccumulator::new(TotalsAxis::Rows, definition, rows, columns);
    let column_axis = GrandTotalAccumulator::new(TotalsAxis::Columns, definition, rows, columns);

    let mut corner = CornerTotals::new(data_field_count);
    let mut row_totals = row_axis.update_grand_totals(matrix, &mut corner)?;
    // The corner holds each leaf cell once; the column pass would repeat them.
    let mut column_totals = column_axis.update_grand_totals(matrix, &mut CornerTotals::new(data_field_count))?;

    row_axis.finish_totals(&mut row_totals, engine)?;
    column_axis.finish_totals(&mut column_totals, engine)?;
    row_axis.update_grand_grand_totals(&mut corner, engine)?;

    Ok((row_totals, column_totals, corner))
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Computes a pivot table without writing it.
pub fn compute_pivot(
    definition: &PivotTableDefinition,
    cache: &mut PivotCache,
    rows: &[PivotHeader],
    columns: &[PivotHeader],
) -> PivotResult<PivotOutput> {
    PivotCalculator::new(definition, cache, rows, columns).calculate()
}

/// Refreshes a pivot table: computes every cell, then writes them all.
/// On error nothing is written.
pub fn calculate_pivot<W: CellWriter + ?Sized>(
    definition: &PivotTableDefinition,
    cache: &mut PivotCache,
    rows: &[PivotHeader],
    columns: &[PivotHeader],
    writer: &mut W,
) -> PivotResult<PivotOutput> {
    let output = compute_pivot(definition, cache, rows, columns)?;
    output.flush(writer);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AggregationType, DataField, PageField, PivotField};
    use crate::writer::MemorySheet;
    use formula_eval::CellValue;

    fn city_cache() -> PivotCache {
        let mut cache = PivotCache::new(&["Region", "Product", "Sales"]);
        cache.add_record(&["North".into(), "Apples".into(), 100.0.into()]);
        cache.add_record(&["North".into(), "Oranges".into(), 150.0.into()]);
        cache.add_record(&["South".into(), "Apples".into(), 200.0.into()]);
        cache.add_record(&["South".into(), "Oranges".into(), 250.0.into()]);
        cache
    }

    fn sum_of_total() -> PivotTableDefinition {
        let mut def = PivotTableDefinition::new("Sales");
        def.data_fields
            .push(DataField::new(2, "Sum of Sales", AggregationType::Sum));
        def
    }

    /// Region on rows, Product on columns, grand totals on both.
    fn headers() -> (Vec<PivotHeader>, Vec<PivotHeader>) {
        let rows = vec![
            PivotHeader::leaf(0, Some(vec![0, 1])).with_field(0),
            PivotHeader::leaf(1, Some(vec![2, 3])).with_field(0),
            PivotHeader::grand_total(2),
        ];
        let columns = vec![
            PivotHeader::leaf(0, Some(vec![0, 2])).with_field(1),
            PivotHeader::leaf(1, Some(vec![1, 3])).with_field(1),
            PivotHeader::grand_total(2),
        ];
        (rows, columns)
    }

    fn number(sheet: &MemorySheet, row: u32, col: u32) -> Option<f64> {
        sheet.value(row, col).and_then(CellValue::as_number)
    }

    #[test]
    fn test_basic_pivot_calculation() {
        let mut cache = city_cache();
        let definition = sum_of_total();
        let (rows, columns) = headers();
        let mut sheet = MemorySheet::new();

        let output = calculate_pivot(&definition, &mut cache, &rows, &columns, &mut sheet).unwrap();

        assert_eq!(number(&sheet, 0, 0), Some(100.0));
        assert_eq!(number(&sheet, 1, 1), Some(250.0));
        // row totals in the last column
        assert_eq!(number(&sheet, 0, 2), Some(250.0));
        assert_eq!(number(&sheet, 1, 2), Some(450.0));
        // column totals in the last row
        assert_eq!(number(&sheet, 2, 0), Some(300.0));
        assert_eq!(number(&sheet, 2, 1), Some(400.0));
        assert_eq!(number(&sheet, 2, 2), Some(700.0));
        assert_eq!(output.len(), 9);
        assert_eq!(sheet.write_count(), 9);
    }

    #[test]
    fn test_grand_totals_can_be_hidden() {
        let mut cache = city_cache();
        let mut definition = sum_of_total();
        definition.show_row_grand_totals = false;
        let (rows, columns) = headers();

        let output = compute_pivot(&definition, &mut cache, &rows, &columns).unwrap();
        assert_eq!(output.region(OutputRegion::RowGrandTotal).count(), 0);
        assert_eq!(output.region(OutputRegion::ColumnGrandTotal).count(), 2);
        assert_eq!(output.region(OutputRegion::GrandTotal).count(), 0);
    }

    #[test]
    fn test_hidden_items_filter_records() {
        let mut cache = city_cache();
        let mut definition = sum_of_total();
        definition.fields = vec![PivotField::default(), PivotField::default()];
        definition.fields[1].hidden_items = vec!["oranges".to_string()];
        let (rows, columns) = headers();

        let output = compute_pivot(&definition, &mut cache, &rows, &columns).unwrap();
        assert_eq!(output.get(0, 1), None);
        assert_eq!(output.get(0, 2).map(|c| c.value.clone()), Some(CellValue::Number(100.0)));
        assert_eq!(output.get(2, 2).map(|c| c.value.clone()), Some(CellValue::Number(300.0)));
        assert_eq!(cache.filtered_count(), 2);
    }

    #[test]
    fn test_page_field_selection() {
        let mut cache = city_cache();
        let mut definition = sum_of_total();
        definition.page_fields.push(PageField {
            source_index: 0,
            selected_item: Some("South".to_string()),
        });
        let (rows, columns) = headers();

        let output = compute_pivot(&definition, &mut cache, &rows, &columns).unwrap();
        assert!(output.get(0, 0).is_none());
        assert_eq!(output.get(2, 2).map(|c| c.value.clone()), Some(CellValue::Number(450.0)));
    }

    #[test]
    fn test_invalid_source_index_writes_nothing() {
        let mut cache = city_cache();
        let mut definition = sum_of_total();
        definition.data_fields[0].source_index = 7;
        let mut sheet = MemorySheet::new();

        let result = calculate_pivot(&definition, &mut cache, &[], &[], &mut sheet);
        assert!(result.is_err());
        assert!(sheet.is_empty());
    }
}
