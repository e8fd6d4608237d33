//! FILENAME: core/pivot-engine/src/body.rs
//! Body matrix construction, cell visibility, and body output.
//!
//! Every (row header, column header) pair that is not a grand total gets
//! one backing value set, built from the records both headers cover. The
//! data field of a cell comes from whichever axis carries the data fields.

use crate::backing::BackingValueSet;
use crate::cache::{CacheRecordSource, PivotCache};
use crate::definition::{AggregationType, DataField, PivotTableDefinition};
use crate::error::PivotResult;
use crate::functions::AggregationEngine;
use crate::header::PivotHeader;
use crate::show_as::{ShowDataAsCalculator, ShowDataAsContext};
use crate::writer::{OutputRegion, PivotOutput};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

// ============================================================================
// BODY MATRIX
// ============================================================================

/// Row-major grid of backing value sets. `None` marks a grand total
/// intersection or an intersection no record contributed to.
#[derive(Debug, Clone, Default)]
pub struct BodyMatrix {
    cells: Vec<Vec<Option<BackingValueSet>>>,
}

impl BodyMatrix {
    pub fn new(row_count: usize, column_count: usize) -> Self {
        BodyMatrix {
            cells: (0..row_count).map(|_| vec![None; column_count]).collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn column_count(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&BackingValueSet> {
        self.cells.get(row)?.get(column)?.as_ref()
    }

    pub fn get_mut(&mut self, row: usize, column: usize) -> Option<&mut BackingValueSet> {
        self.cells.get_mut(row)?.get_mut(column)?.as_mut()
    }

    /// Out-of-range positions are ignored.
    pub fn set(&mut self, row: usize, column: usize, cell: Option<BackingValueSet>) {
        if let Some(slot) = self.cells.get_mut(row).and_then(|r| r.get_mut(column)) {
            *slot = cell;
        }
    }

    /// Populated cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &BackingValueSet)> {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(c, cell)| cell.as_ref().map(|cell| (r, c, cell)))
        })
    }
}

// ============================================================================
// BODY AGGREGATOR
// ============================================================================

pub struct PivotBodyAggregator<'a> {
    definition: &'a PivotTableDefinition,
    cache: &'a PivotCache,
    rows: &'a [PivotHeader],
    columns: &'a [PivotHeader],
    /// Records selected by page fields; `None` when no page field filters.
    page_indices: Option<&'a FxHashSet<usize>>,
}

impl<'a> PivotBodyAggregator<'a> {
    pub fn new(
        definition: &'a PivotTableDefinition,
        cache: &'a PivotCache,
        rows: &'a [PivotHeader],
        columns: &'a [PivotHeader],
        page_indices: Option<&'a FxHashSet<usize>>,
    ) -> Self {
        PivotBodyAggregator {
            definition,
            cache,
            rows,
            columns,
            page_indices,
        }
    }

    fn data_field_slot(&self, row: usize, column: usize) -> usize {
        if self.definition.data_on_rows() {
            self.rows[row].data_field_index
        } else {
            self.columns[column].data_field_index
        }
    }

    /// Function for a cell: a subtotal override on the row header, then on
    /// the column header, then the data field's own.
    fn cell_function(&self, row: usize, column: usize, data_field: &DataField) -> AggregationType {
        self.rows[row]
            .subtotal_function()
            .or_else(|| self.columns[column].subtotal_function())
            .unwrap_or(data_field.function)
    }

    /// Builds and calculates every body cell.
    pub fn build_body_backing_data(&self, engine: &mut AggregationEngine) -> PivotResult<BodyMatrix> {
        let mut matrix = BodyMatrix::new(self.rows.len(), self.columns.len());

        for (r, row) in self.rows.iter().enumerate() {
            if row.is_grand_total {
                continue;
            }
            for (c, column) in self.columns.iter().enumerate() {
                if column.is_grand_total {
                    continue;
                }

                let slot = self.data_field_slot(r, c);
                let data_field = self.definition.data_field(slot)?;
                let Some(mut set) = self.backing_values(row, column, data_field)? else {
                    continue;
                };

                set.data_field_index = slot;
                set.sheet_row = self.definition.location.row + r as u32;
                set.sheet_column = self.definition.location.col + c as u32;
                set.calculate(self.cell_function(r, c, data_field), engine)?;
                set.show_value = self.is_value_shown(r, c);
                matrix.set(r, c, Some(set));
            }
        }
        Ok(matrix)
    }

    /// Values behind one intersection, or `None` when no record contributes.
    fn backing_values(
        &self,
        row: &PivotHeader,
        column: &PivotHeader,
        data_field: &DataField,
    ) -> PivotResult<Option<BackingValueSet>> {
        let cache_field = self.cache.field(data_field.source_index)?;

        let set = if cache_field.is_calculated() {
            // A formula may reference no field at all, so presence is
            // decided by the records, not by the values found.
            if !self.cache.has_matching_records(
                row.record_indices(),
                column.record_indices(),
                self.page_indices,
                true,
            ) {
                return Ok(None);
            }

            let mut field_values = BTreeMap::new();
            for (name, &index) in &cache_field.referenced_fields {
                let values = self.cache.find_matching_values(
                    row.record_indices(),
                    column.record_indices(),
                    self.page_indices,
                    index,
                    true,
                )?;
                field_values.insert(name.clone(), values);
            }
            let formula = cache_field
                .resolved_formula
                .clone()
                .or_else(|| cache_field.formula.clone());
            BackingValueSet::calculated(formula, field_values)
        } else {
            let set = BackingValueSet::raw(self.cache.find_matching_values(
                row.record_indices(),
                column.record_indices(),
                self.page_indices,
                data_field.source_index,
                true,
            )?);
            if set.is_empty() {
                return Ok(None);
            }
            set
        };

        Ok(Some(set))
    }

    /// Whether cell (`row`, `column`) is displayed: leaf intersections and
    /// placeholder rows always are; otherwise the header on the axis that
    /// carries the data fields must show its subtotal.
    pub fn is_value_shown(&self, row: usize, column: usize) -> bool {
        let row_header = &self.rows[row];
        let column_header = &self.columns[column];

        if (row_header.is_leaf_node && column_header.is_leaf_node) || row_header.is_place_holder {
            return true;
        }
        if self.definition.data_on_rows() {
            row_header.shows_subtotal(self.definition)
        } else {
            column_header.shows_subtotal(self.definition)
        }
    }

    /// Transforms every shown cell and appends it to `output`.
    pub fn write_body_values(&self, context: &ShowDataAsContext, output: &mut PivotOutput) -> PivotResult<()> {
        for (r, c, cell) in context.matrix.iter() {
            if !cell.show_value {
                continue;
            }
            let data_field = self.definition.data_field(cell.data_field_index)?;
            let value = ShowDataAsCalculator::for_mode(data_field.show_data_as).calculate_body_value(r, c, context);
            output.push(
                OutputRegion::Body,
                cell.sheet_row,
                cell.sheet_column,
                value,
                data_field.effective_number_format_id(),
            );
        }
        Ok(())
    }
}
