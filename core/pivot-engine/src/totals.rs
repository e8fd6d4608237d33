//! FILENAME: core/pivot-engine/src/totals.rs
//! Grand totals along one axis plus the corner (grand-grand) totals.
//!
//! One accumulator serves both axes. For `TotalsAxis::Rows` the major axis
//! is the row sequence: each row gets one total per data field, merged from
//! the leaf columns of that row. `TotalsAxis::Columns` swaps the roles.
//! Merging concatenates backing values, so every total is computed from the
//! raw records it covers rather than from already-aggregated cell results.

use crate::backing::BackingValueSet;
use crate::body::BodyMatrix;
use crate::definition::PivotTableDefinition;
use crate::error::PivotResult;
use crate::functions::AggregationEngine;
use crate::header::PivotHeader;
use smallvec::SmallVec;

/// One slot per data field.
pub type DataFieldSlots = SmallVec<[Option<BackingValueSet>; 4]>;

/// Which axis indexes the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsAxis {
    /// One total per row, summed across columns (the grand total column).
    Rows,
    /// One total per column, summed across rows (the grand total row).
    Columns,
}

/// Totals per major index and data field.
#[derive(Debug, Clone, Default)]
pub struct AxisTotals {
    pub totals: Vec<DataFieldSlots>,
}

impl AxisTotals {
    pub fn get(&self, major: usize, data_field: usize) -> Option<&BackingValueSet> {
        self.totals.get(major)?.get(data_field)?.as_ref()
    }
}

/// Grand-grand totals, one per data field.
#[derive(Debug, Clone, Default)]
pub struct CornerTotals {
    pub totals: DataFieldSlots,
}

impl CornerTotals {
    pub fn new(data_field_count: usize) -> Self {
        CornerTotals {
            totals: empty_slots(data_field_count),
        }
    }

    pub fn get(&self, data_field: usize) -> Option<&BackingValueSet> {
        self.totals.get(data_field)?.as_ref()
    }
}

fn empty_slots(count: usize) -> DataFieldSlots {
    (0..count).map(|_| None).collect()
}

fn merge_into(slot: &mut Option<BackingValueSet>, set: &BackingValueSet) -> PivotResult<()> {
    match slot {
        Some(existing) => existing.merge(set),
        None => {
            *slot = Some(set.start_accumulator());
            Ok(())
        }
    }
}

pub struct GrandTotalAccumulator<'a> {
    axis: TotalsAxis,
    definition: &'a PivotTableDefinition,
    rows: &'a [PivotHeader],
    columns: &'a [PivotHeader],
}

impl<'a> GrandTotalAccumulator<'a> {
    pub fn new(
        axis: TotalsAxis,
        definition: &'a PivotTableDefinition,
        rows: &'a [PivotHeader],
        columns: &'a [PivotHeader],
    ) -> Self {
        GrandTotalAccumulator {
            axis,
            definition,
            rows,
            columns,
        }
    }

    fn major_headers(&self) -> &'a [PivotHeader] {
        match self.axis {
            TotalsAxis::Rows => self.rows,
            TotalsAxis::Columns => self.columns,
        }
    }

    fn minor_headers(&self) -> &'a [PivotHeader] {
        match self.axis {
            TotalsAxis::Rows => self.columns,
            TotalsAxis::Columns => self.rows,
        }
    }

    /// (row, column) of a body cell from (major, minor) indices.
    fn cell_position(&self, major: usize, minor: usize) -> (usize, usize) {
        match self.axis {
            TotalsAxis::Rows => (major, minor),
            TotalsAxis::Columns => (minor, major),
        }
    }

    /// Data field slot of a cell, read from the axis carrying the data fields.
    fn data_field_slot(&self, row: usize, column: usize) -> usize {
        if self.definition.data_on_rows() {
            self.rows[row].data_field_index
        } else {
            self.columns[column].data_field_index
        }
    }

    /// Merges the leaf cells of every major index into per-data-field totals.
    /// Leaf major indices also feed `corner`. Missing cells contribute nothing.
    pub fn update_grand_totals(
        &self,
        matrix: &BodyMatrix,
        corner: &mut CornerTotals,
    ) -> PivotResult<AxisTotals> {
        let data_field_count = self.definition.data_fields.len();
        let majors = self.major_headers();
        let minors = self.minor_headers();
        let mut totals = Vec::with_capacity(majors.len());

        for (major, major_header) in majors.iter().enumerate() {
            let mut scratch = empty_slots(data_field_count);

            if !major_header.is_grand_total {
                for (minor, minor_header) in minors.iter().enumerate() {
                    if !minor_header.is_leaf_node || minor_header.is_grand_total {
                        continue;
                    }

                    let (row, column) = self.cell_position(major, minor);
                    let Some(cell) = matrix.get(row, column) else {
                        continue;
                    };

                    let slot = self.data_field_slot(row, column);
                    if let Some(target) = scratch.get_mut(slot) {
                        merge_into(target, cell)?;
                    }
                }

                if major_header.is_leaf_node {
                    for (target, set) in corner.totals.iter_mut().zip(scratch.iter()) {
                        if let Some(set) = set {
                            merge_into(target, set)?;
                        }
                    }
                }
            }

            for (slot, set) in scratch.iter_mut().enumerate() {
                if let Some(set) = set {
                    set.data_field_index = slot;
                }
            }
            totals.push(scratch);
        }

        Ok(AxisTotals { totals })
    }

    /// Computes every total's result and sheet position. Totals of subtotal
    /// headers whose subtotal is hidden are marked not shown.
    pub fn finish_totals(
        &self,
        axis_totals: &mut AxisTotals,
        engine: &mut AggregationEngine,
    ) -> PivotResult<()> {
        let majors = self.major_headers();
        let (end_row, end_col) = body_end(self.definition, self.rows, self.columns);

        for (major, slots) in axis_totals.totals.iter_mut().enumerate() {
            let header = &majors[major];
            for (slot, set) in slots.iter_mut().enumerate() {
                let Some(set) = set else { continue };
                let data_field = self.definition.data_field(slot)?;
                let function = header.subtotal_function().unwrap_or(data_field.function);
                set.calculate(function, engine)?;
                set.show_value = header.is_leaf_node
                    || header.is_place_holder
                    || header.shows_subtotal(self.definition);

                let offset = trailing_offset(self.definition, slot);
                match self.axis {
                    TotalsAxis::Rows => {
                        set.sheet_row = self.definition.location.row + major as u32;
                        set.sheet_column = if self.definition.data_on_rows() {
                            end_col
                        } else {
                            end_col.saturating_sub(offset)
                        };
                    }
                    TotalsAxis::Columns => {
                        set.sheet_column = self.definition.location.col + major as u32;
                        set.sheet_row = if self.definition.data_on_rows() {
                            end_row.saturating_sub(offset)
                        } else {
                            end_row
                        };
                    }
                }
            }
        }
        Ok(())
    }

    /// Computes the corner results and their sheet positions.
    pub fn update_grand_grand_totals(
        &self,
        corner: &mut CornerTotals,
        engine: &mut AggregationEngine,
    ) -> PivotResult<()> {
        let (end_row, end_col) = body_end(self.definition, self.rows, self.columns);

        for (slot, set) in corner.totals.iter_mut().enumerate() {
            let Some(set) = set else { continue };
            let data_field = self.definition.data_field(slot)?;
            set.data_field_index = slot;
            set.calculate(data_field.function, engine)?;
            set.show_value = true;

            let offset = trailing_offset(self.definition, slot);
            if self.definition.data_on_rows() {
                set.sheet_row = end_row.saturating_sub(offset);
                set.sheet_column = end_col;
            } else {
                set.sheet_row = end_row;
                set.sheet_column = end_col.saturating_sub(offset);
            }
        }
        Ok(())
    }
}

/// Last sheet row and column of the body, grand total headers included.
pub fn body_end(
    definition: &PivotTableDefinition,
    rows: &[PivotHeader],
    columns: &[PivotHeader],
) -> (u32, u32) {
    let location = definition.location;
    (
        location.row + rows.len().saturating_sub(1) as u32,
        location.col + columns.len().saturating_sub(1) as u32,
    )
}

/// Distance of data field `slot`'s total from the last row/column.
fn trailing_offset(definition: &PivotTableDefinition, slot: usize) -> u32 {
    let count = definition.data_fields.len();
    count.saturating_sub(1).saturating_sub(slot) as u32
}
