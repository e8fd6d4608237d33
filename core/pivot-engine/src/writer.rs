//! FILENAME: core/pivot-engine/src/writer.rs
//! Pivot output - computed cells and the worksheet sink they are flushed to.
//!
//! A refresh collects every cell into a `PivotOutput` first. Nothing reaches
//! the `CellWriter` until the whole pass has succeeded.

use formula_eval::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SINK
// ============================================================================

/// Receives finished pivot cells.
pub trait CellWriter {
    fn write_cell(&mut self, row: u32, col: u32, value: &CellValue, number_format_id: u32);
}

impl<F> CellWriter for F
where
    F: FnMut(u32, u32, &CellValue, u32),
{
    fn write_cell(&mut self, row: u32, col: u32, value: &CellValue, number_format_id: u32) {
        self(row, col, value, number_format_id)
    }
}

// ============================================================================
// OUTPUT CELLS
// ============================================================================

/// Which part of the pivot table a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputRegion {
    /// Body cell (leaf value or shown subtotal).
    Body,
    /// Grand total column: one total per row.
    RowGrandTotal,
    /// Grand total row: one total per column.
    ColumnGrandTotal,
    /// Intersection of both grand totals.
    GrandTotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputCell {
    pub region: OutputRegion,
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    pub number_format_id: u32,
}

/// Every cell produced by one refresh, in write order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotOutput {
    cells: Vec<OutputCell>,
}

impl PivotOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: OutputRegion, row: u32, col: u32, value: CellValue, number_format_id: u32) {
        self.cells.push(OutputCell {
            region,
            row,
            col,
            value,
            number_format_id,
        });
    }

    pub fn cells(&self) -> &[OutputCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Last cell written at (`row`, `col`).
    pub fn get(&self, row: u32, col: u32) -> Option<&OutputCell> {
        self.cells.iter().rev().find(|c| c.row == row && c.col == col)
    }

    pub fn region(&self, region: OutputRegion) -> impl Iterator<Item = &OutputCell> {
        self.cells.iter().filter(move |c| c.region == region)
    }

    /// Hands every cell to `writer`, in order.
    pub fn flush<W: CellWriter + ?Sized>(&self, writer: &mut W) {
        for cell in &self.cells {
            writer.write_cell(cell.row, cell.col, &cell.value, cell.number_format_id);
        }
    }
}

// ============================================================================
// IN-MEMORY SHEET
// ============================================================================

/// A sparse sheet that records what was written to it.
#[derive(Debug, Clone, Default)]
pub struct MemorySheet {
    cells: BTreeMap<(u32, u32), (CellValue, u32)>,
    writes: usize,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells.get(&(row, col)).map(|(v, _)| v)
    }

    pub fn number_format(&self, row: u32, col: u32) -> Option<u32> {
        self.cells.get(&(row, col)).map(|&(_, f)| f)
    }

    /// Number of distinct cells written.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of `write_cell` calls received.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl CellWriter for MemorySheet {
    fn write_cell(&mut self, row: u32, col: u32, value: &CellValue, number_format_id: u32) {
        self.writes += 1;
        self.cells.insert((row, col), (value.clone(), number_format_id));
    }
}
