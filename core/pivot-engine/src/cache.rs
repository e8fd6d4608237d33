//! FILENAME: core/pivot-engine/src/cache.rs
//! PURPOSE: Source records for a pivot table, stored as item ids.
//! CONTEXT: Every distinct value of a field is kept once in that field's
//! item list and records refer to items by id. Calculated fields are cache
//! fields that carry a formula and store nothing. Hidden items are applied
//! as a per-record inclusion mask.
//!
//! Record lookups go through `CacheRecordSource`, which intersects the row,
//! column and page record filters of one body cell and returns the
//! contributing raw values in record order.

use crate::definition::FieldIndex;
use crate::error::{PivotError, PivotResult};
use formula_eval::{CellError, CellValue};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

// ============================================================================
// ITEMS
// ============================================================================

/// Position of a distinct value in its field's item list.
pub type ValueId = u32;

/// Id stored for a blank value. Blanks never enter the item list.
pub const VALUE_ID_EMPTY: ValueId = u32::MAX;

static EMPTY_ITEM: CacheValue = CacheValue::Empty;

/// Hashable form of a raw value; the interning key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheValue {
    Empty,
    Number(NumberKey),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl From<&CellValue> for CacheValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => CacheValue::Empty,
            CellValue::Number(n) => CacheValue::Number(NumberKey::new(*n)),
            CellValue::Text(s) => CacheValue::Text(s.clone()),
            CellValue::Boolean(b) => CacheValue::Boolean(*b),
            CellValue::Error(e) => CacheValue::Error(*e),
        }
    }
}

impl CacheValue {
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            CacheValue::Empty => CellValue::Empty,
            CacheValue::Number(n) => CellValue::Number(n.get()),
            CacheValue::Text(s) => CellValue::Text(s.clone()),
            CacheValue::Boolean(b) => CellValue::Boolean(*b),
            CacheValue::Error(e) => CellValue::Error(*e),
        }
    }
}

/// A number compared by its canonical bit pattern: all NaNs are one key
/// and `-0.0` folds into `0.0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NumberKey(f64);

impl NumberKey {
    pub fn new(n: f64) -> Self {
        NumberKey(n)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    fn canonical_bits(self) -> u64 {
        match self.0 {
            n if n.is_nan() => f64::NAN.to_bits(),
            n if n == 0.0 => 0,
            n => n.to_bits(),
        }
    }
}

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for NumberKey {}

impl Hash for NumberKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

/// Distinct non-blank values of one field, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FieldItems {
    ids: FxHashMap<CacheValue, ValueId>,
    values: Vec<CacheValue>,
}

impl FieldItems {
    pub fn new() -> Self {
        FieldItems::default()
    }

    /// Returns the id of `value`, adding it on first sight.
    pub fn intern(&mut self, value: CacheValue) -> ValueId {
        if value == CacheValue::Empty {
            return VALUE_ID_EMPTY;
        }
        let next = self.values.len() as ValueId;
        match self.ids.entry(value) {
            Entry::Occupied(slot) => *slot.get(),
            Entry::Vacant(slot) => {
                self.values.push(slot.key().clone());
                slot.insert(next);
                next
            }
        }
    }

    pub fn value(&self, id: ValueId) -> Option<&CacheValue> {
        if id == VALUE_ID_EMPTY {
            Some(&EMPTY_ITEM)
        } else {
            self.values.get(id as usize)
        }
    }

    /// Finds the item whose display text matches `label` (case-insensitive).
    pub fn find_by_label(&self, label: &str) -> Option<ValueId> {
        self.values
            .iter()
            .position(|v| v.to_cell_value().display_value().eq_ignore_ascii_case(label))
            .map(|i| i as ValueId)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One column of the cached record set.
#[derive(Debug, Clone)]
pub struct CacheField {
    pub name: String,

    /// Non-empty for calculated fields.
    pub formula: Option<String>,

    /// Formula with every calculated reference inlined and every field name
    /// quoted. Set by `configure_calculated_fields`.
    pub resolved_formula: Option<String>,

    /// Every non-calculated field the formula depends on, transitively.
    pub referenced_fields: BTreeMap<String, FieldIndex>,

    pub items: FieldItems,
}

impl CacheField {
    pub fn new(name: &str) -> Self {
        CacheField {
            name: name.to_string(),
            formula: None,
            resolved_formula: None,
            referenced_fields: BTreeMap::new(),
            items: FieldItems::new(),
        }
    }

    pub fn is_calculated(&self) -> bool {
        self.formula.as_deref().is_some_and(|f| !f.trim().is_empty())
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One source row as item ids, one per cache field.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub values: SmallVec<[ValueId; 8]>,
}

// ============================================================================
// RECORD SOURCE
// ============================================================================

/// Record access used by the body aggregator.
pub trait CacheRecordSource {
    /// Returns the non-blank values of `source_index` over the records in
    /// both `row_indices` and `column_indices` (`None` = no restriction on
    /// that axis) that also satisfy `items_matcher`. Record order is kept.
    fn get_data_field_values(
        &self,
        row_indices: Option<&[usize]>,
        column_indices: Option<&[usize]>,
        source_index: FieldIndex,
        items_matcher: Option<&dyn Fn(usize) -> bool>,
    ) -> PivotResult<Vec<CellValue>>;

    /// Whether a record survives the current item filters.
    fn is_record_included(&self, record: usize) -> bool;

    /// Like `get_data_field_values`, additionally restricted to the records
    /// selected by page fields and, if requested, to records not hidden by
    /// item filters.
    fn find_matching_values(
        &self,
        row_indices: Option<&[usize]>,
        column_indices: Option<&[usize]>,
        page_indices: Option<&FxHashSet<usize>>,
        source_index: FieldIndex,
        apply_item_filters: bool,
    ) -> PivotResult<Vec<CellValue>> {
        if page_indices.is_none() && !apply_item_filters {
            return self.get_data_field_values(row_indices, column_indices, source_index, None);
        }

        let matcher: &dyn Fn(usize) -> bool = &|record| {
            page_indices.map_or(true, |pages| pages.contains(&record))
                && (!apply_item_filters || self.is_record_included(record))
        };
        self.get_data_field_values(row_indices, column_indices, source_index, Some(matcher))
    }
}

/// Records present in both filters, in row filter order.
pub fn intersect_record_indices(
    row_indices: Option<&[usize]>,
    column_indices: Option<&[usize]>,
    record_count: usize,
) -> Vec<usize> {
    match (row_indices, column_indices) {
        (None, None) => (0..record_count).collect(),
        (Some(rows), None) => rows.to_vec(),
        (None, Some(columns)) => columns.to_vec(),
        (Some(rows), Some(columns)) => {
            let lookup: FxHashSet<usize> = columns.iter().copied().collect();
            rows.iter().copied().filter(|i| lookup.contains(i)).collect()
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PivotCache {
    pub fields: Vec<CacheField>,
    pub records: Vec<CacheRecord>,

    /// Which records pass the current item filters (true = included).
    pub filter_mask: Vec<bool>,
}

impl PivotCache {
    /// Creates an empty cache with one stored field per name.
    pub fn new<S: AsRef<str>>(field_names: &[S]) -> Self {
        PivotCache {
            fields: field_names.iter().map(|n| CacheField::new(n.as_ref())).collect(),
            records: Vec::new(),
            filter_mask: Vec::new(),
        }
    }

    /// Adds a record. Values are in field order; missing trailing values
    /// and calculated fields are stored as empty.
    pub fn add_record(&mut self, values: &[CellValue]) {
        let mut interned = SmallVec::with_capacity(self.fields.len());

        for (i, field) in self.fields.iter_mut().enumerate() {
            let id = match values.get(i) {
                Some(value) if !field.is_calculated() => field.items.intern(CacheValue::from(value)),
                _ => VALUE_ID_EMPTY,
            };
            interned.push(id);
        }

        self.records.push(CacheRecord { values: interned });
        self.filter_mask.push(true);
    }

    /// Adds a calculated field and returns its index.
    pub fn add_calculated_field(&mut self, name: &str, formula: &str) -> FieldIndex {
        let mut field = CacheField::new(name);
        field.formula = Some(formula.to_string());
        self.fields.push(field);

        for record in &mut self.records {
            record.values.push(VALUE_ID_EMPTY);
        }
        self.fields.len() - 1
    }

    pub fn field(&self, index: FieldIndex) -> PivotResult<&CacheField> {
        self.fields.get(index).ok_or(PivotError::InvalidCacheField {
            index,
            count: self.fields.len(),
        })
    }

    /// Case-insensitive lookup of a field by name.
    pub fn field_index(&self, name: &str) -> Option<FieldIndex> {
        let upper = name.to_uppercase();
        self.fields.iter().position(|f| f.name.to_uppercase() == upper)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn has_calculated_fields(&self) -> bool {
        self.fields.iter().any(|f| f.is_calculated())
    }

    /// Raw value of one record in one field.
    pub fn record_value(&self, record: usize, field: FieldIndex) -> CellValue {
        self.records
            .get(record)
            .and_then(|r| r.values.get(field))
            .and_then(|&id| self.fields.get(field).and_then(|f| f.items.value(id)))
            .map(CacheValue::to_cell_value)
            .unwrap_or(CellValue::Empty)
    }

    /// Rebuilds the filter mask: a record is included unless one of its
    /// values is among the hidden ids of that field.
    pub fn apply_item_filters(&mut self, hidden_items: &[(FieldIndex, Vec<ValueId>)]) {
        let field_count = self.fields.len();
        let active: Vec<&(FieldIndex, Vec<ValueId>)> = hidden_items
            .iter()
            .filter(|(field, hidden)| !hidden.is_empty() && *field < field_count)
            .collect();

        self.filter_mask = self
            .records
            .iter()
            .map(|record| {
                active.iter().all(|(field, hidden)| {
                    let id = record.values.get(*field).copied().unwrap_or(VALUE_ID_EMPTY);
                    !hidden.contains(&id)
                })
            })
            .collect();
    }

    /// Records whose value in `field` displays as `label`.
    pub fn records_matching(&self, field: FieldIndex, label: &str) -> PivotResult<FxHashSet<usize>> {
        let cache_field = self.field(field)?;
        let Some(id) = cache_field.items.find_by_label(label) else {
            return Ok(FxHashSet::default());
        };

        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.values.get(field) == Some(&id))
            .map(|(i, _)| i)
            .collect())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Whether any record lies in both filters, is selected by the page
    /// fields, and (if requested) survives the item filters.
    pub fn has_matching_records(
        &self,
        row_indices: Option<&[usize]>,
        column_indices: Option<&[usize]>,
        page_indices: Option<&FxHashSet<usize>>,
        apply_item_filters: bool,
    ) -> bool {
        intersect_record_indices(row_indices, column_indices, self.record_count())
            .into_iter()
            .any(|record| {
                page_indices.map_or(true, |pages| pages.contains(&record))
                    && (!apply_item_filters || self.is_record_included(record))
            })
    }

    pub fn filtered_count(&self) -> usize {
        self.filter_mask.iter().filter(|&&x| x).count()
    }
}

impl CacheRecordSource for PivotCache {
    fn get_data_field_values(
        &self,
        row_indices: Option<&[usize]>,
        column_indices: Option<&[usize]>,
        source_index: FieldIndex,
        items_matcher: Option<&dyn Fn(usize) -> bool>,
    ) -> PivotResult<Vec<CellValue>> {
        let field = self.field(source_index)?;
        if field.is_calculated() {
            return Err(PivotError::CalculatedFieldValues(field.name.clone()));
        }

        let records = intersect_record_indices(row_indices, column_indices, self.records.len());
        let values = records
            .into_iter()
            .filter(|&record| items_matcher.map_or(true, |matches| matches(record)))
            .map(|record| self.record_value(record, source_index))
            .filter(|value| !value.is_empty())
            .collect();

        Ok(values)
    }

    fn is_record_included(&self, record: usize) -> bool {
        self.filter_mask.get(record).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cache() -> PivotCache {
        let mut cache = PivotCache::new(&["City", "Month", "Total"]);
        cache.add_record(&["Chicago".into(), "January".into(), 100.0.into()]);
        cache.add_record(&["Chicago".into(), "January".into(), 50.0.into()]);
        cache.add_record(&["Nashville".into(), "February".into(), 30.0.into()]);
        cache.add_record(&["Nashville".into(), "January".into(), CellValue::Empty]);
        cache
    }

    #[test]
    fn values_are_interned_per_field() {
        let cache = sample_cache();
        assert_eq!(cache.fields[0].items.len(), 2);
        assert_eq!(cache.fields[2].items.len(), 3);
        assert_eq!(cache.records[0].values[0], cache.records[1].values[0]);
        assert_eq!(cache.records[3].values[2], VALUE_ID_EMPTY);
    }

    #[test]
    fn intersection_keeps_record_order() {
        let rows = [0, 1, 3];
        let columns = [3, 1, 0, 2];
        assert_eq!(intersect_record_indices(Some(&rows[..]), Some(&columns[..]), 4), vec![0, 1, 3]);
        assert_eq!(intersect_record_indices(Some(&columns[..]), Some(&rows[..]), 4), vec![3, 1, 0]);
        assert_eq!(intersect_record_indices(None, None, 3), vec![0, 1, 2]);
        assert_eq!(intersect_record_indices(None, Some(&[2, 0][..]), 3), vec![2, 0]);
    }

    #[test]
    fn data_field_values_skip_blanks() {
        let cache = sample_cache();
        let chicago = [0, 1];
        let january = [0, 1, 3];
        let values = cache
            .get_data_field_values(Some(&chicago[..]), Some(&january[..]), 2, None)
            .unwrap();
        assert_eq!(values, vec![CellValue::Number(100.0), CellValue::Number(50.0)]);

        let nashville_jan = cache
            .get_data_field_values(Some(&[2, 3][..]), Some(&january[..]), 2, None)
            .unwrap();
        assert!(nashville_jan.is_empty());
    }

    #[test]
    fn matching_records_ignore_blank_values() {
        let mut cache = sample_cache();
        let (chicago, nashville) = ([0, 1], [2, 3]);
        let (january, february) = ([0, 1, 3], [2]);
        // record 3 has no Total but still intersects
        assert!(cache.has_matching_records(Some(&nashville[..]), Some(&january[..]), None, true));
        assert!(!cache.has_matching_records(Some(&chicago[..]), Some(&february[..]), None, true));

        let hidden = cache.fields[0].items.find_by_label("Nashville").unwrap();
        cache.apply_item_filters(&[(0, vec![hidden])]);
        assert!(!cache.has_matching_records(Some(&nashville[..]), Some(&january[..]), None, true));
        assert!(cache.has_matching_records(Some(&nashville[..]), Some(&january[..]), None, false));

        let february_pages = cache.records_matching(1, "February").unwrap();
        assert!(!cache.has_matching_records(
            Some(&nashville[..]),
            Some(&january[..]),
            Some(&february_pages),
            false
        ));
    }

    #[test]
    fn invalid_and_calculated_fields_are_errors() {
        let mut cache = sample_cache();
        assert!(matches!(
            cache.get_data_field_values(None, None, 9, None),
            Err(PivotError::InvalidCacheField { index: 9, count: 3 })
        ));

        let calc = cache.add_calculated_field("Double", "=Total*2");
        assert_eq!(cache.records[0].values.len(), 4);
        assert!(matches!(
            cache.get_data_field_values(None, None, calc, None),
            Err(PivotError::CalculatedFieldValues(ref name)) if name == "Double"
        ));
    }

    #[test]
    fn item_filters_and_pages_restrict_matches() {
        let mut cache = sample_cache();
        let chicago = cache.fields[0].items.find_by_label("chicago").unwrap();
        cache.apply_item_filters(&[(0, vec![chicago])]);
        assert_eq!(cache.filtered_count(), 2);

        let all = cache.find_matching_values(None, None, None, 2, false).unwrap();
        assert_eq!(all.len(), 3);
        let visible = cache.find_matching_values(None, None, None, 2, true).unwrap();
        assert_eq!(visible, vec![CellValue::Number(30.0)]);

        cache.apply_item_filters(&[]);
        let january = cache.records_matching(1, "January").unwrap();
        let values = cache.find_matching_values(None, None, Some(&january), 2, true).unwrap();
        assert_eq!(values, vec![CellValue::Number(100.0), CellValue::Number(50.0)]);

        let nothing = cache.records_matching(1, "March").unwrap();
        assert!(cache
            .find_matching_values(None, None, Some(&nothing), 2, true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let cache = sample_cache();
        assert_eq!(cache.field_index("total"), Some(2));
        assert_eq!(cache.field_index("Region"), None);
        assert_eq!(cache.field_names().collect::<Vec<_>>(), vec!["City", "Month", "Total"]);
    }
}
