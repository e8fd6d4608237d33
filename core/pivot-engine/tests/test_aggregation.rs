//! FILENAME: tests/test_aggregation.rs
//! Aggregation function properties and "no data" versus zero.

use pivot_engine::{
    calculate, compute_pivot, AggregationType, CellError, CellValue, DataField, OutputRegion, PivotCache,
    PivotHeader, PivotTableDefinition,
};

fn mixed() -> Vec<CellValue> {
    vec![
        CellValue::Number(1.0),
        CellValue::Text("x".to_string()),
        CellValue::Empty,
        CellValue::Number(2.0),
    ]
}

#[test]
fn test_count_versus_count_numbers() {
    assert_eq!(calculate(AggregationType::Count, &mixed()), CellValue::Number(3.0));
    assert_eq!(calculate(AggregationType::CountNumbers, &mixed()), CellValue::Number(2.0));
}

#[test]
fn test_sum_ignores_non_numbers() {
    assert_eq!(calculate(AggregationType::Sum, &mixed()), CellValue::Number(3.0));
    assert_eq!(calculate(AggregationType::Average, &mixed()), CellValue::Number(1.5));
    assert_eq!(calculate(AggregationType::Product, &mixed()), CellValue::Number(2.0));
}

#[test]
fn test_empty_list_is_blank_not_zero() {
    for function in AggregationType::ALL {
        assert_eq!(calculate(function, &[]), CellValue::Empty, "{function}");
    }
}

#[test]
fn test_deviation_needs_two_values() {
    let one = [CellValue::Number(4.0)];
    assert_eq!(calculate(AggregationType::StdDev, &one), CellValue::Error(CellError::Div0));
    assert_eq!(calculate(AggregationType::VarP, &one), CellValue::Number(0.0));
}

#[test]
fn test_unknown_function_name() {
    assert!("median".parse::<AggregationType>().is_err());
}

/// Regions A, B, C on rows; products X, Y, Z on columns. Every region sells
/// X, sells Y at zero, and never sells Z.
#[test]
fn test_no_data_column_is_skipped_zero_column_counts() {
    let mut cache = PivotCache::new(&["Region", "Product", "Amount"]);
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (i, region) in ["A", "B", "C"].into_iter().enumerate() {
        x.push(cache.record_count());
        cache.add_record(&[region.into(), "X".into(), CellValue::Number((i + 1) as f64)]);
        y.push(cache.record_count());
        cache.add_record(&[region.into(), "Y".into(), CellValue::Number(0.0)]);
    }

    let rows: Vec<PivotHeader> = (0..3)
        .map(|r| PivotHeader::leaf(r, Some(vec![x[r], y[r]])))
        .chain(std::iter::once(PivotHeader::grand_total(3)))
        .collect();
    let columns = vec![
        PivotHeader::leaf(0, Some(x.clone())),
        PivotHeader::leaf(1, Some(y.clone())),
        PivotHeader::leaf(2, Some(Vec::new())),
        PivotHeader::grand_total(3),
    ];

    let mut definition = PivotTableDefinition::new("NoData");
    definition
        .data_fields
        .push(DataField::new(2, "Sum of Amount", AggregationType::Sum));

    let output = compute_pivot(&definition, &mut cache, &rows, &columns).unwrap();
    let value = |row, col| output.get(row, col).map(|c| c.value.clone());

    // Z never appears in the body
    assert!((0..3).all(|r| output.get(r, 2).is_none()));
    // Y shows zeros, not blanks
    assert_eq!(value(0, 1), Some(CellValue::Number(0.0)));

    // column totals: X sums, Y is zero, Z has no total at all
    assert_eq!(value(3, 0), Some(CellValue::Number(6.0)));
    assert_eq!(value(3, 1), Some(CellValue::Number(0.0)));
    assert_eq!(value(3, 2), None);

    // row totals are unaffected by the empty column
    assert_eq!(value(1, 3), Some(CellValue::Number(2.0)));
    assert_eq!(value(3, 3), Some(CellValue::Number(6.0)));

    assert_eq!(output.region(OutputRegion::ColumnGrandTotal).count(), 2);
}

#[test]
fn test_count_total_counts_records_not_cells() {
    let mut cache = PivotCache::new(&["Region", "Amount"]);
    cache.add_record(&["A".into(), 1.0.into()]);
    cache.add_record(&["A".into(), 2.0.into()]);
    cache.add_record(&["B".into(), 3.0.into()]);

    let mut definition = PivotTableDefinition::new("Counts");
    definition
        .data_fields
        .push(DataField::new(1, "Count of Amount", AggregationType::Count));
    let rows = vec![
        PivotHeader::leaf(0, Some(vec![0, 1])),
        PivotHeader::leaf(1, Some(vec![2])),
        PivotHeader::grand_total(2),
    ];
    let columns = vec![PivotHeader::leaf(0, None), PivotHeader::grand_total(1)];

    let output = compute_pivot(&definition, &mut cache, &rows, &columns).unwrap();
    // the corner counts 3 records, not 2 body cells
    assert_eq!(output.get(2, 1).map(|c| c.value.clone()), Some(CellValue::Number(3.0)));
}
