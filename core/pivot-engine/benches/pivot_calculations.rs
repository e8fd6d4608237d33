use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pivot_engine::{
    calculate, compute_pivot, AggregationType, CellValue, DataField, PivotCache, PivotHeader,
    PivotTableDefinition, ShowDataAs,
};

const CITIES: usize = 50;
const MONTHS: usize = 12;

fn build_cache(records: usize) -> PivotCache {
    let mut cache = PivotCache::new(&["City", "Month", "Total", "Cost"]);
    for i in 0..records {
        cache.add_record(
            &[
                CellValue::Text(format!("City {}", i % CITIES)),
                CellValue::Text(format!("Month {}", i % MONTHS)),
                CellValue::Number((i % 100) as f64),
                CellValue::Number((i % 37) as f64),
            ],
        );
    }
    cache.add_calculated_field("Margin", "=Total-Cost");
    cache
}

/// One leaf header per item plus a trailing grand total.
fn headers(records: usize, items: usize, field: usize) -> Vec<PivotHeader> {
    let mut buckets = vec![Vec::new(); items];
    for i in 0..records {
        buckets[i % items].push(i);
    }
    let mut headers: Vec<PivotHeader> = buckets
        .into_iter()
        .enumerate()
        .map(|(position, indices)| PivotHeader::leaf(position, Some(indices)).with_field(field))
        .collect();
    headers.push(PivotHeader::grand_total(items));
    headers
}

fn bench_aggregation_functions(c: &mut Criterion) {
    let values: Vec<CellValue> = (0..10_000).map(|i| CellValue::Number(i as f64 * 0.5)).collect();

    let mut group = c.benchmark_group("aggregation_functions");
    group.throughput(Throughput::Elements(values.len() as u64));
    for function in [AggregationType::Sum, AggregationType::Average, AggregationType::StdDev] {
        group.bench_with_input(BenchmarkId::from_parameter(function), &values, |b, values| {
            b.iter(|| black_box(calculate(function, values)))
        });
    }
    group.finish();
}

fn bench_pivot_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("pivot_refresh");
    group.sample_size(20);

    for records in [1_000usize, 20_000] {
        let mut cache = build_cache(records);
        let rows = headers(records, CITIES, 0);
        let columns = headers(records, MONTHS, 1);

        let mut plain = PivotTableDefinition::new("Bench");
        plain
            .data_fields
            .push(DataField::new(2, "Sum of Total", AggregationType::Sum));

        let mut percent = plain.clone();
        percent.data_fields[0].show_data_as = ShowDataAs::PercentOfRow;

        let mut calculated = PivotTableDefinition::new("Bench");
        calculated
            .data_fields
            .push(DataField::new(4, "Margin", AggregationType::Sum));

        group.throughput(Throughput::Elements(records as u64));
        for (name, definition) in [("sum", &plain), ("percent_of_row", &percent), ("calculated_field", &calculated)] {
            group.bench_with_input(BenchmarkId::new(name, records), &records, |b, _| {
                b.iter(|| {
                    let output = compute_pivot(definition, &mut cache, &rows, &columns).unwrap();
                    black_box(output);
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_aggregation_functions, bench_pivot_refresh);
criterion_main!(benches);
