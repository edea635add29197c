use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chrono::NaiveDate;
use modis_processor::models::{
    CadenceGroup, ImageBands, ObservationRecord, ObservationSeries, PixelGrid, ProductDescriptor,
    Variable,
};
use modis_processor::processors::{MonthlyAggregator, QualityMaskEvaluator};
use modis_processor::raster::{CoverageTolerance, GridReducer, RasterStatistics, Region};
use modis_processor::utils::coordinates::dms_to_decimal;
use std::collections::BTreeMap;

// Composite series with a gap every seventh record
fn create_test_series(group: CadenceGroup, composites: usize) -> ObservationSeries {
    let mut series = ObservationSeries::new("BENCH", group);
    let base_date = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
    let step = match group {
        CadenceGroup::SixteenDay => 16,
        CadenceGroup::EightDay => 8,
    };

    for i in 0..composites {
        let date = base_date + chrono::Duration::days((i * step) as i64);
        let values: BTreeMap<Variable, Option<f64>> = group
            .variables()
            .iter()
            .enumerate()
            .map(|(j, v)| {
                let value = (i % 7 != 0).then(|| 0.1 + ((i + j) % 10) as f64 * 0.05);
                (*v, value)
            })
            .collect();
        series.records.push(ObservationRecord::new("BENCH", date, values));
    }
    series
}

fn benchmark_quality_mask(c: &mut Criterion) {
    let evaluator = QualityMaskEvaluator::for_product(&ProductDescriptor::vegetation_index());
    let flags: Vec<Option<i32>> = (0..10_000)
        .map(|i| match i % 5 {
            0 => None,
            1 => Some(-1),
            n => Some(n - 2),
        })
        .collect();

    c.bench_function("quality_mask_evaluate", |b| {
        b.iter(|| {
            let outcome = evaluator.evaluate(black_box(&flags));
            black_box(outcome.accepted)
        })
    });
}

fn benchmark_region_reduction(c: &mut Criterion) {
    let grid = PixelGrid::centred_on(36.6833, 3.2167, 0.0045, 41);
    let mut image = ImageBands::new(NaiveDate::from_ymd_opt(2001, 6, 10).unwrap(), grid);
    let values: Vec<Option<f64>> = (0..grid.len())
        .map(|i| (i % 11 != 0).then(|| 0.3 + (i % 13) as f64 * 0.01))
        .collect();
    image.insert(Variable::Ndvi, values.clone());
    image.insert(Variable::Evi, values);

    let region = Region::new(36.6833, 3.2167, 5000.0);
    let reducer = GridReducer::new();

    c.bench_function("region_mean_reduction", |b| {
        b.iter(|| {
            let means = reducer
                .reduce_region_mean(&image, &region, 500.0, CoverageTolerance::Partial)
                .unwrap();
            black_box(means.len())
        })
    });
}

fn benchmark_monthly_aggregation(c: &mut Criterion) {
    let sixteen_day = create_test_series(CadenceGroup::SixteenDay, 460);
    let eight_day = create_test_series(CadenceGroup::EightDay, 920);

    c.bench_function("monthly_aggregation", |b| {
        b.iter(|| {
            let aggregation = MonthlyAggregator::new()
                .aggregate(&[&sixteen_day, &eight_day])
                .unwrap();
            black_box(aggregation.records.len())
        })
    });

    let monthly = MonthlyAggregator::new()
        .aggregate(&[&sixteen_day, &eight_day])
        .unwrap()
        .records;

    c.bench_function("monthly_reaggregation", |b| {
        b.iter(|| {
            let aggregation = MonthlyAggregator::new().reaggregate(&monthly).unwrap();
            black_box(aggregation.records.len())
        })
    });
}

fn benchmark_coordinate_conversion(c: &mut Criterion) {
    let dms_coordinates = vec!["36:40:60", "03:13:00", "31:37:12", "-02:13:48", "35:37:52"];

    c.bench_function("coordinate_conversion", |b| {
        b.iter(|| {
            let mut results = Vec::new();
            for dms in &dms_coordinates {
                if let Ok(decimal) = dms_to_decimal(dms) {
                    results.push(decimal);
                }
            }
            black_box(results.len())
        })
    });
}

fn benchmark_varying_record_lengths(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation_by_record_length");

    for &years in &[1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("years", years), &years, |b, &years| {
            let sixteen_day = create_test_series(CadenceGroup::SixteenDay, years * 23);
            let eight_day = create_test_series(CadenceGroup::EightDay, years * 46);

            b.iter(|| {
                let aggregation = MonthlyAggregator::new()
                    .aggregate(&[&sixteen_day, &eight_day])
                    .unwrap();
                black_box(aggregation.records.len())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_quality_mask,
    benchmark_region_reduction,
    benchmark_monthly_aggregation,
    benchmark_coordinate_conversion,
    benchmark_varying_record_lengths
);
criterion_main!(benches);
