use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use restaurant_enricher::models::{RestaurantRecord, WeatherObservation};
use restaurant_enricher::processors::{
    bucket, EnrichmentJoiner, SpatialBucketer, TieBreak, WeatherDeduplicator,
};

// Points spread over western Europe so several land in each cell
fn create_observations(count: usize) -> Vec<WeatherObservation> {
    let base = NaiveDate::from_ymd_opt(2017, 8, 1).unwrap();
    (0..count)
        .map(|i| {
            let lat = 40.0 + (i % 200) as f64 * 0.07;
            let lng = -5.0 + (i / 200 % 200) as f64 * 0.09;
            let date = base + chrono::Duration::days((i % 31) as i64);
            WeatherObservation::new(lat, lng, 15.0 + (i % 20) as f64, 59.0 + (i % 36) as f64, date)
        })
        .collect()
}

fn create_restaurants(count: usize) -> Vec<RestaurantRecord> {
    (0..count)
        .map(|i| {
            let lat = 40.0 + (i % 150) as f64 * 0.09;
            let lng = -5.0 + (i / 150 % 150) as f64 * 0.11;
            RestaurantRecord::new(format!("r{}", i), None, None, Some(lat), Some(lng))
        })
        .collect()
}

fn benchmark_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("geohash_bucket");
    for precision in [4usize, 6, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(precision), &precision, |b, &p| {
            b.iter(|| bucket(black_box(Some(48.8566)), black_box(Some(2.3522)), p))
        });
    }
    group.finish();
}

fn benchmark_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("weather_dedup");
    for size in [10_000usize, 100_000] {
        let observations = create_observations(size);
        for tie_break in [TieBreak::FirstSeen, TieBreak::EarliestDate] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", tie_break), size),
                &observations,
                |b, observations| {
                    let dedup = WeatherDeduplicator::new(SpatialBucketer::new(4)).with_tie_break(tie_break);
                    b.iter(|| dedup.deduplicate(black_box(observations)))
                },
            );
        }
    }
    group.finish();
}

fn benchmark_join(c: &mut Criterion) {
    let bucketer = SpatialBucketer::new(4);
    let (weather, _) = WeatherDeduplicator::new(bucketer).deduplicate(&create_observations(50_000));
    let restaurants = create_restaurants(20_000);

    c.bench_function("enrichment_join_20k", |b| {
        let joiner = EnrichmentJoiner::new(bucketer);
        b.iter(|| joiner.join(black_box(restaurants.clone()), &weather).unwrap())
    });
}

criterion_group!(benches, benchmark_bucket, benchmark_dedup, benchmark_join);
criterion_main!(benches);
