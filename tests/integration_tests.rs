use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use httptest::matchers::{contains, request, url_decoded};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;
use restaurant_enricher::geocoding::{GeocodeResolver, RateLimiter, RetryPolicy, StaticLookup};
use restaurant_enricher::processors::EnrichmentPipeline;
use restaurant_enricher::utils::constants::{DEFAULT_PARTITION_VALUE, SUCCESS_MARKER};
use restaurant_enricher::writers::{OutputInspector, OutputRow};
use restaurant_enricher::{EnrichError, PipelineConfig};
use serde_json::json;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const RESTAURANTS: &str = "\
id,franchise_id,franchise_name,restaurant_franchise_id,country,city,lat,lng
1,10,Savoria,100,France,Paris,,
2,11,Nowhere Diner,101,,,,
3,12,Harbor Grill,102,US,Boston,42.36,-71.06
4,13,Le Coin,103,France,Paris,48.80,2.30
5,14,Slice,104,US,New York,40.7128,-74.0060
";

struct Fixture {
    _dir: TempDir,
    restaurants: PathBuf,
    weather_root: PathBuf,
    output: PathBuf,
}

fn write_weather(path: &Path, rows: &[(f64, f64, f64, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let schema = Arc::new(Schema::new(vec![
        Field::new("lng", DataType::Float64, true),
        Field::new("lat", DataType::Float64, true),
        Field::new("avg_tmpr_f", DataType::Float64, true),
        Field::new("avg_tmpr_c", DataType::Float64, true),
        Field::new("wthr_date", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.2 * 1.8 + 32.0).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
        ],
    )
    .unwrap();

    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let restaurants = dir.path().join("restaurant_csv");
    fs::create_dir_all(&restaurants).unwrap();
    fs::write(restaurants.join("part-00000.csv"), RESTAURANTS).unwrap();

    let weather_root = dir.path().join("artifacts");
    write_weather(
        &weather_root.join("weather_2016/year=2016/month=10/part-0.parquet"),
        &[
            (48.85, 2.35, 10.0, "2016-10-01"),
            (48.81, 2.31, 20.0, "2016-10-02"),
            (40.71, -74.00, 15.5, "2016-10-01"),
        ],
    );
    write_weather(
        &weather_root.join("weather_2017/year=2017/month=08/part-0.parquet"),
        &[(48.82, 2.32, 30.0, "2017-08-01")],
    );

    Fixture {
        output: dir.path().join("output").join("enriched"),
        restaurants,
        weather_root,
        _dir: dir,
    }
}

fn config(fixture: &Fixture) -> PipelineConfig {
    PipelineConfig {
        restaurant_path: fixture.restaurants.clone(),
        weather_root: fixture.weather_root.clone(),
        output_path: fixture.output.clone(),
        max_workers: 2,
        ..PipelineConfig::default()
    }
}

fn static_pipeline(config: PipelineConfig) -> EnrichmentPipeline {
    let lookup = StaticLookup::new().with_coordinates("Paris, France", 48.8566, 2.3522);
    let resolver = GeocodeResolver::new(Arc::new(lookup), RateLimiter::unlimited(), RetryPolicy::none());
    EnrichmentPipeline::new(config, resolver).unwrap().with_silent(true)
}

fn rows_by_id(output: &Path) -> Vec<OutputRow> {
    let mut rows = OutputInspector::read_rows(output, None).unwrap();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

#[tokio::test]
async fn test_end_to_end_enrichment() {
    let fixture = fixture();
    let report = static_pipeline(config(&fixture)).run().await.unwrap();

    assert_eq!(report.restaurants, 5);
    assert_eq!(report.enriched, 5);
    assert_eq!(report.weather_rows, 4);
    assert_eq!(report.dedup.buckets, 2);
    assert_eq!(report.backfill.missing, 2);
    assert_eq!(report.backfill.resolved, 1);
    assert_eq!(report.backfill.fallback_applied, 1);
    assert_eq!(report.join.matched, 3);
    assert_eq!(report.sample.len(), 5);

    let rows = rows_by_id(&fixture.output);
    assert_eq!(rows.len(), 5);

    // geocoded into u09t; the first u09t observation in shard order wins
    assert_eq!(rows[0].lat, Some(48.8566));
    assert_eq!(rows[0].geohash.as_deref(), Some("u09t"));
    assert_eq!(rows[0].avg_tmpr_c, Some(10.0));
    assert_eq!(rows[0].wthr_date, NaiveDate::from_ymd_opt(2016, 10, 1));

    // no city or country: sentinel coordinates, no weather near (0, 0)
    assert_eq!((rows[1].lat, rows[1].lng), (Some(0.0), Some(0.0)));
    assert_eq!(rows[1].geohash.as_deref(), Some("s000"));
    assert_eq!(rows[1].avg_tmpr_c, None);

    // bucket without weather keeps its fields and gets nulls
    assert_eq!(rows[2].lat, Some(42.36));
    assert_eq!(rows[2].avg_tmpr_c, None);
    assert_eq!(rows[2].avg_tmpr_f, None);
    assert_eq!(rows[2].wthr_date, None);

    assert_eq!(rows[3].avg_tmpr_c, Some(10.0));
    assert_eq!(rows[4].geohash.as_deref(), Some("dr5r"));
    assert_eq!(rows[4].avg_tmpr_c, Some(15.5));

    let info = OutputInspector::inspect(&fixture.output).unwrap();
    assert!(info.complete);
    assert_eq!(info.total_rows, 5);
    assert!(fixture.output.join(SUCCESS_MARKER).is_file());
    assert!(fixture.output.join("geohash=u09t").is_dir());
    assert!(!fixture
        .output
        .join(format!("geohash={}", DEFAULT_PARTITION_VALUE))
        .exists());
}

#[tokio::test]
async fn test_reruns_are_identical() {
    let fixture = fixture();

    static_pipeline(config(&fixture)).run().await.unwrap();
    let first = rows_by_id(&fixture.output);

    static_pipeline(config(&fixture)).run().await.unwrap();
    let second = rows_by_id(&fixture.output);

    assert_eq!(first, second);
    assert_eq!(OutputInspector::inspect(&fixture.output).unwrap().total_rows, 5);
}

#[tokio::test]
async fn test_failed_run_keeps_previous_output() {
    let fixture = fixture();
    static_pipeline(config(&fixture)).run().await.unwrap();
    let before = rows_by_id(&fixture.output);

    let broken = PipelineConfig {
        weather_root: fixture.weather_root.join("missing"),
        ..config(&fixture)
    };
    let err = static_pipeline(broken).run().await.unwrap_err();
    assert!(matches!(err, EnrichError::InputNotFound { .. }));

    assert_eq!(rows_by_id(&fixture.output), before);
}

#[tokio::test]
async fn test_tagged_output_and_earliest_date() {
    let fixture = fixture();
    let mut config = config(&fixture);
    config.tag_unresolved = true;
    config.tie_break = restaurant_enricher::processors::TieBreak::EarliestDate;

    let report = static_pipeline(config).run().await.unwrap();
    assert_eq!(report.join.matched, 3);

    let file = File::open(fixture.output.join("geohash=s000").join("part-00000.parquet")).unwrap();
    let batch = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let sources = batch
        .column_by_name("coord_source")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(sources.value(0), "fallback");

    // earliest date in u09t is 2016-10-01 at 10.0
    let rows = rows_by_id(&fixture.output);
    assert_eq!(rows[0].avg_tmpr_c, Some(10.0));
}

#[tokio::test]
async fn test_http_geocoding_is_memoised() {
    let server = Server::run();
    server.expect(
        Expectation::matching(httptest::all_of![
            request::method_path("GET", "/geocode/v1/json"),
            request::query(url_decoded(contains(("q", "Paris, France")))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "results": [{"geometry": {"lat": 48.8566, "lng": 2.3522}}]
        }))),
    );

    let fixture = fixture();
    // a second restaurant sharing the Paris query
    let extra = format!("{}6,15,Bistro,105,France,Paris,,\n", RESTAURANTS);
    fs::write(fixture.restaurants.join("part-00000.csv"), extra).unwrap();

    let mut config = config(&fixture);
    config.geocoding.endpoint = server.url_str("/geocode/v1/json");
    config.geocoding.api_key = Some("test-key".to_string());
    config.geocoding.pacing_ms = 1;

    let pipeline = EnrichmentPipeline::from_config(config).unwrap().with_silent(true);
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.backfill.lookups_issued, 1);
    assert_eq!(report.backfill.fallback_applied, 1);

    let rows = rows_by_id(&fixture.output);
    let geocoded: Vec<&OutputRow> = rows.iter().filter(|r| r.lat == Some(48.8566)).collect();
    assert_eq!(geocoded.len(), 2);
}

#[tokio::test]
async fn test_input_geohash_column_is_recomputed() {
    let fixture = fixture();
    fs::write(
        fixture.restaurants.join("part-00000.csv"),
        "id,city,country,lat,lng,geohash\n1,Paris,France,48.8566,2.3522,stale\n",
    )
    .unwrap();

    static_pipeline(config(&fixture)).run().await.unwrap();

    let rows = rows_by_id(&fixture.output);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].geohash.as_deref(), Some("u09t"));
    assert_eq!(rows[0].avg_tmpr_c, Some(10.0));
}
