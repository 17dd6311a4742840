/// Restaurant input columns
pub const COL_ID: &str = "id";
pub const COL_CITY: &str = "city";
pub const COL_COUNTRY: &str = "country";
pub const COL_LAT: &str = "lat";
pub const COL_LNG: &str = "lng";

/// Weather input columns
pub const COL_AVG_TMPR_C: &str = "avg_tmpr_c";
pub const COL_AVG_TMPR_F: &str = "avg_tmpr_f";
pub const COL_WTHR_DATE: &str = "wthr_date";

/// Derived output columns
pub const COL_GEOHASH: &str = "geohash";
pub const COL_COORD_SOURCE: &str = "coord_source";

/// Columns the enrichment writes itself; input columns with these names are replaced
pub const DERIVED_COLUMNS: [&str; 5] = [
    COL_GEOHASH,
    COL_AVG_TMPR_C,
    COL_AVG_TMPR_F,
    COL_WTHR_DATE,
    COL_COORD_SOURCE,
];

/// Default locations
pub const DEFAULT_RESTAURANT_PATH: &str = "restaurant_csv";
pub const DEFAULT_WEATHER_ROOT: &str = "artifacts";
pub const DEFAULT_WEATHER_SHARD_PATTERN: &str = "weather*";
pub const DEFAULT_OUTPUT_PATH: &str = "output/enriched_restaurants";

/// Geocoding defaults
pub const OPENCAGE_URL: &str = "https://api.opencagedata.com/geocode/v1/json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PACING_MS: u64 = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 250;
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Bucketing
pub const DEFAULT_GEOHASH_PRECISION: usize = 4;
pub const MAX_GEOHASH_PRECISION: usize = 12;

/// Coordinates assigned when geocoding cannot resolve a location
pub const SENTINEL_LAT: f64 = 0.0;
pub const SENTINEL_LNG: f64 = 0.0;

/// Output layout
pub const DEFAULT_PARTITION_VALUE: &str = "__HIVE_DEFAULT_PARTITION__";
pub const PART_FILE_NAME: &str = "part-00000.parquet";
pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const SAMPLE_ROWS: usize = 5;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

/// Literal cell values treated as null in CSV input
pub const NULL_MARKERS: &[&str] = &["", "null"];

/// Days between 0001-01-01 and 1970-01-01, for Date32 conversion
pub const EPOCH_DAYS_FROM_CE: i32 = 719_163;
