//! Run configuration.
//!
//! Values are layered: serde defaults, then an optional config file
//! (any format the `config` crate understands, usually TOML), then
//! `ENRICH__*` environment variables (`ENRICH__GEOCODING__API_KEY`,
//! `ENRICH__PRECISION`, ...), then command-line overrides applied by the CLI.

use crate::error::{EnrichError, Result};
use crate::models::Coordinates;
use crate::processors::TieBreak;
use crate::utils::constants::*;
use crate::writers::parse_compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use validator::Validate;

pub const ENV_PREFIX: &str = "ENRICH";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    pub restaurant_path: PathBuf,

    pub weather_root: PathBuf,

    #[validate(length(min = 1))]
    pub weather_shard_pattern: String,

    pub output_path: PathBuf,

    /// Geohash length; 4 gives cells of roughly 39km x 19.5km.
    #[validate(range(min = 1, max = 12))]
    pub precision: usize,

    pub tie_break: TieBreak,

    #[validate(nested)]
    pub fallback: Coordinates,

    /// Emit a `coord_source` column so fallback coordinates are distinguishable.
    pub tag_unresolved: bool,

    #[validate(range(min = 1))]
    pub max_workers: usize,

    pub compression: String,

    /// Seconds from the start of a run after which no further geocoding
    /// requests are issued.
    pub pipeline_timeout_secs: Option<u64>,

    #[validate(nested)]
    pub geocoding: GeocodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            restaurant_path: PathBuf::from(DEFAULT_RESTAURANT_PATH),
            weather_root: PathBuf::from(DEFAULT_WEATHER_ROOT),
            weather_shard_pattern: DEFAULT_WEATHER_SHARD_PATTERN.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            precision: DEFAULT_GEOHASH_PRECISION,
            tie_break: TieBreak::default(),
            fallback: Coordinates::new(SENTINEL_LAT, SENTINEL_LNG),
            tag_unresolved: false,
            max_workers: num_cpus::get(),
            compression: COMPRESSION_SNAPPY.to_string(),
            pipeline_timeout_secs: None,
            geocoding: GeocodingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, an optional file and `ENRICH__*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(EnrichError::InputNotFound {
                    path: path.to_path_buf(),
                });
            }
            debug!("Loading configuration file {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Field-level validation plus checks that need more than a range.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        parse_compression(&self.compression)?;

        if !self.fallback.is_finite() {
            return Err(EnrichError::Config(
                "fallback coordinates must be finite".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }

    pub fn summary(&self) -> String {
        format!(
            "Configuration:\n\
            - Restaurants: {}\n\
            - Weather root: {} (shards: '{}')\n\
            - Output: {}\n\
            - Geohash precision: {}\n\
            - Tie-break: {:?}\n\
            - Fallback coordinates: {}\n\
            - Workers: {}\n\
            - Geocoding: {}",
            self.restaurant_path.display(),
            self.weather_root.display(),
            self.weather_shard_pattern,
            self.output_path.display(),
            self.precision,
            self.tie_break,
            self.fallback,
            self.max_workers,
            self.geocoding.summary()
        )
    }
}

#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GeocodingConfig {
    #[validate(length(min = 1))]
    pub endpoint: String,

    pub api_key: Option<String>,

    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u64,

    /// Minimum spacing between successive requests.
    pub pacing_ms: u64,

    #[validate(range(max = 10))]
    pub max_retries: u32,

    pub backoff_base_ms: u64,

    #[validate(range(min = 1, max = 16))]
    pub max_concurrent: usize,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: OPENCAGE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            pacing_ms: DEFAULT_PACING_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            max_concurrent: 1,
        }
    }
}

impl GeocodingConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    fn summary(&self) -> String {
        format!(
            "{} (key: {}, timeout {}s, pacing {}ms, retries {}, concurrency {})",
            self.endpoint,
            if self.has_credential() { "set" } else { "missing" },
            self.timeout_secs,
            self.pacing_ms,
            self.max_retries,
            self.max_concurrent
        )
    }
}

impl fmt::Debug for GeocodingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodingConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("pacing_ms", &self.pacing_ms)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}
