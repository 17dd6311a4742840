use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::models::Coordinates;
use crate::processors::TieBreak;
use crate::utils::constants::SAMPLE_ROWS;

#[derive(Parser)]
#[command(name = "restaurant-enricher")]
#[command(about = "Enrich restaurant records with nearby weather observations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Hide progress bars and only log warnings")]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backfill coordinates, join weather by geohash and write the partitioned dataset
    Run(RunArgs),

    /// Summarise a previously written output directory
    Info {
        #[arg(short, long, help = "Output directory written by `run`")]
        output: PathBuf,

        #[arg(short, long, default_value_t = SAMPLE_ROWS)]
        sample: usize,
    },
}

/// Flags for `run`. Anything given here overrides the config file and environment.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(short, long, help = "Configuration file (TOML, YAML or JSON)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Restaurant CSV file or directory of CSV files")]
    pub restaurants: Option<PathBuf>,

    #[arg(short, long, help = "Directory holding the weather shards")]
    pub weather_root: Option<PathBuf>,

    #[arg(long, help = "Glob matching shard names under the weather root")]
    pub shard_pattern: Option<String>,

    #[arg(short, long, help = "Output directory (replaced on success)")]
    pub output: Option<PathBuf>,

    #[arg(long, env = "OPENCAGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, help = "Geocoding endpoint URL")]
    pub endpoint: Option<String>,

    #[arg(short, long, help = "Geohash precision (1-12)")]
    pub precision: Option<usize>,

    #[arg(long, help = "Minimum milliseconds between geocoding requests")]
    pub pacing_ms: Option<u64>,

    #[arg(long, help = "Per-request geocoding timeout in seconds")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long, help = "Geocoding requests allowed in flight at once")]
    pub max_concurrent_lookups: Option<usize>,

    #[arg(long, help = "Seconds into the run after which geocoding stops")]
    pub pipeline_timeout_secs: Option<u64>,

    #[arg(long, value_enum)]
    pub tie_break: Option<TieBreak>,

    #[arg(long, allow_hyphen_values = true, requires = "fallback_lng")]
    pub fallback_lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true, requires = "fallback_lat")]
    pub fallback_lng: Option<f64>,

    #[arg(long, help = "Add a coord_source column to the output")]
    pub tag_unresolved: bool,

    #[arg(long)]
    pub max_workers: Option<usize>,

    #[arg(long, help = "snappy, gzip, lz4, zstd or none")]
    pub compression: Option<String>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.restaurants {
            config.restaurant_path = path.clone();
        }
        if let Some(root) = &self.weather_root {
            config.weather_root = root.clone();
        }
        if let Some(pattern) = &self.shard_pattern {
            config.weather_shard_pattern = pattern.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(key) = &self.api_key {
            config.geocoding.api_key = Some(key.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.geocoding.endpoint = endpoint.clone();
        }
        if let Some(precision) = self.precision {
            config.precision = precision;
        }
        if let Some(pacing) = self.pacing_ms {
            config.geocoding.pacing_ms = pacing;
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.geocoding.timeout_secs = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.geocoding.max_retries = retries;
        }
        if let Some(concurrent) = self.max_concurrent_lookups {
            config.geocoding.max_concurrent = concurrent;
        }
        if let Some(timeout) = self.pipeline_timeout_secs {
            config.pipeline_timeout_secs = Some(timeout);
        }
        if let Some(tie_break) = self.tie_break {
            config.tie_break = tie_break;
        }
        if let (Some(lat), Some(lng)) = (self.fallback_lat, self.fallback_lng) {
            config.fallback = Coordinates::new(lat, lng);
        }
        if self.tag_unresolved {
            config.tag_unresolved = true;
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        if let Some(compression) = &self.compression {
            config.compression = compression.clone();
        }
    }
}
