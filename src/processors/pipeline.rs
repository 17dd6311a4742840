use rayon::ThreadPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::backfill::{BackfillReport, CoordinateBackfill};
use super::bucketer::SpatialBucketer;
use super::deduplicator::{DedupReport, WeatherDeduplicator};
use super::joiner::{EnrichmentJoiner, JoinReport};
use crate::config::PipelineConfig;
use crate::error::{EnrichError, Result};
use crate::geocoding::GeocodeResolver;
use crate::models::{EnrichedRecord, RestaurantSet, WeatherObservation};
use crate::readers::{RestaurantReader, WeatherReader};
use crate::utils::constants::SAMPLE_ROWS;
use crate::utils::progress::ProgressReporter;
use crate::writers::{ParquetWriter, WriteSummary};

/// Enriched restaurants plus what each stage reported.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub attribute_columns: Vec<String>,
    pub records: Vec<EnrichedRecord>,
    pub backfill: BackfillReport,
    pub dedup: DedupReport,
    pub join: JoinReport,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub restaurants: usize,
    pub weather_rows: usize,
    pub enriched: usize,
    pub backfill: BackfillReport,
    pub dedup: DedupReport,
    pub join: JoinReport,
    pub output: WriteSummary,
    pub sample: Vec<String>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn summary(&self) -> String {
        format!(
            "Restaurant count: {}\n\
            Enriched count: {}\n\
            Weather rows read: {}\n\n\
            {}\n\n\
            {}\n\
            {}\n\n\
            {}\n\n\
            Completed in {:.2}s",
            self.restaurants,
            self.enriched,
            self.weather_rows,
            self.backfill.summary(),
            self.dedup.summary(),
            self.join.summary(),
            self.output.summary(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Reads, backfills, buckets, deduplicates, joins and writes.
///
/// Bulk work runs on a dedicated rayon pool inside `spawn_blocking`; only
/// geocoding runs on the async runtime.
pub struct EnrichmentPipeline {
    config: PipelineConfig,
    resolver: GeocodeResolver,
    pool: Arc<ThreadPool>,
    silent: bool,
}

impl EnrichmentPipeline {
    pub fn new(config: PipelineConfig, resolver: GeocodeResolver) -> Result<Self> {
        config.check()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|i| format!("enrich-worker-{}", i))
            .build()
            .map_err(|e| EnrichError::Config(e.to_string()))?;

        Ok(Self {
            config,
            resolver,
            pool: Arc::new(pool),
            silent: false,
        })
    }

    /// Pipeline with the resolver described by the geocoding config.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let resolver = GeocodeResolver::from_config(&config.geocoding)?;
        Self::new(config, resolver)
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The enrichment core: no file I/O, only geocoding calls. The
    /// geocoding deadline counts from this call.
    pub async fn enrich(
        &self,
        restaurants: RestaurantSet,
        observations: Vec<WeatherObservation>,
    ) -> Result<Enrichment> {
        self.enrich_until(restaurants, observations, self.deadline_from(Instant::now()))
            .await
    }

    fn deadline_from(&self, started: Instant) -> Option<Instant> {
        self.config.pipeline_timeout().map(|timeout| started + timeout)
    }

    /// As `enrich`, with geocoding cut off at `deadline`.
    pub async fn enrich_until(
        &self,
        restaurants: RestaurantSet,
        observations: Vec<WeatherObservation>,
        deadline: Option<Instant>,
    ) -> Result<Enrichment> {
        let backfill = CoordinateBackfill::new(self.resolver.clone())
            .with_fallback(self.config.fallback)
            .with_max_concurrent(self.config.geocoding.max_concurrent)
            .with_deadline(deadline)
            .with_silent(self.silent);

        let RestaurantSet {
            attribute_columns,
            records,
        } = restaurants;
        let (records, backfill_report) = backfill.run(records).await;

        let bucketer = SpatialBucketer::new(self.config.precision);
        let tie_break = self.config.tie_break;
        let pool = self.pool.clone();

        let (records, dedup, join) = tokio::task::spawn_blocking(move || {
            pool.install(|| {
                let (weather, dedup) = WeatherDeduplicator::new(bucketer)
                    .with_tie_break(tie_break)
                    .deduplicate(&observations);
                let (records, join) = EnrichmentJoiner::new(bucketer).join(records, &weather)?;
                Ok::<_, EnrichError>((records, dedup, join))
            })
        })
        .await??;

        Ok(Enrichment {
            attribute_columns,
            records,
            backfill: backfill_report,
            dedup,
            join,
        })
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let started = Instant::now();
        let deadline = self.deadline_from(started);
        let progress = ProgressReporter::new_spinner("Reading inputs...", self.silent);

        let restaurant_path = self.config.restaurant_path.clone();
        let restaurants_task =
            tokio::task::spawn_blocking(move || RestaurantReader::new().read(&restaurant_path));

        let weather_root = self.config.weather_root.clone();
        let reader = WeatherReader::new(self.config.weather_shard_pattern.clone());
        let pool = self.pool.clone();
        let weather_task =
            tokio::task::spawn_blocking(move || pool.install(|| reader.read_all(&weather_root)));

        let (restaurants, observations) = tokio::try_join!(restaurants_task, weather_task)?;
        let (restaurants, observations) = (restaurants?, observations?);
        progress.finish_with_message(&format!(
            "Read {} restaurants and {} weather rows",
            restaurants.len(),
            observations.len()
        ));

        let restaurant_count = restaurants.len();
        let weather_rows = observations.len();
        let enrichment = self
            .enrich_until(restaurants, observations, deadline)
            .await?;

        let writer = ParquetWriter::new()
            .with_compression(&self.config.compression)?
            .with_tag_unresolved(self.config.tag_unresolved);
        let output_path = self.config.output_path.clone();
        let pool = self.pool.clone();
        let records = enrichment.records;
        let attribute_columns = enrichment.attribute_columns;

        let (output, records) = tokio::task::spawn_blocking(move || {
            let summary =
                pool.install(|| writer.write_partitioned(&records, &attribute_columns, &output_path));
            summary.map(|s| (s, records))
        })
        .await??;

        let report = PipelineReport {
            restaurants: restaurant_count,
            weather_rows,
            enriched: records.len(),
            backfill: enrichment.backfill,
            dedup: enrichment.dedup,
            join: enrichment.join,
            output,
            sample: records
                .iter()
                .take(SAMPLE_ROWS)
                .map(EnrichedRecord::summary_line)
                .collect(),
            elapsed: started.elapsed(),
        };
        info!(
            "Enriched {} of {} restaurants in {:.2}s",
            report.join.matched,
            report.enriched,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}
