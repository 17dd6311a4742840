pub mod backfill;
pub mod bucketer;
pub mod deduplicator;
pub mod joiner;
pub mod pipeline;

pub use backfill::{BackfillReport, CoordinateBackfill};
pub use bucketer::{bucket, bucket_coordinates, SpatialBucketer};
pub use deduplicator::{DedupReport, TieBreak, WeatherDeduplicator};
pub use joiner::{ensure_unique_ids, EnrichmentJoiner, JoinReport};
pub use pipeline::{Enrichment, EnrichmentPipeline, PipelineReport};
