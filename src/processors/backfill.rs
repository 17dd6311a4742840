use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::geocoding::{GeocodeOutcome, GeocodeResolver};
use crate::models::{CoordinateSource, Coordinates, RestaurantRecord};
use crate::utils::constants::{SENTINEL_LAT, SENTINEL_LNG};
use crate::utils::progress::ProgressReporter;

/// Counts from one backfill pass. Outcome counts are per distinct query;
/// `fallback_applied` is per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub missing: usize,
    pub distinct_queries: usize,
    pub lookups_issued: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub transient: usize,
    pub failed: usize,
    pub skipped: usize,
    pub fallback_applied: usize,
}

impl BackfillReport {
    fn record(&mut self, outcome: &GeocodeOutcome) {
        match outcome {
            GeocodeOutcome::Resolved(_) => self.resolved += 1,
            GeocodeOutcome::NotFound => self.not_found += 1,
            GeocodeOutcome::Transient(_) => self.transient += 1,
            GeocodeOutcome::Failed(_) => self.failed += 1,
            GeocodeOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn unresolved(&self) -> usize {
        self.not_found + self.transient + self.failed + self.skipped
    }

    pub fn summary(&self) -> String {
        format!(
            "Coordinate backfill: {} records missing coordinates, {} distinct queries, {} requests\n\
            - Resolved: {}\n\
            - Not found: {}\n\
            - Transient failures: {}\n\
            - Failed: {}\n\
            - Skipped (deadline): {}\n\
            - Records given fallback coordinates: {}",
            self.missing,
            self.distinct_queries,
            self.lookups_issued,
            self.resolved,
            self.not_found,
            self.transient,
            self.failed,
            self.skipped,
            self.fallback_applied
        )
    }
}

/// Fills in missing restaurant coordinates through the geocode resolver.
///
/// Each distinct query is looked up at most once per run. Anything that does
/// not resolve gets the fallback coordinates, so every record leaves with
/// both components present.
pub struct CoordinateBackfill {
    resolver: GeocodeResolver,
    fallback: Coordinates,
    max_concurrent: usize,
    deadline: Option<Instant>,
    silent: bool,
}

impl CoordinateBackfill {
    pub fn new(resolver: GeocodeResolver) -> Self {
        Self {
            resolver,
            fallback: Coordinates::new(SENTINEL_LAT, SENTINEL_LNG),
            max_concurrent: 1,
            deadline: None,
            silent: true,
        }
    }

    pub fn with_fallback(mut self, fallback: Coordinates) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Stop issuing lookups at `deadline`; unfinished queries become `Skipped`.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Backfill `records` and return them in input order.
    pub async fn run(&self, mut records: Vec<RestaurantRecord>) -> (Vec<RestaurantRecord>, BackfillReport) {
        let mut report = BackfillReport::default();

        // (id, city, country) in first-seen order, each with its query
        let mut seen = HashSet::new();
        let mut targets: Vec<(String, String)> = Vec::new();
        for record in records.iter().filter(|r| r.needs_backfill()) {
            report.missing += 1;
            let (id, city, country) = record.location_key();
            if seen.insert((id.to_string(), city.map(str::to_string), country.map(str::to_string))) {
                targets.push((record.id.clone(), record.geocode_query()));
            }
        }

        if targets.is_empty() {
            debug!("No restaurant is missing coordinates");
            return (records, report);
        }

        let mut queries: Vec<String> = Vec::new();
        let mut query_set = HashSet::new();
        for (_, query) in &targets {
            if query_set.insert(query.as_str()) {
                queries.push(query.clone());
            }
        }
        report.distinct_queries = queries.len();

        info!(
            "Geocoding {} distinct locations for {} restaurants without coordinates",
            queries.len(),
            report.missing
        );

        let requests_before = self.resolver.requests_issued();
        let outcomes = self.resolve_all(queries).await;
        for outcome in outcomes.values() {
            report.record(outcome);
        }
        report.lookups_issued = self.resolver.requests_issued() - requests_before;

        let mut assignments: HashMap<String, (Coordinates, CoordinateSource)> = HashMap::new();
        for (id, query) in targets {
            let assignment = match outcomes.get(&query).and_then(GeocodeOutcome::coordinates) {
                Some(coordinates) => (coordinates, CoordinateSource::Geocoded),
                None => (self.fallback, CoordinateSource::Fallback),
            };
            assignments.entry(id).or_insert(assignment);
        }

        for record in records.iter_mut() {
            if let Some((coordinates, source)) = assignments.get(&record.id) {
                if record.backfill(*coordinates, *source) && *source == CoordinateSource::Fallback {
                    report.fallback_applied += 1;
                }
            }
        }

        if report.unresolved() > 0 {
            warn!(
                "{} of {} locations could not be geocoded; using fallback {}",
                report.unresolved(),
                report.distinct_queries,
                self.fallback
            );
        }
        info!("{}", report.summary());

        (records, report)
    }

    async fn resolve_all(&self, queries: Vec<String>) -> HashMap<String, GeocodeOutcome> {
        let progress = ProgressReporter::new(queries.len() as u64, "Geocoding restaurant locations...", self.silent);
        let deadline = self.deadline;
        let resolver = &self.resolver;
        let progress_ref = &progress;

        let results: Vec<(String, GeocodeOutcome)> = stream::iter(queries)
            .map(|query| async move {
                let outcome = match deadline {
                    Some(at) if Instant::now() >= at => GeocodeOutcome::Skipped,
                    Some(at) => timeout_at(at, resolver.resolve(&query))
                        .await
                        .unwrap_or(GeocodeOutcome::Skipped),
                    None => resolver.resolve(&query).await,
                };
                progress_ref.increment(1);
                (query, outcome)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        progress.finish_with_message("Geocoding complete");
        results.into_iter().collect()
    }
}
