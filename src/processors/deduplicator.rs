use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::bucketer::SpatialBucketer;
use crate::models::{GeoBucket, WeatherObservation, WeatherReading};

/// How the representative observation of a bucket is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First observation in input order.
    #[default]
    FirstSeen,
    /// Earliest `wthr_date`, then lowest `avg_tmpr_c`, then input order.
    /// Absent values sort after present ones.
    EarliestDate,
}

impl TieBreak {
    /// Whether `candidate` should replace `current`. Input order is implied:
    /// the candidate always arrives later.
    fn prefers(&self, candidate: &WeatherObservation, current: &WeatherObservation) -> bool {
        match self {
            TieBreak::FirstSeen => false,
            TieBreak::EarliestDate => {
                let by_date = cmp_absent_last(&candidate.wthr_date, &current.wthr_date);
                let ordering = by_date.then_with(|| {
                    cmp_absent_last_f64(candidate.avg_tmpr_c, current.avg_tmpr_c)
                });
                ordering == Ordering::Less
            }
        }
    }
}

fn cmp_absent_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_absent_last_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub input_rows: usize,
    pub dropped_unbucketed: usize,
    pub buckets: usize,
    pub duplicates_collapsed: usize,
}

impl DedupReport {
    pub fn summary(&self) -> String {
        format!(
            "Weather dedup: {} rows -> {} buckets ({} collapsed, {} without a bucket)",
            self.input_rows, self.buckets, self.duplicates_collapsed, self.dropped_unbucketed
        )
    }
}

/// Collapses weather observations to one reading per geohash cell.
pub struct WeatherDeduplicator {
    bucketer: SpatialBucketer,
    tie_break: TieBreak,
}

impl WeatherDeduplicator {
    pub fn new(bucketer: SpatialBucketer) -> Self {
        Self {
            bucketer,
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Deduplicate `observations`, which must be in natural input order.
    pub fn deduplicate(
        &self,
        observations: &[WeatherObservation],
    ) -> (BTreeMap<GeoBucket, WeatherReading>, DedupReport) {
        let cells = self.bucketer.assign_observations(observations);

        let mut chosen: BTreeMap<GeoBucket, &WeatherObservation> = BTreeMap::new();
        let mut report = DedupReport {
            input_rows: observations.len(),
            ..DedupReport::default()
        };

        for (observation, cell) in observations.iter().zip(cells) {
            let Some(cell) = cell else {
                report.dropped_unbucketed += 1;
                continue;
            };

            match chosen.entry(cell) {
                Entry::Vacant(slot) => {
                    slot.insert(observation);
                }
                Entry::Occupied(mut slot) => {
                    report.duplicates_collapsed += 1;
                    if self.tie_break.prefers(observation, slot.get()) {
                        slot.insert(observation);
                    }
                }
            }
        }

        report.buckets = chosen.len();
        if report.dropped_unbucketed > 0 {
            debug!(
                "Dropped {} weather rows with missing or invalid coordinates",
                report.dropped_unbucketed
            );
        }
        info!("{}", report.summary());

        let readings = chosen
            .into_iter()
            .map(|(cell, observation)| (cell, observation.reading()))
            .collect();

        (readings, report)
    }
}
