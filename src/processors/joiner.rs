use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use super::bucketer::SpatialBucketer;
use crate::error::{EnrichError, Result};
use crate::models::{EnrichedRecord, GeoBucket, RestaurantRecord, WeatherReading};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub restaurants: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub unbucketed: usize,
}

impl JoinReport {
    pub fn summary(&self) -> String {
        format!(
            "Join: {} restaurants, {} matched, {} unmatched ({} without a bucket)",
            self.restaurants, self.matched, self.unmatched, self.unbucketed
        )
    }
}

/// Left outer join of restaurants onto deduplicated weather buckets.
pub struct EnrichmentJoiner {
    bucketer: SpatialBucketer,
}

impl EnrichmentJoiner {
    pub fn new(bucketer: SpatialBucketer) -> Self {
        Self { bucketer }
    }

    /// Every restaurant appears exactly once in the result, in input order.
    pub fn join(
        &self,
        restaurants: Vec<RestaurantRecord>,
        weather: &BTreeMap<GeoBucket, WeatherReading>,
    ) -> Result<(Vec<EnrichedRecord>, JoinReport)> {
        ensure_unique_ids(&restaurants)?;

        let expected = restaurants.len();
        let cells = self.bucketer.assign_restaurants(&restaurants);

        let enriched: Vec<EnrichedRecord> = restaurants
            .into_par_iter()
            .zip(cells.into_par_iter())
            .map(|(restaurant, cell)| {
                let reading = cell.as_ref().and_then(|c| weather.get(c)).cloned();
                EnrichedRecord::new(restaurant, cell, reading)
            })
            .collect();

        if enriched.len() != expected {
            return Err(EnrichError::CardinalityViolation {
                restaurants: expected,
                enriched: enriched.len(),
            });
        }

        let matched = enriched.iter().filter(|r| r.is_matched()).count();
        let report = JoinReport {
            restaurants: expected,
            matched,
            unmatched: expected - matched,
            unbucketed: enriched.iter().filter(|r| r.geohash.is_none()).count(),
        };
        info!("{}", report.summary());

        Ok((enriched, report))
    }
}

pub fn ensure_unique_ids(restaurants: &[RestaurantRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(restaurants.len());
    for restaurant in restaurants {
        if !seen.insert(restaurant.id.as_str()) {
            return Err(EnrichError::DuplicateRestaurantId {
                id: restaurant.id.clone(),
            });
        }
    }
    Ok(())
}
