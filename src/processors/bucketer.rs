use rayon::prelude::*;
use tracing::trace;

use crate::models::{Coordinates, GeoBucket, RestaurantRecord, WeatherObservation};
use crate::utils::constants::{DEFAULT_GEOHASH_PRECISION, MAX_GEOHASH_PRECISION};

/// Geohash cell for a coordinate pair.
///
/// Absent components, non-finite values and coordinates outside the valid
/// latitude/longitude ranges all yield `None`.
pub fn bucket(lat: Option<f64>, lng: Option<f64>, precision: usize) -> Option<GeoBucket> {
    let coordinates = Coordinates::from_parts(lat, lng)?;
    bucket_coordinates(&coordinates, precision)
}

pub fn bucket_coordinates(coordinates: &Coordinates, precision: usize) -> Option<GeoBucket> {
    if precision == 0 || precision > MAX_GEOHASH_PRECISION || !coordinates.is_on_earth() {
        return None;
    }

    match geohash::encode(
        geohash::Coord {
            x: coordinates.lng,
            y: coordinates.lat,
        },
        precision,
    ) {
        Ok(code) => Some(GeoBucket::new(code)),
        Err(err) => {
            trace!("geohash encode failed for {}: {:?}", coordinates, err);
            None
        }
    }
}

/// Assigns buckets to whole record sets on the current rayon pool.
#[derive(Debug, Clone, Copy)]
pub struct SpatialBucketer {
    precision: usize,
}

impl SpatialBucketer {
    pub fn new(precision: usize) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn bucket(&self, lat: Option<f64>, lng: Option<f64>) -> Option<GeoBucket> {
        bucket(lat, lng, self.precision)
    }

    /// One bucket per restaurant, aligned with the input slice.
    pub fn assign_restaurants(&self, records: &[RestaurantRecord]) -> Vec<Option<GeoBucket>> {
        records
            .par_iter()
            .map(|r| self.bucket(r.lat, r.lng))
            .collect()
    }

    /// One bucket per observation, aligned with the input slice.
    pub fn assign_observations(&self, observations: &[WeatherObservation]) -> Vec<Option<GeoBucket>> {
        observations
            .par_iter()
            .map(|o| self.bucket(o.lat, o.lng))
            .collect()
    }
}

impl Default for SpatialBucketer {
    fn default() -> Self {
        Self::new(DEFAULT_GEOHASH_PRECISION)
    }
}
