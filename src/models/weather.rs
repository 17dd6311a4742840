use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::geo::Coordinates;

/// One row of the weather input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub avg_tmpr_c: Option<f64>,
    pub avg_tmpr_f: Option<f64>,
    pub wthr_date: Option<NaiveDate>,
}

impl WeatherObservation {
    pub fn new(
        lat: f64,
        lng: f64,
        avg_tmpr_c: f64,
        avg_tmpr_f: f64,
        wthr_date: NaiveDate,
    ) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            avg_tmpr_c: Some(avg_tmpr_c),
            avg_tmpr_f: Some(avg_tmpr_f),
            wthr_date: Some(wthr_date),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.lat, self.lng)
    }

    pub fn reading(&self) -> WeatherReading {
        WeatherReading {
            avg_tmpr_c: self.avg_tmpr_c,
            avg_tmpr_f: self.avg_tmpr_f,
            wthr_date: self.wthr_date,
        }
    }
}

/// The weather fields carried onto an enriched restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub avg_tmpr_c: Option<f64>,
    pub avg_tmpr_f: Option<f64>,
    pub wthr_date: Option<NaiveDate>,
}
