use serde::{Deserialize, Serialize};

use super::geo::GeoBucket;
use super::restaurant::RestaurantRecord;
use super::weather::WeatherReading;

/// A restaurant joined with zero or one weather reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub restaurant: RestaurantRecord,
    pub geohash: Option<GeoBucket>,
    pub weather: Option<WeatherReading>,
}

impl EnrichedRecord {
    pub fn new(
        restaurant: RestaurantRecord,
        geohash: Option<GeoBucket>,
        weather: Option<WeatherReading>,
    ) -> Self {
        Self {
            restaurant,
            geohash,
            weather,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.weather.is_some()
    }

    pub fn avg_tmpr_c(&self) -> Option<f64> {
        self.weather.as_ref().and_then(|w| w.avg_tmpr_c)
    }

    pub fn avg_tmpr_f(&self) -> Option<f64> {
        self.weather.as_ref().and_then(|w| w.avg_tmpr_f)
    }

    pub fn wthr_date(&self) -> Option<chrono::NaiveDate> {
        self.weather.as_ref().and_then(|w| w.wthr_date)
    }

    /// One-line rendering used for the run's sample output.
    pub fn summary_line(&self) -> String {
        let r = &self.restaurant;
        let coords = match r.coordinates() {
            Some(c) => c.to_string(),
            None => "(none)".to_string(),
        };
        let weather = match &self.weather {
            Some(w) => format!(
                "{} / {} on {}",
                fmt_temp(w.avg_tmpr_c, "°C"),
                fmt_temp(w.avg_tmpr_f, "°F"),
                w.wthr_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown date".to_string())
            ),
            None => "no weather match".to_string(),
        };
        format!(
            "{} [{}] {} {}: {}",
            r.id,
            self.geohash.as_ref().map(|g| g.as_str()).unwrap_or("-"),
            r.city.as_deref().unwrap_or("?"),
            coords,
            weather
        )
    }
}

fn fmt_temp(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => format!("?{}", unit),
    }
}
