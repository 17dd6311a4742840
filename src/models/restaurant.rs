use serde::{Deserialize, Serialize};

use super::geo::Coordinates;

/// Where a restaurant's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    #[default]
    Original,
    Geocoded,
    Fallback,
}

impl CoordinateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateSource::Original => "original",
            CoordinateSource::Geocoded => "geocoded",
            CoordinateSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantRecord {
    pub id: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Passthrough values, aligned with `RestaurantSet::attribute_columns`.
    pub attributes: Vec<Option<String>>,
    pub coordinate_source: CoordinateSource,
}

impl RestaurantRecord {
    pub fn new(
        id: impl Into<String>,
        city: Option<String>,
        country: Option<String>,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            city,
            country,
            lat,
            lng,
            attributes: Vec::new(),
            coordinate_source: CoordinateSource::Original,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Option<String>>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.lat, self.lng)
    }

    pub fn needs_backfill(&self) -> bool {
        self.lat.is_none() || self.lng.is_none()
    }

    /// Geocoding query text: `"{city}, {country}"`, or empty when either is absent.
    pub fn geocode_query(&self) -> String {
        match (non_blank(&self.city), non_blank(&self.country)) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            _ => String::new(),
        }
    }

    pub fn location_key(&self) -> (&str, Option<&str>, Option<&str>) {
        (&self.id, self.city.as_deref(), self.country.as_deref())
    }

    /// Replace both coordinate components. Only records that need backfill
    /// are touched; anything else keeps its original coordinates.
    pub fn backfill(&mut self, coordinates: Coordinates, source: CoordinateSource) -> bool {
        if !self.needs_backfill() {
            return false;
        }
        self.lat = Some(coordinates.lat);
        self.lng = Some(coordinates.lng);
        self.coordinate_source = source;
        true
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// A restaurant table: the records plus the names of their passthrough columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestaurantSet {
    pub attribute_columns: Vec<String>,
    pub records: Vec<RestaurantRecord>,
}

impl RestaurantSet {
    pub fn new(attribute_columns: Vec<String>, records: Vec<RestaurantRecord>) -> Self {
        Self {
            attribute_columns,
            records,
        }
    }

    pub fn from_records(records: Vec<RestaurantRecord>) -> Self {
        Self::new(Vec::new(), records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn missing_coordinates(&self) -> usize {
        self.records.iter().filter(|r| r.needs_backfill()).count()
    }
}
