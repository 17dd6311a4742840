pub mod enriched;
pub mod geo;
pub mod restaurant;
pub mod weather;

pub use enriched::EnrichedRecord;
pub use geo::{Coordinates, GeoBucket};
pub use restaurant::{CoordinateSource, RestaurantRecord, RestaurantSet};
pub use weather::{WeatherObservation, WeatherReading};
