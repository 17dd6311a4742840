pub mod restaurant_reader;
pub mod weather_reader;

pub use restaurant_reader::RestaurantReader;
pub use weather_reader::WeatherReader;
