pub mod cli;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod models;
pub mod processors;
pub mod readers;
pub mod utils;
pub mod writers;

pub use config::{GeocodingConfig, PipelineConfig};
pub use error::{EnrichError, Result};
