use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EnrichError>;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Missing required column '{column}' in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("Schema mismatch between {} and {}: {details}", first.display(), second.display())]
    SchemaMismatch {
        first: PathBuf,
        second: PathBuf,
        details: String,
    },

    #[error("Invalid value in {} at row {row}, column '{column}': '{value}'", path.display())]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Duplicate restaurant id '{id}'")]
    DuplicateRestaurantId { id: String },

    #[error("Join cardinality violated: {restaurants} restaurants produced {enriched} enriched rows")]
    CardinalityViolation { restaurants: usize, enriched: usize },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
