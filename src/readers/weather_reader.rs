use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Float64Type};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EnrichError, Result};
use crate::models::WeatherObservation;
use crate::utils::constants::{
    COL_AVG_TMPR_C, COL_AVG_TMPR_F, COL_LAT, COL_LNG, COL_WTHR_DATE, EPOCH_DAYS_FROM_CE,
};

/// Reads weather observations from Parquet shards.
///
/// Shards are the entries of `root` matching a glob pattern. Each one is a
/// Parquet file or a directory tree of them. The natural order of the result
/// is shard name, then file path, then row, and it is the same on every run.
pub struct WeatherReader {
    shard_pattern: String,
    batch_size: usize,
}

impl WeatherReader {
    pub fn new(shard_pattern: impl Into<String>) -> Self {
        Self {
            shard_pattern: shard_pattern.into(),
            batch_size: 8192,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Every Parquet file under the matching shards, in natural order.
    pub fn discover_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(EnrichError::InputNotFound {
                path: root.to_path_buf(),
            });
        }

        // only the shard pattern is a glob; the root is matched literally
        let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
        let pattern = Path::new(&escaped_root).join(&self.shard_pattern);
        let pattern = pattern.to_string_lossy();
        let mut shards: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(err) => {
                    warn!("Skipping unreadable shard entry: {}", err);
                    None
                }
            })
            .collect();
        shards.sort();

        if shards.is_empty() {
            return Err(EnrichError::InputNotFound {
                path: root.join(&self.shard_pattern),
            });
        }

        let mut files = Vec::new();
        for shard in &shards {
            let mut shard_files = Vec::new();
            collect_parquet_files(shard, &mut shard_files)?;
            shard_files.sort();
            debug!("Shard {} has {} parquet file(s)", shard.display(), shard_files.len());
            files.extend(shard_files);
        }

        if files.is_empty() {
            return Err(EnrichError::InputNotFound {
                path: root.join(&self.shard_pattern),
            });
        }

        info!(
            "Found {} weather file(s) in {} shard(s) under {}",
            files.len(),
            shards.len(),
            root.display()
        );
        Ok(files)
    }

    /// Read all shards. File reads run on the current rayon pool; the
    /// indexed collect keeps natural order.
    pub fn read_all(&self, root: &Path) -> Result<Vec<WeatherObservation>> {
        let files = self.discover_files(root)?;

        let per_file: Vec<Vec<WeatherObservation>> = files
            .par_iter()
            .map(|file| self.read_file(file))
            .collect::<Result<_>>()?;

        let observations: Vec<WeatherObservation> = per_file.into_iter().flatten().collect();
        info!("Loaded {} weather observations", observations.len());
        Ok(observations)
    }

    pub fn read_file(&self, path: &Path) -> Result<Vec<WeatherObservation>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;

        let mut observations = Vec::new();
        for batch in reader {
            let batch = batch?;
            observations.extend(batch_to_observations(&batch, path, observations.len())?);
        }

        debug!("Read {} observations from {}", observations.len(), path.display());
        Ok(observations)
    }
}

impl Default for WeatherReader {
    fn default() -> Self {
        Self::new(crate::utils::constants::DEFAULT_WEATHER_SHARD_PATTERN)
    }
}

fn collect_parquet_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_file() {
        if is_data_file(path) {
            files.push(path.to_path_buf());
        }
        return Ok(());
    }

    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_dir() {
            collect_parquet_files(&entry_path, files)?;
        } else if is_data_file(&entry_path) {
            files.push(entry_path);
        }
    }
    Ok(())
}

/// `*.parquet`, ignoring hidden and underscore-prefixed bookkeeping files.
fn is_data_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    !name.starts_with('.')
        && !name.starts_with('_')
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("parquet"))
            .unwrap_or(false)
}

fn column(batch: &RecordBatch, name: &str, path: &Path) -> Result<ArrayRef> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| EnrichError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })?;
    Ok(batch.column(index).clone())
}

fn float_column(batch: &RecordBatch, name: &str, path: &Path) -> Result<Vec<Option<f64>>> {
    let array = cast(&column(batch, name, path)?, &DataType::Float64)?;
    let values = array.as_primitive::<Float64Type>();
    Ok((0..values.len())
        .map(|i| if values.is_null(i) { None } else { Some(values.value(i)) })
        .collect())
}

fn date_column(
    batch: &RecordBatch,
    path: &Path,
    row_offset: usize,
) -> Result<Vec<Option<NaiveDate>>> {
    let array = column(batch, COL_WTHR_DATE, path)?;

    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let strings = cast(&array, &DataType::Utf8)?;
            let strings = strings.as_string::<i32>();
            (0..strings.len())
                .map(|i| {
                    if strings.is_null(i) {
                        return Ok(None);
                    }
                    let raw = strings.value(i).trim();
                    if raw.is_empty() {
                        return Ok(None);
                    }
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map(Some)
                        .map_err(|_| EnrichError::InvalidValue {
                            path: path.to_path_buf(),
                            row: row_offset + i,
                            column: COL_WTHR_DATE.to_string(),
                            value: raw.to_string(),
                        })
                })
                .collect()
        }
        _ => {
            let days = cast(&array, &DataType::Date32)?;
            let days = days.as_primitive::<Date32Type>();
            Ok((0..days.len())
                .map(|i| {
                    if days.is_null(i) {
                        None
                    } else {
                        NaiveDate::from_num_days_from_ce_opt(days.value(i) + EPOCH_DAYS_FROM_CE)
                    }
                })
                .collect())
        }
    }
}

/// Convert one batch, matching columns by name so shards may order or
/// extend their schemas differently.
fn batch_to_observations(
    batch: &RecordBatch,
    path: &Path,
    row_offset: usize,
) -> Result<Vec<WeatherObservation>> {
    let lat = float_column(batch, COL_LAT, path)?;
    let lng = float_column(batch, COL_LNG, path)?;
    let avg_c = float_column(batch, COL_AVG_TMPR_C, path)?;
    let avg_f = float_column(batch, COL_AVG_TMPR_F, path)?;
    let dates = date_column(batch, path, row_offset)?;

    Ok((0..batch.num_rows())
        .map(|i| WeatherObservation {
            lat: lat[i],
            lng: lng[i],
            avg_tmpr_c: avg_c[i],
            avg_tmpr_f: avg_f[i],
            wthr_date: dates[i],
        })
        .collect())
}
