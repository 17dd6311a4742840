use arrow::array::{Array, ArrayRef, AsArray, PrimitiveArray, StringArray};
use arrow::datatypes::{ArrowPrimitiveType, Date32Type, Float64Type};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{EnrichError, Result};
use crate::utils::constants::*;

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStats {
    pub geohash: Option<String>,
    pub rows: i64,
    pub file_size: u64,
}

/// What a previously written output directory contains.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputInfo {
    pub path: PathBuf,
    pub partitions: Vec<PartitionStats>,
    pub total_rows: i64,
    pub total_size: u64,
    pub complete: bool,
}

impl OutputInfo {
    pub fn summary(&self) -> String {
        let unbucketed = self
            .partitions
            .iter()
            .filter(|p| p.geohash.is_none())
            .map(|p| p.rows)
            .sum::<i64>();
        format!(
            "Enriched Dataset Summary:\n\
            - Location: {}\n\
            - Complete (_SUCCESS present): {}\n\
            - Partitions: {}\n\
            - Total rows: {}\n\
            - Rows without a geohash: {}\n\
            - Size on disk: {:.2} MB",
            self.path.display(),
            self.complete,
            self.partitions.len(),
            self.total_rows,
            unbucketed,
            self.total_size as f64 / 1_048_576.0
        )
    }

    /// The `n` largest partitions, ties broken by geohash.
    pub fn largest_partitions(&self, n: usize) -> Vec<&PartitionStats> {
        let mut sorted: Vec<&PartitionStats> = self.partitions.iter().collect();
        sorted.sort_by(|a, b| b.rows.cmp(&a.rows).then_with(|| a.geohash.cmp(&b.geohash)));
        sorted.truncate(n);
        sorted
    }
}

/// A row read back from the output, reduced to the fields worth showing.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub id: String,
    pub geohash: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub avg_tmpr_c: Option<f64>,
    pub avg_tmpr_f: Option<f64>,
    pub wthr_date: Option<NaiveDate>,
}

pub struct OutputInspector;

impl OutputInspector {
    pub fn inspect(output: &Path) -> Result<OutputInfo> {
        let mut partitions = Vec::new();
        for (geohash, file) in partition_files(output)? {
            let reader = SerializedFileReader::new(File::open(&file)?)?;
            partitions.push(PartitionStats {
                geohash,
                rows: reader.metadata().file_metadata().num_rows(),
                file_size: fs::metadata(&file)?.len(),
            });
        }

        Ok(OutputInfo {
            path: output.to_path_buf(),
            total_rows: partitions.iter().map(|p| p.rows).sum(),
            total_size: partitions.iter().map(|p| p.file_size).sum(),
            complete: output.join(SUCCESS_MARKER).is_file(),
            partitions,
        })
    }

    /// Read rows back in partition order, stopping after `limit` if given.
    pub fn read_rows(output: &Path, limit: Option<usize>) -> Result<Vec<OutputRow>> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut rows = Vec::new();

        for (_, file) in partition_files(output)? {
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&file)?)?.build()?;
            for batch in reader {
                let batch = batch?;
                let ids = string_column(&batch, &file, COL_ID)?;
                let geohashes = string_column(&batch, &file, COL_GEOHASH)?;
                let lats = primitive_column::<Float64Type>(&batch, &file, COL_LAT)?;
                let lngs = primitive_column::<Float64Type>(&batch, &file, COL_LNG)?;
                let avg_c = primitive_column::<Float64Type>(&batch, &file, COL_AVG_TMPR_C)?;
                let avg_f = primitive_column::<Float64Type>(&batch, &file, COL_AVG_TMPR_F)?;
                let dates = primitive_column::<Date32Type>(&batch, &file, COL_WTHR_DATE)?;

                for i in 0..batch.num_rows() {
                    if rows.len() >= limit {
                        return Ok(rows);
                    }
                    rows.push(OutputRow {
                        id: ids.value(i).to_string(),
                        geohash: (!geohashes.is_null(i)).then(|| geohashes.value(i).to_string()),
                        lat: (!lats.is_null(i)).then(|| lats.value(i)),
                        lng: (!lngs.is_null(i)).then(|| lngs.value(i)),
                        avg_tmpr_c: (!avg_c.is_null(i)).then(|| avg_c.value(i)),
                        avg_tmpr_f: (!avg_f.is_null(i)).then(|| avg_f.value(i)),
                        wthr_date: if dates.is_null(i) {
                            None
                        } else {
                            NaiveDate::from_num_days_from_ce_opt(dates.value(i) + EPOCH_DAYS_FROM_CE)
                        },
                    });
                }
            }
        }

        Ok(rows)
    }
}

fn column<'a>(batch: &'a RecordBatch, file: &Path, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| EnrichError::MissingColumn {
            path: file.to_path_buf(),
            column: name.to_string(),
        })
}

fn unexpected_type(file: &Path, name: &str, array: &ArrayRef) -> EnrichError {
    EnrichError::InvalidFormat(format!(
        "column '{}' in {} has unexpected type {}",
        name,
        file.display(),
        array.data_type()
    ))
}

fn string_column<'a>(batch: &'a RecordBatch, file: &Path, name: &str) -> Result<&'a StringArray> {
    let array = column(batch, file, name)?;
    array
        .as_string_opt::<i32>()
        .ok_or_else(|| unexpected_type(file, name, array))
}

fn primitive_column<'a, T: ArrowPrimitiveType>(
    batch: &'a RecordBatch,
    file: &Path,
    name: &str,
) -> Result<&'a PrimitiveArray<T>> {
    let array = column(batch, file, name)?;
    array
        .as_primitive_opt::<T>()
        .ok_or_else(|| unexpected_type(file, name, array))
}

/// `(geohash, file)` for every partition, sorted by directory name.
fn partition_files(output: &Path) -> Result<Vec<(Option<String>, PathBuf)>> {
    if !output.is_dir() {
        return Err(EnrichError::InputNotFound {
            path: output.to_path_buf(),
        });
    }

    let prefix = format!("{}=", COL_GEOHASH);
    let mut dirs: Vec<PathBuf> = fs::read_dir(output)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix))
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();

    let mut files = Vec::new();
    for dir in dirs {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .trim_start_matches(prefix.as_str())
            .to_string();
        let geohash = if name == DEFAULT_PARTITION_VALUE {
            None
        } else {
            Some(name)
        };

        let mut parts: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .collect();
        parts.sort();
        files.extend(parts.into_iter().map(|p| (geohash.clone(), p)));
    }
    Ok(files)
}
