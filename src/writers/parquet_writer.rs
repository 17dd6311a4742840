use crate::error::{EnrichError, Result};
use crate::models::EnrichedRecord;
use crate::utils::constants::*;
use arrow::array::{ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub fn parse_compression(compression: &str) -> Result<Compression> {
    match compression.to_lowercase().as_str() {
        COMPRESSION_SNAPPY => Ok(Compression::SNAPPY),
        COMPRESSION_GZIP => Ok(Compression::GZIP(GzipLevel::default())),
        COMPRESSION_LZ4 => Ok(Compression::LZ4),
        COMPRESSION_ZSTD => Ok(Compression::ZSTD(ZstdLevel::default())),
        COMPRESSION_NONE => Ok(Compression::UNCOMPRESSED),
        _ => Err(EnrichError::Config(format!(
            "Unsupported compression: {}",
            compression
        ))),
    }
}

/// Directory name of the partition holding `geohash`.
pub fn partition_dir_name(geohash: Option<&str>) -> String {
    format!("{}={}", COL_GEOHASH, geohash.unwrap_or(DEFAULT_PARTITION_VALUE))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub geohash: Option<String>,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    pub output: PathBuf,
    pub partitions: Vec<PartitionInfo>,
    pub rows: usize,
}

impl WriteSummary {
    pub fn summary(&self) -> String {
        format!(
            "Output Summary:\n\
            - Location: {}\n\
            - Partitions: {}\n\
            - Rows written: {}",
            self.output.display(),
            self.partitions.len(),
            self.rows
        )
    }
}

/// Writes enriched restaurants as a Parquet dataset partitioned by geohash.
///
/// The dataset is assembled in a staging directory beside `output` and only
/// moved into place once every partition and the `_SUCCESS` marker are
/// written. A failed run leaves any previous output as it was.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
    tag_unresolved: bool,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            tag_unresolved: false,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = parse_compression(compression)?;
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    /// Add a `coord_source` column to every file.
    pub fn with_tag_unresolved(mut self, tag_unresolved: bool) -> Self {
        self.tag_unresolved = tag_unresolved;
        self
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn create_schema(&self, attribute_columns: &[String]) -> SchemaRef {
        let mut fields = vec![
            Field::new(COL_ID, DataType::Utf8, false),
            Field::new(COL_CITY, DataType::Utf8, true),
            Field::new(COL_COUNTRY, DataType::Utf8, true),
            Field::new(COL_LAT, DataType::Float64, true),
            Field::new(COL_LNG, DataType::Float64, true),
        ];
        fields.extend(
            attribute_columns
                .iter()
                .map(|name| Field::new(name.as_str(), DataType::Utf8, true)),
        );
        fields.push(Field::new(COL_GEOHASH, DataType::Utf8, true));
        fields.push(Field::new(COL_AVG_TMPR_C, DataType::Float64, true));
        fields.push(Field::new(COL_AVG_TMPR_F, DataType::Float64, true));
        fields.push(Field::new(COL_WTHR_DATE, DataType::Date32, true));
        if self.tag_unresolved {
            fields.push(Field::new(COL_COORD_SOURCE, DataType::Utf8, false));
        }
        Arc::new(Schema::new(fields))
    }

    pub fn records_to_batch(
        &self,
        records: &[&EnrichedRecord],
        attribute_columns: &[String],
        schema: SchemaRef,
    ) -> Result<RecordBatch> {
        let ids: Vec<&str> = records.iter().map(|r| r.restaurant.id.as_str()).collect();
        let cities: Vec<Option<&str>> = records.iter().map(|r| r.restaurant.city.as_deref()).collect();
        let countries: Vec<Option<&str>> = records.iter().map(|r| r.restaurant.country.as_deref()).collect();
        let lats: Vec<Option<f64>> = records.iter().map(|r| r.restaurant.lat).collect();
        let lngs: Vec<Option<f64>> = records.iter().map(|r| r.restaurant.lng).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(cities)),
            Arc::new(StringArray::from(countries)),
            Arc::new(Float64Array::from(lats)),
            Arc::new(Float64Array::from(lngs)),
        ];

        for index in 0..attribute_columns.len() {
            let values: Vec<Option<&str>> = records
                .iter()
                .map(|r| r.restaurant.attributes.get(index).and_then(|v| v.as_deref()))
                .collect();
            columns.push(Arc::new(StringArray::from(values)));
        }

        let geohashes: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.geohash.as_ref().map(|g| g.as_str()))
            .collect();
        let avg_c: Vec<Option<f64>> = records.iter().map(|r| r.avg_tmpr_c()).collect();
        let avg_f: Vec<Option<f64>> = records.iter().map(|r| r.avg_tmpr_f()).collect();
        let dates: Vec<Option<i32>> = records
            .iter()
            .map(|r| r.wthr_date().map(|d| d.num_days_from_ce() - EPOCH_DAYS_FROM_CE))
            .collect();

        columns.push(Arc::new(StringArray::from(geohashes)));
        columns.push(Arc::new(Float64Array::from(avg_c)));
        columns.push(Arc::new(Float64Array::from(avg_f)));
        columns.push(Arc::new(Date32Array::from(dates)));

        if self.tag_unresolved {
            let sources: Vec<&str> = records
                .iter()
                .map(|r| r.restaurant.coordinate_source.as_str())
                .collect();
            columns.push(Arc::new(StringArray::from(sources)));
        }

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    fn write_file(&self, records: &[&EnrichedRecord], attribute_columns: &[String], path: &Path) -> Result<()> {
        let schema = self.create_schema(attribute_columns);
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size) {
            let batch = self.records_to_batch(chunk, attribute_columns, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;
        Ok(())
    }

    /// Replace `output` with a dataset holding `records`, one directory per
    /// geohash. Partitions are encoded on the current rayon pool.
    pub fn write_partitioned(
        &self,
        records: &[EnrichedRecord],
        attribute_columns: &[String],
        output: &Path,
    ) -> Result<WriteSummary> {
        check_attribute_columns(attribute_columns)?;

        let parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut partitions: BTreeMap<Option<&str>, Vec<&EnrichedRecord>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(record.geohash.as_ref().map(|g| g.as_str()))
                .or_default()
                .push(record);
        }

        let staging = tempfile::Builder::new()
            .prefix(".enrich-staging-")
            .tempdir_in(&parent)?;
        debug!("Staging {} partitions in {}", partitions.len(), staging.path().display());

        let written: Vec<PartitionInfo> = partitions
            .par_iter()
            .map(|(geohash, rows)| -> Result<PartitionInfo> {
                let dir_name = partition_dir_name(*geohash);
                let dir = staging.path().join(&dir_name);
                fs::create_dir_all(&dir)?;
                self.write_file(rows, attribute_columns, &dir.join(PART_FILE_NAME))?;
                Ok(PartitionInfo {
                    geohash: geohash.map(str::to_string),
                    path: output.join(dir_name).join(PART_FILE_NAME),
                    rows: rows.len(),
                })
            })
            .collect::<Result<_>>()?;

        File::create(staging.path().join(SUCCESS_MARKER))?;

        replace_dir(staging.path(), output, &parent)?;

        let summary = WriteSummary {
            output: output.to_path_buf(),
            rows: written.iter().map(|p| p.rows).sum(),
            partitions: written,
        };
        info!(
            "Wrote {} rows in {} partitions to {}",
            summary.rows,
            summary.partitions.len(),
            output.display()
        );
        Ok(summary)
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Passthrough columns must not collide with the columns the writer owns.
fn check_attribute_columns(attribute_columns: &[String]) -> Result<()> {
    let owned = [COL_ID, COL_CITY, COL_COUNTRY, COL_LAT, COL_LNG];
    for name in attribute_columns {
        if owned.contains(&name.as_str()) || DERIVED_COLUMNS.contains(&name.as_str()) {
            return Err(EnrichError::InvalidFormat(format!(
                "attribute column '{}' clashes with an output column",
                name
            )));
        }
    }
    Ok(())
}

/// Move `staged` to `output`, retiring whatever was there before.
fn replace_dir(staged: &Path, output: &Path, parent: &Path) -> Result<()> {
    if output.exists() {
        let retired = tempfile::Builder::new()
            .prefix(".enrich-previous-")
            .tempdir_in(parent)?;
        let holding = retired.path().join("previous");
        fs::rename(output, &holding)?;

        if let Err(err) = fs::rename(staged, output) {
            fs::rename(&holding, output)?;
            return Err(err.into());
        }
        debug!("Replaced previous output at {}", output.display());
    } else {
        fs::rename(staged, output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoordinateSource, GeoBucket, RestaurantRecord, WeatherReading};
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn enriched(id: &str, geohash: Option<&str>, temp: Option<f64>) -> EnrichedRecord {
        let restaurant = RestaurantRecord::new(id, Some("Paris".into()), Some("FR".into()), Some(48.85), Some(2.35))
            .with_attributes(vec![Some(format!("franchise-{}", id))]);
        let weather = temp.map(|c| WeatherReading {
            avg_tmpr_c: Some(c),
            avg_tmpr_f: Some(c * 1.8 + 32.0),
            wthr_date: NaiveDate::from_ymd_opt(2017, 8, 1),
        });
        EnrichedRecord::new(restaurant, geohash.map(GeoBucket::new), weather)
    }

    fn attrs() -> Vec<String> {
        vec!["franchise_name".to_string()]
    }

    #[test]
    fn test_parse_compression() {
        assert_eq!(parse_compression("snappy").unwrap(), Compression::SNAPPY);
        assert_eq!(parse_compression("NONE").unwrap(), Compression::UNCOMPRESSED);
        assert!(parse_compression("brotli-ish").is_err());
    }

    #[test]
    fn test_schema_with_and_without_tag() {
        let schema = ParquetWriter::new().create_schema(&attrs());
        assert!(schema.index_of(COL_COORD_SOURCE).is_err());
        assert_eq!(schema.field(5).name(), "franchise_name");

        let tagged = ParquetWriter::new().with_tag_unresolved(true).create_schema(&attrs());
        assert!(tagged.index_of(COL_COORD_SOURCE).is_ok());
    }

    #[test]
    fn test_partition_layout() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched");
        let records = vec![
            enriched("1", Some("u09t"), Some(18.0)),
            enriched("2", Some("dr5r"), None),
            enriched("3", Some("u09t"), Some(18.0)),
            enriched("4", None, None),
        ];

        let summary = ParquetWriter::new()
            .write_partitioned(&records, &attrs(), &output)
            .unwrap();

        assert_eq!(summary.rows, 4);
        assert_eq!(summary.partitions.len(), 3);
        assert!(output.join("geohash=u09t").join(PART_FILE_NAME).is_file());
        assert!(output.join("geohash=dr5r").join(PART_FILE_NAME).is_file());
        assert!(output
            .join(format!("geohash={}", DEFAULT_PARTITION_VALUE))
            .join(PART_FILE_NAME)
            .is_file());
        assert!(output.join(SUCCESS_MARKER).is_file());

        let u09t = summary
            .partitions
            .iter()
            .find(|p| p.geohash.as_deref() == Some("u09t"))
            .unwrap();
        assert_eq!(u09t.rows, 2);
    }

    #[test]
    fn test_written_values_round_trip() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched");
        let mut record = enriched("1", Some("u09t"), Some(20.0));
        record.restaurant.coordinate_source = CoordinateSource::Geocoded;

        ParquetWriter::new()
            .with_tag_unresolved(true)
            .write_partitioned(&[record], &attrs(), &output)
            .unwrap();

        let file = File::open(output.join("geohash=u09t").join(PART_FILE_NAME)).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
        let batch = reader.into_iter().next().unwrap().unwrap();

        let dates = batch
            .column_by_name(COL_WTHR_DATE)
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.value(0), 17379);

        let sources = batch
            .column_by_name(COL_COORD_SOURCE)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(sources.value(0), "geocoded");
    }

    #[test]
    fn test_existing_output_is_replaced_not_appended() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched");
        fs::create_dir_all(output.join("geohash=zzzz")).unwrap();
        fs::write(output.join("geohash=zzzz").join(PART_FILE_NAME), b"stale").unwrap();

        ParquetWriter::new()
            .write_partitioned(&[enriched("1", Some("u09t"), None)], &attrs(), &output)
            .unwrap();

        assert!(!output.join("geohash=zzzz").exists());
        assert!(output.join("geohash=u09t").exists());

        // no staging or retired directories are left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("enriched")]);
    }

    #[test]
    fn test_attribute_named_like_output_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched");
        let attrs = vec![COL_GEOHASH.to_string()];

        let err = ParquetWriter::new()
            .write_partitioned(&[enriched("1", Some("u09t"), None)], &attrs, &output)
            .unwrap_err();

        assert!(matches!(err, EnrichError::InvalidFormat(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_empty_input_still_marks_success() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched");

        let summary = ParquetWriter::new().write_partitioned(&[], &attrs(), &output).unwrap();

        assert_eq!(summary.rows, 0);
        assert!(output.join(SUCCESS_MARKER).is_file());
    }
}
