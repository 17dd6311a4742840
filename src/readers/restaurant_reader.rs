use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EnrichError, Result};
use crate::models::{RestaurantRecord, RestaurantSet};
use crate::processors::joiner::ensure_unique_ids;
use crate::utils::constants::{
    COL_CITY, COL_COUNTRY, COL_ID, COL_LAT, COL_LNG, DERIVED_COLUMNS, NULL_MARKERS,
};

const REQUIRED_COLUMNS: [&str; 5] = [COL_ID, COL_CITY, COL_COUNTRY, COL_LAT, COL_LNG];

/// Positions of the required columns within a header row.
#[derive(Debug, Clone)]
struct ColumnLayout {
    id: usize,
    city: usize,
    country: usize,
    lat: usize,
    lng: usize,
    attributes: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn from_headers(headers: &StringRecord, path: &Path) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| EnrichError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };

        let mut attributes = Vec::new();
        for (index, name) in headers.iter().enumerate() {
            if REQUIRED_COLUMNS.contains(&name) {
                continue;
            }
            if DERIVED_COLUMNS.contains(&name) {
                warn!(
                    "Dropping input column '{}' from {}; it is recomputed by the enrichment",
                    name,
                    path.display()
                );
                continue;
            }
            attributes.push((index, name.to_string()));
        }

        Ok(Self {
            id: find(COL_ID)?,
            city: find(COL_CITY)?,
            country: find(COL_COUNTRY)?,
            lat: find(COL_LAT)?,
            lng: find(COL_LNG)?,
            attributes,
        })
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|(_, name)| name.clone()).collect()
    }
}

/// Reads the restaurant table from one CSV file or a directory of them.
pub struct RestaurantReader {
    delimiter: u8,
}

impl RestaurantReader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn read(&self, path: &Path) -> Result<RestaurantSet> {
        let files = discover_csv_files(path)?;
        info!("Reading restaurants from {} CSV file(s) under {}", files.len(), path.display());

        let mut layout: Option<(PathBuf, StringRecord, ColumnLayout)> = None;
        let mut records = Vec::new();

        for file in &files {
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .delimiter(self.delimiter)
                .trim(Trim::All)
                .from_path(file)?;
            let headers = reader.headers()?.clone();

            let columns = match &layout {
                None => {
                    let columns = ColumnLayout::from_headers(&headers, file)?;
                    layout = Some((file.clone(), headers.clone(), columns.clone()));
                    columns
                }
                Some((first, first_headers, columns)) => {
                    if first_headers != &headers {
                        return Err(EnrichError::SchemaMismatch {
                            first: first.clone(),
                            second: file.clone(),
                            details: format!(
                                "header [{}] differs from [{}]",
                                headers.iter().collect::<Vec<_>>().join(","),
                                first_headers.iter().collect::<Vec<_>>().join(",")
                            ),
                        });
                    }
                    columns.clone()
                }
            };

            let before = records.len();
            for row in reader.records() {
                let row = row?;
                records.push(parse_row(&row, &columns, file)?);
            }
            debug!("Read {} restaurants from {}", records.len() - before, file.display());
        }

        ensure_unique_ids(&records)?;

        let attribute_columns = layout
            .map(|(_, _, columns)| columns.attribute_names())
            .unwrap_or_default();
        let set = RestaurantSet::new(attribute_columns, records);
        info!(
            "Loaded {} restaurants ({} missing coordinates)",
            set.len(),
            set.missing_coordinates()
        );
        Ok(set)
    }
}

impl Default for RestaurantReader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_row(row: &StringRecord, columns: &ColumnLayout, path: &Path) -> Result<RestaurantRecord> {
    let line = row.position().map(|p| p.line() as usize).unwrap_or(0);
    let cell = |index: usize| row.get(index).and_then(non_null);

    let id = cell(columns.id).ok_or_else(|| EnrichError::InvalidValue {
        path: path.to_path_buf(),
        row: line,
        column: COL_ID.to_string(),
        value: row.get(columns.id).unwrap_or_default().to_string(),
    })?;

    let parse_coordinate = |index: usize, name: &str| -> Result<Option<f64>> {
        match cell(index) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| EnrichError::InvalidValue {
                    path: path.to_path_buf(),
                    row: line,
                    column: name.to_string(),
                    value: raw.to_string(),
                }),
        }
    };

    let lat = parse_coordinate(columns.lat, COL_LAT)?;
    let lng = parse_coordinate(columns.lng, COL_LNG)?;

    let attributes = columns
        .attributes
        .iter()
        .map(|(index, _)| cell(*index).map(str::to_string))
        .collect();

    Ok(RestaurantRecord::new(
        id,
        cell(columns.city).map(str::to_string),
        cell(columns.country).map(str::to_string),
        lat,
        lng,
    )
    .with_attributes(attributes))
}

fn non_null(value: &str) -> Option<&str> {
    let value = value.trim();
    if NULL_MARKERS.contains(&value) {
        None
    } else {
        Some(value)
    }
}

/// A single file, or every `*.csv` directly under a directory in sorted order.
fn discover_csv_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(EnrichError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        let is_csv = entry_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if entry_path.is_file() && is_csv {
            files.push(entry_path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(EnrichError::InputNotFound {
            path: path.join("*.csv"),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const HEADER: &str = "id,franchise_id,franchise_name,restaurant_franchise_id,country,city,lat,lng";

    fn csv_file(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_records_and_attributes() {
        let file = csv_file(
            "1,10,Savoria,100,FR,Paris,48.8566,2.3522\n\
             2,11,Dragon Wok,101,US,New York,,\n",
        );

        let set = RestaurantReader::new().read(file.path()).unwrap();

        assert_eq!(
            set.attribute_columns,
            vec!["franchise_id", "franchise_name", "restaurant_franchise_id"]
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[0].id, "1");
        assert_eq!(set.records[0].city.as_deref(), Some("Paris"));
        assert_eq!(set.records[0].lat, Some(48.8566));
        assert_eq!(
            set.records[0].attributes,
            vec![Some("10".to_string()), Some("Savoria".to_string()), Some("100".to_string())]
        );
        assert!(set.records[1].needs_backfill());
        assert_eq!(set.missing_coordinates(), 1);
    }

    #[test]
    fn test_null_markers_are_absent() {
        let file = csv_file("3,12,null,102,null,,null,\n");

        let set = RestaurantReader::new().read(file.path()).unwrap();
        let record = &set.records[0];

        assert_eq!(record.city, None);
        assert_eq!(record.country, None);
        assert_eq!(record.lat, None);
        assert_eq!(record.lng, None);
        assert_eq!(record.attributes[1], None);
    }

    #[test]
    fn test_other_literals_are_kept() {
        let file = csv_file("4,12,NaN,102,NULL,Paris,48.85,2.35\n");

        let set = RestaurantReader::new().read(file.path()).unwrap();
        let record = &set.records[0];

        assert_eq!(record.attributes[1].as_deref(), Some("NaN"));
        assert_eq!(record.country.as_deref(), Some("NULL"));
    }

    #[test]
    fn test_derived_columns_are_not_passed_through() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,city,country,lat,lng,geohash,avg_tmpr_c,franchise_name,coord_source").unwrap();
        writeln!(file, "1,Paris,FR,48.8566,2.3522,stale,99.0,Savoria,original").unwrap();

        let set = RestaurantReader::new().read(file.path()).unwrap();

        assert_eq!(set.attribute_columns, vec!["franchise_name"]);
        assert_eq!(set.records[0].attributes, vec![Some("Savoria".to_string())]);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,city,country,lat").unwrap();
        writeln!(file, "1,Paris,FR,48.0").unwrap();

        let err = RestaurantReader::new().read(file.path()).unwrap_err();
        assert!(matches!(err, EnrichError::MissingColumn { ref column, .. } if column == "lng"));
    }

    #[test]
    fn test_unparseable_coordinate_is_fatal() {
        let file = csv_file("1,10,Savoria,100,FR,Paris,north,2.35\n");

        let err = RestaurantReader::new().read(file.path()).unwrap_err();
        match err {
            EnrichError::InvalidValue { column, value, row, .. } => {
                assert_eq!(column, "lat");
                assert_eq!(value, "north");
                assert_eq!(row, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_are_fatal() {
        let file = csv_file(
            "1,10,A,100,FR,Paris,48.0,2.0\n\
             1,11,B,101,FR,Lyon,45.0,4.0\n",
        );

        let err = RestaurantReader::new().read(file.path()).unwrap_err();
        assert!(matches!(err, EnrichError::DuplicateRestaurantId { .. }));
    }

    #[test]
    fn test_directory_reads_files_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("part-00001.csv"),
            format!("{}\n2,11,B,101,US,Boston,42.36,-71.06\n", HEADER),
        )
        .unwrap();
        fs::write(
            dir.path().join("part-00000.csv"),
            format!("{}\n1,10,A,100,FR,Paris,48.85,2.35\n", HEADER),
        )
        .unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();

        let set = RestaurantReader::new().read(dir.path()).unwrap();

        let ids: Vec<&str> = set.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_directory_header_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.csv"),
            format!("{}\n1,10,A,100,FR,Paris,48.85,2.35\n", HEADER),
        )
        .unwrap();
        fs::write(dir.path().join("b.csv"), "id,city,country,lat,lng\n2,Rome,IT,41.9,12.5\n").unwrap();

        let err = RestaurantReader::new().read(dir.path()).unwrap_err();
        assert!(matches!(err, EnrichError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_missing_input() {
        let err = RestaurantReader::new()
            .read(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, EnrichError::InputNotFound { .. }));
    }
}
