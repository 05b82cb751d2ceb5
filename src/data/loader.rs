//! CSV Data Loader Module
//! Reads plain or gzip-compressed delimited files into string-typed Polars frames,
//! and parish boundaries from GeoJSON.

use super::processor::{normalize_key, Parish};
use flate2::read::MultiGzDecoder;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Table `{table}` is missing required column `{column}`")]
    MissingColumn { table: &'static str, column: String },
    #[error("Failed to parse GeoJSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid parish feature #{index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    geometry: Value,
}

fn key_from_json(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(normalize_key(&n.to_string())),
        Value::String(s) if !s.trim().is_empty() => Some(normalize_key(s)),
        _ => None,
    }
}

/// Loads source tables relative to a data directory.
pub struct DataLoader {
    data_dir: PathBuf,
}

impl DataLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn resolve(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Read a file, transparently inflating gzip content.
    fn read_source(path: &Path) -> Result<Vec<u8>, LoaderError> {
        let bytes = fs::read(path).map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if !bytes.starts_with(&GZIP_MAGIC) {
            return Ok(bytes);
        }

        debug!(path = %path.display(), "Inflating gzip source");
        let mut inflated = Vec::with_capacity(bytes.len() * 4);
        MultiGzDecoder::new(bytes.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|source| LoaderError::Decompress {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(inflated)
    }

    /// Load a delimited file with every column read as a string.
    pub fn load_table(&self, file_name: &str) -> Result<DataFrame, LoaderError> {
        let path = self.resolve(file_name);
        let bytes = Self::read_source(&path)?;

        // Header-only schema inference keeps every column as String
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            "Loaded table"
        );
        Ok(df)
    }

    /// Load parish boundaries from a GeoJSON `FeatureCollection`.
    ///
    /// Each feature must carry an `id` (feature id or property) and a `name` property.
    pub fn load_parishes(&self, file_name: &str) -> Result<Vec<Parish>, LoaderError> {
        let path = self.resolve(file_name);
        let bytes = Self::read_source(&path)?;
        let parishes = Self::parse_parishes(&bytes)?;
        info!(path = %path.display(), parishes = parishes.len(), "Loaded parish boundaries");
        Ok(parishes)
    }

    pub fn parse_parishes(bytes: &[u8]) -> Result<Vec<Parish>, LoaderError> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)?;

        collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| {
                let id = feature
                    .properties
                    .get("id")
                    .and_then(key_from_json)
                    .or_else(|| feature.id.as_ref().and_then(key_from_json))
                    .ok_or_else(|| LoaderError::InvalidFeature {
                        index,
                        reason: "missing id".to_string(),
                    })?;
                let name = feature
                    .properties
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| LoaderError::InvalidFeature {
                        index,
                        reason: "missing name".to_string(),
                    })?;
                Ok(Parish {
                    id,
                    name,
                    geometry: feature.geometry,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const LISTINGS_CSV: &str = "id,name,latitude,longitude,price\n\
        1,Alfama loft,38.711,-9.130,\"$1,100.00\"\n\
        2,Belem flat,38.697,-9.206,$80.00\n";

    #[test]
    fn test_load_plain_csv_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("listings.csv"), LISTINGS_CSV).unwrap();

        let df = DataLoader::new(dir.path()).load_table("listings.csv").unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::String);
        assert_eq!(
            df.column("price").unwrap().str().unwrap().get(0),
            Some("$1,100.00")
        );
    }

    #[test]
    fn test_load_gzip_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(LISTINGS_CSV.as_bytes()).unwrap();
        fs::write(dir.path().join("listings.csv.gz"), encoder.finish().unwrap()).unwrap();

        let df = DataLoader::new(dir.path())
            .load_table("listings.csv.gz")
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column("name").unwrap().str().unwrap().get(1),
            Some("Belem flat")
        );
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataLoader::new(dir.path())
            .load_table("nope.csv.gz")
            .unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn test_truncated_gzip_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.csv.gz"), [0x1f, 0x8b, 0x08, 0x00]).unwrap();
        let err = DataLoader::new(dir.path())
            .load_table("broken.csv.gz")
            .unwrap_err();
        assert!(matches!(err, LoaderError::Decompress { .. }));
    }

    #[test]
    fn test_parse_parishes() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"id": 3, "name": "Belém"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-9.2, 38.69], [-9.19, 38.70], [-9.2, 38.70], [-9.2, 38.69]]]}},
                {"type": "Feature", "id": "7", "properties": {"name": "Alvalade"}, "geometry": null}
            ]
        }"#;
        let parishes = DataLoader::parse_parishes(geojson.as_bytes()).unwrap();
        assert_eq!(parishes.len(), 2);
        assert_eq!(parishes[0].id, "3");
        assert_eq!(parishes[0].name, "Belém");
        assert_eq!(parishes[1].id, "7");
        assert!(parishes[1].geometry.is_null());
    }

    #[test]
    fn test_parish_without_name_is_rejected() {
        let geojson = br#"{"features": [{"properties": {"id": 1}, "geometry": null}]}"#;
        let err = DataLoader::parse_parishes(geojson).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidFeature { index: 0, .. }));
    }
}
