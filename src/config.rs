//! Pipeline configuration, read from an optional JSON file.

use crate::stats::{AggregateOptions, ParishSource, PriceSource, TieBreak};
use crate::views::{ExportRequest, BOUNDS_PADDING};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bounds_padding must be a finite, non-negative number (got {0})")]
    InvalidPadding(f64),
    #[error("{option} requires the `{file}` source file")]
    MissingSource {
        option: &'static str,
        file: &'static str,
    },
}

/// Source file names, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub listings: String,
    pub reviews: String,
    pub review_languages: String,
    pub calendar: Option<String>,
    pub parishes: String,
    pub parish_quarters: Option<String>,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            listings: "listings.csv.gz".to_string(),
            reviews: "reviews.csv.gz".to_string(),
            review_languages: "review_languages.csv.gz".to_string(),
            calendar: Some("calendar.csv.gz".to_string()),
            parishes: "lisbon_parishes.geojson".to_string(),
            parish_quarters: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files: SourceFiles,
    pub price_source: PriceSource,
    pub parish_source: ParishSource,
    pub tie_break: TieBreak,
    pub bounds_padding: f64,
    /// Initial review-count slider value.
    pub min_reviews: u64,
    pub selected_quarters: Vec<String>,
    pub selected_languages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            files: SourceFiles::default(),
            price_source: PriceSource::default(),
            parish_source: ParishSource::default(),
            tie_break: TieBreak::default(),
            bounds_padding: BOUNDS_PADDING,
            min_reviews: 0,
            selected_quarters: Vec::new(),
            selected_languages: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bounds_padding.is_finite() || self.bounds_padding < 0.0 {
            return Err(ConfigError::InvalidPadding(self.bounds_padding));
        }
        if self.price_source == PriceSource::Calendar && self.files.calendar.is_none() {
            return Err(ConfigError::MissingSource {
                option: "price_source = calendar",
                file: "calendar",
            });
        }
        if self.parish_source == ParishSource::QuarterlyFile && self.files.parish_quarters.is_none()
        {
            return Err(ConfigError::MissingSource {
                option: "parish_source = quarterly_file",
                file: "parish_quarters",
            });
        }
        Ok(())
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            price_source: self.price_source,
            parish_source: self.parish_source,
            tie_break: self.tie_break,
        }
    }

    pub fn export_request(&self) -> ExportRequest {
        ExportRequest {
            min_reviews: self.min_reviews,
            selected_quarters: self.selected_quarters.clone(),
            selected_languages: self.selected_languages.clone(),
        }
    }
}
