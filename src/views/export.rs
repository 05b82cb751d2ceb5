//! View Export Module
//! Writes view tables as CSV, the parish choropleth as GeoJSON and a JSON summary.

use super::filter::{Bounds, ViewError};
use super::tables::{LanguageColor, ParishView, ReviewSlider, View, ViewEngine};
use crate::data::LoadReport;
use polars::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Failed to serialize output: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    View(#[from] ViewError),
}

/// Interaction state the views are exported for.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub min_reviews: u64,
    pub selected_quarters: Vec<String>,
    pub selected_languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSummary {
    pub rows: usize,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub views: HashMap<&'static str, ViewSummary>,
    pub parishes: usize,
    pub review_slider: ReviewSlider,
    pub language_colors: Vec<LanguageColor>,
    pub quarters: Vec<String>,
    pub load_reports: Vec<LoadReport>,
}

/// Writes the presentation hand-off files into one directory.
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
        move |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_csv(&self, file_name: &str, table: &DataFrame) -> Result<(), ExportError> {
        let path = self.output_dir.join(file_name);
        let mut file = File::create(&path).map_err(Self::io_error(&path))?;
        let mut table = table.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut table)?;
        info!(path = %path.display(), rows = table.height(), "Wrote view table");
        Ok(())
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), ExportError> {
        let path = self.output_dir.join(file_name);
        let file = File::create(&path).map_err(Self::io_error(&path))?;
        serde_json::to_writer_pretty(file, value)?;
        Ok(())
    }

    /// Parish rows joined back to their boundaries, with the language colour.
    pub fn parish_geojson(
        view: &ParishView,
        engine: &ViewEngine<'_>,
        colors: &[LanguageColor],
    ) -> Value {
        let geometries: HashMap<&str, &Value> = engine
            .aggregates()
            .parishes
            .iter()
            .map(|p| (p.id.as_str(), &p.geometry))
            .collect();
        let color_of = |language: Option<&str>| {
            language.and_then(|l| {
                colors
                    .iter()
                    .find(|c| c.language == l)
                    .map(|c| c.color)
            })
        };

        let features: Vec<Value> = view
            .rows
            .iter()
            .map(|row| {
                json!({
                    "type": "Feature",
                    "id": row.parish_id,
                    "properties": {
                        "name": row.name,
                        "language": row.language,
                        "total_reviews": row.total_reviews,
                        "color": color_of(row.language.as_deref()),
                    },
                    "geometry": geometries
                        .get(row.parish_id.as_str())
                        .map(|g| (*g).clone())
                        .unwrap_or(Value::Null),
                })
            })
            .collect();

        json!({ "type": "FeatureCollection", "features": features })
    }

    /// Build every view for `request` and write it out.
    pub fn export_all(
        &self,
        engine: &ViewEngine<'_>,
        request: &ExportRequest,
        load_reports: &[LoadReport],
    ) -> Result<ExportSummary, ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(Self::io_error(&self.output_dir))?;

        let views: Vec<View> = vec![
            engine.price_map()?,
            engine.price_reviews_map(request.min_reviews as f64)?,
            engine.language_map(&request.selected_languages)?,
            engine.price_deviation_map()?,
        ];

        let mut summaries = HashMap::new();
        for view in &views {
            self.write_csv(&format!("{}.csv", view.name), &view.table)?;
            summaries.insert(
                view.name,
                ViewSummary {
                    rows: view.table.height(),
                    bounds: view.bounds,
                },
            );
        }

        let parish_view = engine.parish_language_map(&request.selected_quarters)?;
        let colors = engine.language_palette();
        self.write_csv("parish_language_map.csv", &parish_view.table)?;
        self.write_json(
            "parish_language_map.geojson",
            &Self::parish_geojson(&parish_view, engine, &colors),
        )?;

        let quarterly = engine.quarterly_reviews()?;
        self.write_csv("quarterly_reviews.csv", &quarterly)?;
        let quarters = quarterly
            .column("quarter")?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();

        let summary = ExportSummary {
            views: summaries,
            parishes: parish_view.rows.len(),
            review_slider: engine.review_slider(),
            language_colors: colors,
            quarters,
            load_reports: load_reports.to_vec(),
        };
        self.write_json("summary.json", &summary)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Parish;
    use crate::stats::{Aggregates, ListingAggregate, QuarterlyParishStat, TieBreak};
    use crate::views::filter::BOUNDS_PADDING;

    fn fixture() -> Aggregates {
        Aggregates {
            listings: vec![ListingAggregate {
                listing_id: 1,
                name: Some("Alfama loft".into()),
                latitude: 38.71,
                longitude: -9.13,
                room_type: Some("Entire home/apt".into()),
                neighbourhood: Some("Santa Maria Maior".into()),
                price: Some(120.0),
                avg_price: Some(120.0),
                review_count: 3,
                price_std: None,
                dominant_language: Some("en".into()),
            }],
            parish_stats: vec![QuarterlyParishStat {
                parish_id: "9".into(),
                quarter: "2024Q1".into(),
                review_count: 3,
                dominant_language: Some("en".into()),
            }],
            parishes: vec![Parish {
                id: "9".into(),
                name: "Santa Maria Maior".into(),
                geometry: json!({"type": "Point", "coordinates": [-9.13, 38.71]}),
            }],
            tie_break: TieBreak::FirstSeen,
        }
    }

    #[test]
    fn test_export_all_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let aggregates = fixture();
        let engine = ViewEngine::new(&aggregates, BOUNDS_PADDING).unwrap();
        let exporter = Exporter::new(dir.path().join("out"));

        let summary = exporter
            .export_all(&engine, &ExportRequest::default(), &[])
            .unwrap();

        assert_eq!(summary.views["price_reviews_map"].rows, 1);
        assert_eq!(summary.views["price_deviation_map"].rows, 0);
        assert_eq!(summary.quarters, vec!["2024Q1".to_string()]);
        for file in [
            "price_map.csv",
            "price_reviews_map.csv",
            "language_map.csv",
            "price_deviation_map.csv",
            "parish_language_map.csv",
            "parish_language_map.geojson",
            "quarterly_reviews.csv",
            "summary.json",
        ] {
            assert!(dir.path().join("out").join(file).exists(), "{file} missing");
        }
    }

    #[test]
    fn test_parish_geojson_carries_geometry_and_color() {
        let aggregates = fixture();
        let engine = ViewEngine::new(&aggregates, BOUNDS_PADDING).unwrap();
        let view = engine.parish_language_map::<&str>(&[]).unwrap();
        let colors = engine.language_palette();

        let geojson = Exporter::parish_geojson(&view, &engine, &colors);
        let feature = &geojson["features"][0];
        assert_eq!(feature["id"], "9");
        assert_eq!(feature["properties"]["language"], "en");
        assert_eq!(feature["properties"]["color"], colors[0].color);
        assert_eq!(feature["geometry"]["type"], "Point");
    }
}
