//! Filter Engine Module
//! Threshold and category filters over view tables, plus viewport bounds.

use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Degrees added on every side of the filtered extent.
pub const BOUNDS_PADDING: f64 = 0.05;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Unknown column `{0}`")]
    UnknownColumn(String),
}

/// Padded viewport rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Bounds {
    /// Centre as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Float64Chunked, ViewError> {
    let column = df
        .column(name)
        .map_err(|_| ViewError::UnknownColumn(name.to_string()))?;
    Ok(column.cast(&DataType::Float64)?.f64()?.clone())
}

/// Rows where `column >= min_value`. Nulls never pass.
///
/// A non-finite threshold disables the filter; a threshold above the column maximum
/// is clamped to that maximum.
pub fn filter_by_threshold(
    df: &DataFrame,
    column: &str,
    min_value: f64,
) -> Result<DataFrame, ViewError> {
    let values = numeric_column(df, column)?;
    if !min_value.is_finite() {
        return Ok(df.clone());
    }

    let threshold = match values.max() {
        Some(max) if min_value > max => {
            debug!(column, min_value, max, "Threshold clamped to column maximum");
            max
        }
        _ => min_value,
    };

    let filtered = df
        .clone()
        .lazy()
        .filter(col(column).cast(DataType::Float64).gt_eq(lit(threshold)))
        .collect()?;
    Ok(filtered)
}

/// Rows whose `column` value is one of `allowed`. An empty selection means no filter.
pub fn filter_by_category<S: AsRef<str>>(
    df: &DataFrame,
    column: &str,
    allowed: &[S],
) -> Result<DataFrame, ViewError> {
    let source = df
        .column(column)
        .map_err(|_| ViewError::UnknownColumn(column.to_string()))?;
    if allowed.is_empty() {
        return Ok(df.clone());
    }

    let allowed: HashSet<&str> = allowed.iter().map(AsRef::as_ref).collect();
    let values = source.cast(&DataType::String)?;
    let mask: BooleanChunked = values
        .str()?
        .into_iter()
        .map(|value| value.is_some_and(|v| allowed.contains(v)))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Extent of `latitude`/`longitude` in `df`, padded on all four sides.
///
/// Returns `None` when no row has coordinates.
pub fn bounds(df: &DataFrame, padding: f64) -> Result<Option<Bounds>, ViewError> {
    let latitudes = numeric_column(df, "latitude")?;
    let longitudes = numeric_column(df, "longitude")?;

    let extent = (
        latitudes.min(),
        latitudes.max(),
        longitudes.min(),
        longitudes.max(),
    );
    let (Some(south), Some(north), Some(west), Some(east)) = extent else {
        return Ok(None);
    };

    Ok(Some(Bounds {
        west: west - padding,
        east: east + padding,
        south: south - padding,
        north: north + padding,
    }))
}
