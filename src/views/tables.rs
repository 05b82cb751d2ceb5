//! View Tables Module
//! Flat tables handed to the presentation layer, one builder per dashboard view.
//!
//! Every builder is a pure function of the immutable aggregates and the current
//! interaction state; nothing here is cached between calls.

use super::filter::{bounds, filter_by_category, filter_by_threshold, Bounds, ViewError};
use crate::stats::{Aggregates, Aggregator, ListingAggregate, ParishTotal};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// Qualitative palette for categorical colouring (language maps).
pub const PALETTE: [&str; 10] = [
    "#636EFA", // Blue
    "#EF553B", // Red
    "#00CC96", // Green
    "#AB63FA", // Purple
    "#FFA15A", // Orange
    "#19D3F3", // Cyan
    "#FF6692", // Pink
    "#B6E880", // Lime
    "#FF97FF", // Magenta
    "#FECB52", // Yellow
];

/// Label used for listings whose reviews carry no detected language.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// A table ready for a map, with the viewport of its rows.
#[derive(Debug, Clone)]
pub struct View {
    pub name: &'static str,
    pub table: DataFrame,
    pub bounds: Option<Bounds>,
}

/// Parish choropleth rows.
#[derive(Debug, Clone)]
pub struct ParishView {
    pub rows: Vec<ParishTotal>,
    pub table: DataFrame,
}

/// Range and tick marks of the review-count slider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSlider {
    pub min: u64,
    pub max: u64,
    pub step: u64,
    pub marks: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageColor {
    pub language: String,
    pub color: &'static str,
}

/// Stable colour per language, cycling the palette in first-seen order.
pub fn language_palette<'a>(languages: impl IntoIterator<Item = &'a str>) -> Vec<LanguageColor> {
    let mut seen = HashSet::new();
    languages
        .into_iter()
        .filter(|language| seen.insert(*language))
        .enumerate()
        .map(|(i, language)| LanguageColor {
            language: language.to_string(),
            color: PALETTE[i % PALETTE.len()],
        })
        .collect()
}

/// Builds view tables over one immutable set of aggregates.
pub struct ViewEngine<'a> {
    aggregates: &'a Aggregates,
    listings: DataFrame,
    padding: f64,
}

impl<'a> ViewEngine<'a> {
    pub fn new(aggregates: &'a Aggregates, padding: f64) -> Result<Self, ViewError> {
        Ok(Self {
            aggregates,
            listings: Self::listings_frame(&aggregates.listings)?,
            padding,
        })
    }

    pub fn aggregates(&self) -> &Aggregates {
        self.aggregates
    }

    fn listings_frame(rows: &[ListingAggregate]) -> Result<DataFrame, ViewError> {
        let df = DataFrame::new(vec![
            Column::new(
                "listing_id".into(),
                rows.iter().map(|r| r.listing_id).collect::<Vec<i64>>(),
            ),
            Column::new(
                "name".into(),
                rows.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "latitude".into(),
                rows.iter().map(|r| r.latitude).collect::<Vec<f64>>(),
            ),
            Column::new(
                "longitude".into(),
                rows.iter().map(|r| r.longitude).collect::<Vec<f64>>(),
            ),
            Column::new(
                "room_type".into(),
                rows.iter().map(|r| r.room_type.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "neighbourhood".into(),
                rows.iter().map(|r| r.neighbourhood.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "price".into(),
                rows.iter().map(|r| r.price).collect::<Vec<Option<f64>>>(),
            ),
            Column::new(
                "avg_price".into(),
                rows.iter().map(|r| r.avg_price).collect::<Vec<Option<f64>>>(),
            ),
            Column::new(
                "review_count".into(),
                rows.iter().map(|r| r.review_count).collect::<Vec<u64>>(),
            ),
            Column::new(
                "price_std".into(),
                rows.iter().map(|r| r.price_std).collect::<Vec<Option<f64>>>(),
            ),
            Column::new(
                "language".into(),
                rows.iter()
                    .map(|r| r.dominant_language.clone())
                    .collect::<Vec<_>>(),
            ),
        ])?;
        Ok(df)
    }

    fn view(&self, name: &'static str, table: DataFrame) -> Result<View, ViewError> {
        let bounds = bounds(&table, self.padding)?;
        Ok(View {
            name,
            table,
            bounds,
        })
    }

    /// Listings with a parsed price, coloured by price.
    pub fn price_map(&self) -> Result<View, ViewError> {
        let table = self
            .listings
            .clone()
            .lazy()
            .filter(col("price").is_not_null())
            .select([
                col("latitude"),
                col("longitude"),
                col("price"),
                col("name"),
                col("room_type"),
                col("neighbourhood"),
            ])
            .collect()?;
        self.view("price_map", table)
    }

    /// Listings with at least `min_reviews` reviews, coloured by average price and
    /// sized by review count.
    pub fn price_reviews_map(&self, min_reviews: f64) -> Result<View, ViewError> {
        let base = self.listings.select([
            "latitude",
            "longitude",
            "avg_price",
            "review_count",
            "name",
            "listing_id",
        ])?;
        let table = filter_by_threshold(&base, "review_count", min_reviews)?;
        self.view("price_reviews_map", table)
    }

    /// Reviewed listings coloured by dominant review language.
    ///
    /// An empty `selected_languages` shows every language.
    pub fn language_map<S: AsRef<str>>(
        &self,
        selected_languages: &[S],
    ) -> Result<View, ViewError> {
        let reviewed = self
            .listings
            .clone()
            .lazy()
            .filter(col("review_count").gt(lit(0u64)))
            .with_column(col("language").fill_null(lit(UNKNOWN_LANGUAGE)))
            .select([
                col("latitude"),
                col("longitude"),
                col("language"),
                col("review_count"),
                col("name"),
                col("room_type"),
                col("price"),
            ])
            .collect()?;
        let table = filter_by_category(&reviewed, "language", selected_languages)?;
        self.view("language_map", table)
    }

    /// Listings with a calendar price spread, coloured by standard deviation.
    pub fn price_deviation_map(&self) -> Result<View, ViewError> {
        let table = self
            .listings
            .clone()
            .lazy()
            .filter(col("price_std").is_not_null())
            .select([
                col("latitude"),
                col("longitude"),
                col("price_std"),
                col("name"),
                col("room_type"),
                col("neighbourhood"),
            ])
            .collect()?;
        self.view("price_deviation_map", table)
    }

    /// One row per parish with its dominant language over `selected_quarters`.
    ///
    /// An empty selection covers every quarter.
    pub fn parish_language_map<S: AsRef<str>>(
        &self,
        selected_quarters: &[S],
    ) -> Result<ParishView, ViewError> {
        let rows = Aggregator::parish_totals(
            &self.aggregates.parish_stats,
            &self.aggregates.parishes,
            selected_quarters,
            self.aggregates.tie_break,
        );
        let table = DataFrame::new(vec![
            Column::new(
                "parish_id".into(),
                rows.iter().map(|r| r.parish_id.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "name".into(),
                rows.iter().map(|r| r.name.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "language".into(),
                rows.iter().map(|r| r.language.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                "total_reviews".into(),
                rows.iter().map(|r| r.total_reviews).collect::<Vec<u64>>(),
            ),
        ])?;
        Ok(ParishView { rows, table })
    }

    /// Total reviews per quarter for the bar chart.
    pub fn quarterly_reviews(&self) -> Result<DataFrame, ViewError> {
        let totals = Aggregator::quarterly_totals(&self.aggregates.parish_stats);
        let (quarters, counts): (Vec<String>, Vec<u64>) = totals.into_iter().unzip();
        Ok(DataFrame::new(vec![
            Column::new("quarter".into(), quarters),
            Column::new("num_reviews".into(), counts),
        ])?)
    }

    /// Slider from zero to the highest review count, with about ten marks.
    pub fn review_slider(&self) -> ReviewSlider {
        let max = self
            .aggregates
            .listings
            .iter()
            .map(|l| l.review_count)
            .max()
            .unwrap_or(0);
        let step = (max / 10).max(1);
        ReviewSlider {
            min: 0,
            max,
            step,
            marks: (0..=max).step_by(step as usize).collect(),
        }
    }

    /// Colours for the languages of the all-quarters parish map.
    pub fn language_palette(&self) -> Vec<LanguageColor> {
        let totals = Aggregator::parish_totals::<&str>(
            &self.aggregates.parish_stats,
            &self.aggregates.parishes,
            &[],
            self.aggregates.tie_break,
        );
        language_palette(totals.iter().filter_map(|t| t.language.as_deref()))
    }
}
