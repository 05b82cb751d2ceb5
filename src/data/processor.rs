//! Data Processor Module
//! Cleans raw string tables into typed records (price parsing, required-field drops).

use super::loader::LoaderError;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Currency symbols stripped from the front of a price string.
const CURRENCY_SYMBOLS: [char; 3] = ['$', '€', '£'];

/// A listing row with validated coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub id: i64,
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub room_type: Option<String>,
    pub neighbourhood: Option<String>,
    pub raw_price: Option<String>,
    /// `None` when the raw price is missing or unparsable.
    pub price: Option<f64>,
}

/// Calendar quarter of a review date, rendered as `2023Q1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quarter {
    pub year: i32,
    pub quarter: u8,
}

impl Quarter {
    /// Derive the quarter from an ISO `YYYY-MM-DD` date.
    pub fn from_date(date: &str) -> Option<Self> {
        let mut parts = date.trim().splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month = parts.next()?.parse::<u8>().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self {
            year,
            quarter: (month - 1) / 3 + 1,
        })
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub listing_id: i64,
    pub date: Option<String>,
    pub quarter: Option<Quarter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLanguage {
    pub review_id: i64,
    pub language: String,
}

/// One day of a listing's price time series.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEntry {
    pub listing_id: i64,
    pub date: Option<String>,
    pub price: Option<f64>,
}

/// Parish boundary. The geometry is reference data and is never modified after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Parish {
    pub id: String,
    pub name: String,
    pub geometry: serde_json::Value,
}

/// Row of the precomputed per-parish quarterly language file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParishQuarterRow {
    pub parish_id: String,
    pub quarter: String,
    pub num_reviews: u64,
    pub language: Option<String>,
}

/// Row accounting for a single typed extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub table: &'static str,
    pub total: usize,
    pub kept: usize,
    pub dropped: usize,
    /// Kept rows whose price could not be parsed.
    pub unparsed_prices: usize,
}

impl LoadReport {
    fn new(table: &'static str, total: usize) -> Self {
        Self {
            table,
            total,
            ..Default::default()
        }
    }

    fn log(&self) {
        if self.dropped > 0 || self.unparsed_prices > 0 {
            warn!(
                table = self.table,
                total = self.total,
                dropped = self.dropped,
                unparsed_prices = self.unparsed_prices,
                "Excluded malformed rows"
            );
        } else {
            debug!(table = self.table, rows = self.kept, "All rows accepted");
        }
    }
}

/// Parse a currency-formatted price such as `$1,250.00`.
pub fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let unsigned = trimmed
        .strip_prefix(|c: char| CURRENCY_SYMBOLS.contains(&c))
        .unwrap_or(trimmed);
    let cleaned: String = unsigned.chars().filter(|&c| c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse an integer identifier, accepting float-formatted integers like `42.0`.
pub fn parse_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Some(id);
    }
    let value = trimmed.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

/// Canonical form of a join key: float-formatted integers collapse to integers.
pub fn normalize_key(raw: &str) -> String {
    match parse_id(raw) {
        Some(id) => id.to_string(),
        None => raw.trim().to_string(),
    }
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Converts loaded string tables into typed records.
pub struct DataProcessor;

impl DataProcessor {
    fn required_column(
        df: &DataFrame,
        table: &'static str,
        name: &str,
    ) -> Result<StringChunked, LoaderError> {
        let column = df.column(name).map_err(|_| LoaderError::MissingColumn {
            table,
            column: name.to_string(),
        })?;
        Ok(column.cast(&DataType::String)?.str()?.clone())
    }

    fn optional_column(df: &DataFrame, name: &str) -> Result<Option<StringChunked>, LoaderError> {
        match df.column(name) {
            Ok(column) => Ok(Some(column.cast(&DataType::String)?.str()?.clone())),
            Err(_) => Ok(None),
        }
    }

    fn optional_value(column: &Option<StringChunked>, row: usize) -> Option<String> {
        non_empty(column.as_ref().and_then(|ca| ca.get(row)))
    }

    /// Extract listings, dropping rows without a valid id or coordinates.
    pub fn listings(df: &DataFrame) -> Result<(Vec<Listing>, LoadReport), LoaderError> {
        const TABLE: &str = "listings";
        let ids = Self::required_column(df, TABLE, "id")?;
        let latitudes = Self::required_column(df, TABLE, "latitude")?;
        let longitudes = Self::required_column(df, TABLE, "longitude")?;
        let names = Self::optional_column(df, "name")?;
        let room_types = Self::optional_column(df, "room_type")?;
        let prices = Self::optional_column(df, "price")?;
        let neighbourhoods = match Self::optional_column(df, "neighbourhood_cleansed")? {
            Some(cleansed) => Some(cleansed),
            None => Self::optional_column(df, "neighbourhood")?,
        };

        let mut report = LoadReport::new(TABLE, df.height());
        let mut listings = Vec::with_capacity(df.height());

        for i in 0..df.height() {
            let parsed = (
                ids.get(i).and_then(parse_id),
                latitudes.get(i).and_then(parse_coordinate),
                longitudes.get(i).and_then(parse_coordinate),
            );
            let (Some(id), Some(latitude), Some(longitude)) = parsed else {
                report.dropped += 1;
                continue;
            };

            let raw_price = Self::optional_value(&prices, i);
            let price = raw_price.as_deref().and_then(parse_price);
            if price.is_none() {
                report.unparsed_prices += 1;
            }

            listings.push(Listing {
                id,
                name: Self::optional_value(&names, i),
                latitude,
                longitude,
                room_type: Self::optional_value(&room_types, i),
                neighbourhood: Self::optional_value(&neighbourhoods, i),
                raw_price,
                price,
            });
        }

        report.kept = listings.len();
        report.log();
        Ok((listings, report))
    }

    /// Listings usable by price-dependent views.
    pub fn priced_listings(listings: &[Listing]) -> Vec<&Listing> {
        listings.iter().filter(|l| l.price.is_some()).collect()
    }

    pub fn reviews(df: &DataFrame) -> Result<(Vec<Review>, LoadReport), LoaderError> {
        const TABLE: &str = "reviews";
        let ids = Self::required_column(df, TABLE, "id")?;
        let listing_ids = Self::required_column(df, TABLE, "listing_id")?;
        let dates = Self::optional_column(df, "date")?;

        let mut report = LoadReport::new(TABLE, df.height());
        let mut reviews = Vec::with_capacity(df.height());

        for i in 0..df.height() {
            let (Some(id), Some(listing_id)) = (
                ids.get(i).and_then(parse_id),
                listing_ids.get(i).and_then(parse_id),
            ) else {
                report.dropped += 1;
                continue;
            };
            let date = Self::optional_value(&dates, i);
            let quarter = date.as_deref().and_then(Quarter::from_date);
            reviews.push(Review {
                id,
                listing_id,
                date,
                quarter,
            });
        }

        report.kept = reviews.len();
        report.log();
        Ok((reviews, report))
    }

    pub fn review_languages(
        df: &DataFrame,
    ) -> Result<(Vec<ReviewLanguage>, LoadReport), LoaderError> {
        const TABLE: &str = "review_languages";
        let ids = Self::required_column(df, TABLE, "id")?;
        let languages = Self::required_column(df, TABLE, "language")?;

        let mut report = LoadReport::new(TABLE, df.height());
        let mut rows = Vec::with_capacity(df.height());

        for i in 0..df.height() {
            match (ids.get(i).and_then(parse_id), non_empty(languages.get(i))) {
                (Some(review_id), Some(language)) => rows.push(ReviewLanguage {
                    review_id,
                    language,
                }),
                _ => report.dropped += 1,
            }
        }

        report.kept = rows.len();
        report.log();
        Ok((rows, report))
    }

    /// Calendar rows with an unparsable price are kept with `price: None`.
    pub fn calendar(df: &DataFrame) -> Result<(Vec<CalendarEntry>, LoadReport), LoaderError> {
        const TABLE: &str = "calendar";
        let listing_ids = Self::required_column(df, TABLE, "listing_id")?;
        let prices = Self::required_column(df, TABLE, "price")?;
        let dates = Self::optional_column(df, "date")?;

        let mut report = LoadReport::new(TABLE, df.height());
        let mut entries = Vec::with_capacity(df.height());

        for i in 0..df.height() {
            let Some(listing_id) = listing_ids.get(i).and_then(parse_id) else {
                report.dropped += 1;
                continue;
            };
            let price = prices.get(i).and_then(parse_price);
            if price.is_none() {
                report.unparsed_prices += 1;
            }
            entries.push(CalendarEntry {
                listing_id,
                date: Self::optional_value(&dates, i),
                price,
            });
        }

        report.kept = entries.len();
        report.log();
        Ok((entries, report))
    }

    pub fn parish_quarters(
        df: &DataFrame,
    ) -> Result<(Vec<ParishQuarterRow>, LoadReport), LoaderError> {
        const TABLE: &str = "parish_quarters";
        let parish_ids = Self::required_column(df, TABLE, "parish_id")?;
        let quarters = Self::required_column(df, TABLE, "quarter")?;
        let counts = Self::required_column(df, TABLE, "num_reviews")?;
        let languages = Self::required_column(df, TABLE, "language")?;

        let mut report = LoadReport::new(TABLE, df.height());
        let mut rows = Vec::with_capacity(df.height());

        for i in 0..df.height() {
            let parish_id = non_empty(parish_ids.get(i));
            let quarter = non_empty(quarters.get(i));
            let num_reviews = counts
                .get(i)
                .and_then(parse_id)
                .and_then(|n| u64::try_from(n).ok());
            let (Some(parish_id), Some(quarter), Some(num_reviews)) =
                (parish_id, quarter, num_reviews)
            else {
                report.dropped += 1;
                continue;
            };
            rows.push(ParishQuarterRow {
                parish_id: normalize_key(&parish_id),
                quarter,
                num_reviews,
                language: non_empty(languages.get(i)),
            });
        }

        report.kept = rows.len();
        report.log();
        Ok((rows, report))
    }
}
