//! Data module - source loading and record cleaning

mod loader;
mod processor;

pub use loader::{DataLoader, LoaderError};
pub use processor::{
    normalize_key, parse_price, CalendarEntry, DataProcessor, Listing, LoadReport, Parish,
    ParishQuarterRow, Quarter, Review, ReviewLanguage,
};

use crate::config::SourceFiles;
use tracing::info;

/// Every base table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub listings: Vec<Listing>,
    pub reviews: Vec<Review>,
    pub review_languages: Vec<ReviewLanguage>,
    pub calendar: Vec<CalendarEntry>,
    pub parishes: Vec<Parish>,
    pub parish_quarters: Vec<ParishQuarterRow>,
    pub reports: Vec<LoadReport>,
}

impl SourceTables {
    /// Load and clean all configured sources. Any failure aborts the whole load.
    pub fn load(loader: &DataLoader, files: &SourceFiles) -> Result<Self, LoaderError> {
        let mut reports = Vec::new();

        let (listings, report) = DataProcessor::listings(&loader.load_table(&files.listings)?)?;
        reports.push(report);
        let (reviews, report) = DataProcessor::reviews(&loader.load_table(&files.reviews)?)?;
        reports.push(report);
        let (review_languages, report) =
            DataProcessor::review_languages(&loader.load_table(&files.review_languages)?)?;
        reports.push(report);

        let calendar = match &files.calendar {
            Some(name) => {
                let (calendar, report) = DataProcessor::calendar(&loader.load_table(name)?)?;
                reports.push(report);
                calendar
            }
            None => Vec::new(),
        };

        let parish_quarters = match &files.parish_quarters {
            Some(name) => {
                let (rows, report) = DataProcessor::parish_quarters(&loader.load_table(name)?)?;
                reports.push(report);
                rows
            }
            None => Vec::new(),
        };

        let parishes = loader.load_parishes(&files.parishes)?;

        info!(
            listings = listings.len(),
            priced = DataProcessor::priced_listings(&listings).len(),
            reviews = reviews.len(),
            review_languages = review_languages.len(),
            calendar = calendar.len(),
            parishes = parishes.len(),
            "Source tables ready"
        );

        Ok(Self {
            listings,
            reviews,
            review_languages,
            calendar,
            parishes,
            parish_quarters,
            reports,
        })
    }
}
