//! Views module - filtering, view tables and export

mod export;
mod filter;
mod tables;

pub use export::{ExportError, ExportRequest, ExportSummary, Exporter, ViewSummary};
pub use filter::{
    bounds, filter_by_category, filter_by_threshold, Bounds, ViewError, BOUNDS_PADDING,
};
pub use tables::{
    language_palette, LanguageColor, ParishView, ReviewSlider, View, ViewEngine, PALETTE,
    UNKNOWN_LANGUAGE,
};
