//! Lisbon Insights - batch run
//!
//! Usage: `lisbon-insights [config.json]`

use anyhow::{Context, Result};
use lisbon_insights::config::Config;
use lisbon_insights::data::{DataLoader, SourceTables};
use lisbon_insights::stats::Aggregator;
use lisbon_insights::views::{Exporter, ViewEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    config.validate()?;

    // Base tables and aggregates are built once; a load error stops here
    let loader = DataLoader::new(&config.data_dir);
    let sources =
        SourceTables::load(&loader, &config.files).context("Failed to load source tables")?;
    let aggregates = Aggregator::aggregate(&sources, &config.aggregate_options());

    let engine = ViewEngine::new(&aggregates, config.bounds_padding)?;
    let summary = Exporter::new(&config.output_dir)
        .export_all(&engine, &config.export_request(), &sources.reports)
        .context("Failed to export views")?;

    info!(
        output = %config.output_dir.display(),
        views = summary.views.len(),
        parishes = summary.parishes,
        "Done"
    );
    Ok(())
}
