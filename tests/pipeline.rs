use flate2::write::GzEncoder;
use flate2::Compression;
use lisbon_insights::config::{Config, SourceFiles};
use lisbon_insights::data::{DataLoader, SourceTables};
use lisbon_insights::stats::{AggregateOptions, Aggregator, ParishSource, PriceSource};
use lisbon_insights::views::{Exporter, ViewEngine, BOUNDS_PADDING};
use std::fs;
use std::io::Write;
use std::path::Path;

const LISTINGS: &str = "id,name,latitude,longitude,room_type,neighbourhood_cleansed,price\n\
    1,Alfama loft,38.7110,-9.1300,Entire home/apt,Santa Maria Maior,$100.00\n\
    2,Belem flat,38.6970,-9.2060,Private room,Belém,\"$50,000.00\"\n\
    3,No coords,,-9.1000,Private room,Belém,$70.00\n\
    4,Quiet room,38.7500,-9.1500,Private room,Alvalade,bad\n";

const REVIEWS: &str = "listing_id,id,date\n\
    1,100,2023-01-15\n\
    1,101,2023-05-02\n\
    2,102,2023-01-20\n";

const LANGUAGES: &str = "id,language\n100,en\n101,fr\n102,pt\n";

const CALENDAR: &str = "listing_id,date,price\n\
    1,2024-01-01,$100\n\
    1,2024-01-02,bad\n\
    1,2024-01-03,$300\n";

const QUARTERLY: &str = "parish_id,quarter,num_reviews,language\n\
    9,2023Q1,1,en\n\
    9,2023Q2,1,fr\n\
    3,2023Q1,1,pt\n";

const PARISHES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"id": 9, "name": "Santa Maria Maior"}, "geometry": null},
        {"type": "Feature", "properties": {"id": 3, "name": "Belém"}, "geometry": null},
        {"type": "Feature", "properties": {"id": 5, "name": "Alvalade"}, "geometry": null}
    ]
}"#;

fn write_gz(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn files() -> SourceFiles {
    SourceFiles {
        listings: "listings.csv".into(),
        reviews: "reviews.csv.gz".into(),
        review_languages: "review_languages.csv".into(),
        calendar: Some("calendar.csv".into()),
        parishes: "parishes.geojson".into(),
        parish_quarters: Some("parish_data_quarterly.csv".into()),
    }
}

fn load(dir: &Path) -> SourceTables {
    fs::write(dir.join("listings.csv"), LISTINGS).unwrap();
    write_gz(&dir.join("reviews.csv.gz"), REVIEWS);
    fs::write(dir.join("review_languages.csv"), LANGUAGES).unwrap();
    fs::write(dir.join("calendar.csv"), CALENDAR).unwrap();
    fs::write(dir.join("parish_data_quarterly.csv"), QUARTERLY).unwrap();
    fs::write(dir.join("parishes.geojson"), PARISHES).unwrap();
    SourceTables::load(&DataLoader::new(dir), &files()).unwrap()
}

#[test]
fn listing_aggregates_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load(dir.path());
    assert_eq!(sources.listings.len(), 3, "row without latitude is dropped");

    let aggregates = Aggregator::aggregate(&sources, &AggregateOptions::default());
    let rows: Vec<(i64, Option<f64>, u64)> = aggregates
        .listings
        .iter()
        .map(|l| (l.listing_id, l.avg_price, l.review_count))
        .collect();
    assert_eq!(
        rows,
        vec![(1, Some(100.0), 2), (2, Some(50000.0), 1), (4, None, 0)]
    );
    assert_eq!(aggregates.listings[0].price_std.map(|s| s.round()), Some(141.0));
}

#[test]
fn calendar_prices_skip_unparsable_rows() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load(dir.path());
    let options = AggregateOptions {
        price_source: PriceSource::Calendar,
        ..AggregateOptions::default()
    };
    let aggregates = Aggregator::aggregate(&sources, &options);
    assert_eq!(aggregates.listings[0].avg_price, Some(200.0));
    assert_eq!(aggregates.listings[1].avg_price, None);
}

#[test]
fn parish_routes_agree() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load(dir.path());

    let from_reviews = Aggregator::aggregate(&sources, &AggregateOptions::default());
    let from_file = Aggregator::aggregate(
        &sources,
        &AggregateOptions {
            parish_source: ParishSource::QuarterlyFile,
            ..AggregateOptions::default()
        },
    );
    assert_eq!(from_reviews.parish_stats, from_file.parish_stats);

    let engine = ViewEngine::new(&from_file, BOUNDS_PADDING).unwrap();
    let parishes = engine.parish_language_map::<&str>(&[]).unwrap();
    let names: Vec<&str> = parishes.rows.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Santa Maria Maior", "Belém"]);
}

#[test]
fn slider_interaction_recomputes_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load(dir.path());
    let aggregates = Aggregator::aggregate(&sources, &AggregateOptions::default());
    let engine = ViewEngine::new(&aggregates, BOUNDS_PADDING).unwrap();

    let wide = engine.price_reviews_map(0.0).unwrap().bounds.unwrap();
    let narrow = engine.price_reviews_map(2.0).unwrap();
    assert_eq!(narrow.table.height(), 1);
    let bounds = narrow.bounds.unwrap();
    assert!(bounds.west > wide.west);
    assert!((bounds.center().0 - 38.711).abs() < 1e-9);

    // Same interaction again yields the same view
    let again = engine.price_reviews_map(2.0).unwrap();
    assert!(again.table.equals(&narrow.table));
    assert_eq!(again.bounds, narrow.bounds);
}

#[test]
fn export_writes_summary() {
    let dir = tempfile::tempdir().unwrap();
    let sources = load(dir.path());
    let config = Config {
        output_dir: dir.path().join("output"),
        min_reviews: 1,
        ..Config::default()
    };
    let aggregates = Aggregator::aggregate(&sources, &config.aggregate_options());
    let engine = ViewEngine::new(&aggregates, config.bounds_padding).unwrap();

    let summary = Exporter::new(&config.output_dir)
        .export_all(&engine, &config.export_request(), &sources.reports)
        .unwrap();

    assert_eq!(summary.views["price_map"].rows, 2);
    assert_eq!(summary.views["price_reviews_map"].rows, 2);
    assert_eq!(summary.review_slider.max, 2);
    assert_eq!(summary.quarters, vec!["2023Q1", "2023Q2"]);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(written["load_reports"][0]["dropped"], 1);
}

#[test]
fn missing_source_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("listings.csv"), LISTINGS).unwrap();
    let result = SourceTables::load(&DataLoader::new(dir.path()), &files());
    assert!(result.is_err());
}
